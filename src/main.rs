use galaxypad::{Exchange, RandomWalker, Vec2, Viewer};

use std::fs;
use std::io::{self, prelude::*};
use std::path::PathBuf;
use std::process;
use std::thread;
use structopt::StructOpt;
use tracing::{debug, info};

macro_rules! error {
    ($fmt:tt $($arg:tt)*) => {{
        eprintln!(concat!("error: ", $fmt) $($arg)*);
        process::exit(1)
    }};
}

#[derive(StructOpt)]
struct Opt {
    #[structopt(help = "Protocol-description file")]
    input: PathBuf,
    #[structopt(
        long,
        short = "s",
        value_name = "bytes",
        help = "Specify the stack size"
    )]
    stack_size: Option<usize>,
    #[structopt(
        long,
        short = "n",
        value_name = "count",
        default_value = "64",
        help = "Stop the autonomous driver after this many frames"
    )]
    rounds: usize,
}

/// Line-oriented exchange over stdio: the outgoing bitstring goes to stdout,
/// the peer's reply is read from stdin. An HTTP (or any other) transport can
/// be attached by wrapping the process in a pipe.
struct StdioExchange;

impl Exchange for StdioExchange {
    fn exchange(&mut self, message: &str) -> io::Result<String> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{}", message)?;
        out.flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        let response = line.trim();
        if response.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no response from the peer",
            ));
        }
        Ok(response.to_string())
    }
}

/// Random-walk driver that logs each frame instead of rendering it and
/// gives up after a fixed number of frames.
struct ConsoleViewer {
    walker: RandomWalker,
    frames_left: usize,
}

impl ConsoleViewer {
    fn new(frames: usize) -> ConsoleViewer {
        ConsoleViewer {
            walker: RandomWalker::new(),
            frames_left: frames,
        }
    }
}

impl Viewer for ConsoleViewer {
    fn draw(&mut self, layers: &[Vec<Vec2>]) {
        info!("frame with {} layer(s)", layers.len());
        for (i, points) in layers.iter().enumerate() {
            debug!("layer {}: {} point(s): {:?}", i, points.len(), points);
        }
    }

    fn request_click(&mut self) -> Option<Vec2> {
        if self.frames_left == 0 {
            return None;
        }
        self.frames_left -= 1;
        self.walker.request_click()
    }

    fn stop_requested(&mut self) -> bool {
        false
    }
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();
    let input = fs::read_to_string(&opt.input)?;
    let rounds = opt.rounds;

    let result = {
        let mut builder = thread::Builder::new().name("runtime".to_owned());
        if let Some(stack_size) = opt.stack_size {
            builder = builder.stack_size(stack_size);
        }
        builder
            .spawn(move || {
                galaxypad::parse(&input)
                    .map(|defs| galaxypad::run(&defs, StdioExchange, ConsoleViewer::new(rounds)))
            })?
            .join()
            .unwrap()
    };

    result
        .unwrap_or_else(|err| error!("{}", err))
        .unwrap_or_else(|err| error!("{}", err));
    Ok(())
}
