use crate::eval::{eval_one_number, evaluate, extract_list, EvalError};
use crate::expr::{Expr, FuncDefs, Vec2};
use crate::modem::{decode_message, encode_message, ModemError};

use rand::Rng;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::time::Instant;
use tracing::{debug, info};

/// Bound on protocol rounds, both inside one conversation and across the
/// outer event loop.
pub const MAX_ROUNDS: usize = 1_000_000;

/// One request/response exchange with the remote peer. The transport itself
/// (HTTP or otherwise) lives outside the core.
pub trait Exchange {
    fn exchange(&mut self, message: &str) -> io::Result<String>;
}

/// Rendering and input collaborator. `request_click` returning `None` ends
/// the run; `stop_requested` is polled once per protocol round.
pub trait Viewer {
    fn draw(&mut self, layers: &[Vec<Vec2>]);
    fn request_click(&mut self) -> Option<Vec2>;
    fn stop_requested(&mut self) -> bool;
}

impl<E: Exchange + ?Sized> Exchange for &mut E {
    fn exchange(&mut self, message: &str) -> io::Result<String> {
        (**self).exchange(message)
    }
}

impl<V: Viewer + ?Sized> Viewer for &mut V {
    fn draw(&mut self, layers: &[Vec<Vec2>]) {
        (**self).draw(layers)
    }

    fn request_click(&mut self) -> Option<Vec2> {
        (**self).request_click()
    }

    fn stop_requested(&mut self) -> bool {
        (**self).stop_requested()
    }
}

#[derive(Debug)]
pub enum InteractError {
    Eval(EvalError),
    Modem(ModemError),
    MalformedResult(usize),
    Transport { message: String, source: io::Error },
    RoundLimit(usize),
    Interrupted,
}

impl Display for InteractError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InteractError::Eval(err) => write!(f, "evaluation failed: {}", err),
            InteractError::Modem(err) => write!(f, "codec failure: {}", err),
            InteractError::MalformedResult(len) => {
                write!(f, "protocol result has {} element(s) instead of 3", len)
            }
            InteractError::Transport { message, source } => {
                write!(f, "exchange failed while sending {:?}: {}", message, source)
            }
            InteractError::RoundLimit(bound) => {
                write!(f, "conversation incomplete after {} rounds", bound)
            }
            InteractError::Interrupted => write!(f, "stop requested mid-conversation"),
        }
    }
}

impl std::error::Error for InteractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InteractError::Eval(err) => Some(err),
            InteractError::Modem(err) => Some(err),
            InteractError::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<EvalError> for InteractError {
    fn from(err: EvalError) -> InteractError {
        InteractError::Eval(err)
    }
}

impl From<ModemError> for InteractError {
    fn from(err: ModemError) -> InteractError {
        InteractError::Modem(err)
    }
}

/// Runs the protocol function against `(state, event)` until it produces a
/// zero flag, exchanging flagged data with the peer in between. Returns the
/// new state and the drawable data.
pub fn interact<E, V>(
    defs: &FuncDefs,
    exchange: &mut E,
    viewer: &mut V,
    state: &Expr,
    event: &Expr,
) -> Result<(Expr, Expr), InteractError>
where
    E: Exchange,
    V: Viewer,
{
    if defs.get(defs.entry_point()).is_none() {
        return Err(EvalError::UnknownCombinator(defs.entry_point().to_string()).into());
    }

    let mut state = state.clone();
    let mut event = event.clone();
    for round in 0..MAX_ROUNDS {
        let call = Expr::ap(
            Expr::ap(Expr::name(defs.entry_point()), state.clone()),
            event,
        );
        let result = evaluate(defs, &call)?;
        let items = extract_list(defs, &result)?;
        if items.len() != 3 {
            return Err(InteractError::MalformedResult(items.len()));
        }
        let flag = eval_one_number(defs, &items[0])?;
        let new_state = items[1].clone();
        let data = items[2].clone();
        if flag == 0 {
            return Ok((new_state, data));
        }

        let message = encode_message(&data)?;
        debug!("round {}: sending {} bit(s) to the peer", round, message.len());
        let response = exchange
            .exchange(&message)
            .map_err(|source| InteractError::Transport { message, source })?;
        debug!("round {}: received {} bit(s)", round, response.len());
        event = decode_message(&response)?;
        state = new_state;

        if viewer.stop_requested() {
            return Err(InteractError::Interrupted);
        }
    }
    Err(InteractError::RoundLimit(MAX_ROUNDS))
}

/// Drives full protocol rounds from the initial state, rendering each frame
/// and feeding user clicks back in, until the viewer stops the run.
pub fn run<E, V>(defs: &FuncDefs, mut exchange: E, mut viewer: V) -> Result<(), InteractError>
where
    E: Exchange,
    V: Viewer,
{
    let mut state = Expr::nil();
    let mut click = Vec2::new(0, 0);
    for round in 0..MAX_ROUNDS {
        let event = click.to_expr();
        let started = Instant::now();
        info!("begin interact round {}", round);
        let (new_state, images) =
            match interact(defs, &mut exchange, &mut viewer, &state, &event) {
                Ok(result) => result,
                Err(InteractError::Interrupted) => {
                    info!("stop requested, ending the conversation");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
        state = new_state;

        let layers = extract_draw_lists(defs, &images)?;
        viewer.draw(&layers);
        info!("end interact round {} after {:?}", round, started.elapsed());

        match viewer.request_click() {
            Some(next) => click = next,
            None => return Ok(()),
        }
    }
    Err(InteractError::RoundLimit(MAX_ROUNDS))
}

/// Decomposes the protocol's drawable data, a list of point-lists, into
/// concrete coordinates.
pub fn extract_draw_lists(defs: &FuncDefs, images: &Expr) -> Result<Vec<Vec<Vec2>>, EvalError> {
    let mut layers = Vec::new();
    for layer in extract_list(defs, images)? {
        let mut points = Vec::new();
        for point in extract_list(defs, &layer)? {
            points.push(expr_to_vec(defs, &point)?);
        }
        layers.push(points);
    }
    Ok(layers)
}

fn expr_to_vec(defs: &FuncDefs, expr: &Expr) -> Result<Vec2, EvalError> {
    let evaluated = evaluate(defs, expr)?;
    let (x, y) = evaluated.as_pair().ok_or_else(|| EvalError::TypeMismatch {
        expected: "a coordinate pair",
        found: evaluated.to_string(),
    })?;
    Ok(Vec2::new(
        eval_one_number(defs, &x)?,
        eval_one_number(defs, &y)?,
    ))
}

/// Viewer for driving a protocol without a human: draws nothing and answers
/// every click request with a uniformly random point in [0, 64) x [0, 64).
pub struct RandomWalker {
    rng: rand::rngs::ThreadRng,
}

impl RandomWalker {
    pub fn new() -> RandomWalker {
        RandomWalker {
            rng: rand::thread_rng(),
        }
    }
}

impl Default for RandomWalker {
    fn default() -> RandomWalker {
        RandomWalker::new()
    }
}

impl Viewer for RandomWalker {
    fn draw(&mut self, _layers: &[Vec<Vec2>]) {}

    fn request_click(&mut self) -> Option<Vec2> {
        Some(Vec2::new(
            self.rng.gen_range(0..64),
            self.rng.gen_range(0..64),
        ))
    }

    fn stop_requested(&mut self) -> bool {
        false
    }
}
