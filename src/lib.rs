pub mod eval;
pub mod expr;
pub mod interact;
pub mod modem;
pub mod parse;

pub use eval::{eval_one_number, evaluate, extract_list, EvalError};
pub use expr::{Atom, Expr, ExprKind, FuncDefs, Vec2};
pub use interact::{interact, run, Exchange, InteractError, RandomWalker, Viewer};
pub use modem::{
    decode_message, decode_number, demodulate, demodulate_list, encode_message, modulate,
    modulate_list, ModemError,
};
pub use parse::{parse, parse_expr, ParseError, ParseErrorKind};
