use crate::expr::{Atom, Expr, FuncDefs};

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use tracing::{debug, info};

mod nom {
    pub use nom::{
        bytes::complete::*, character::complete::*, combinator::*, error::*, sequence::*, *,
    };
    pub use nom_locate::LocatedSpan;
}

type Span<'a> = nom::LocatedSpan<&'a str>;

#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParseErrorKind {
    UnexpectedToken(String),
    NumberTooLarge(String),
    UnexpectedEndOfExpression,
    MissingName,
    MissingEquals,
    TrailingTokens(String),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse error at line {}, column {}: {}",
            self.line, self.column, self.kind
        )
    }
}

impl Display for ParseErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::UnexpectedToken(tok) => write!(f, "unexpected token {:?}", tok),
            ParseErrorKind::NumberTooLarge(tok) => {
                write!(f, "number {:?} does not fit a 64-bit integer", tok)
            }
            ParseErrorKind::UnexpectedEndOfExpression => write!(f, "unexpected end of expression"),
            ParseErrorKind::MissingName => write!(f, "expected a function name"),
            ParseErrorKind::MissingEquals => write!(f, "expected `=` after the function name"),
            ParseErrorKind::TrailingTokens(tok) => {
                write!(f, "trailing input {:?} after expression", tok)
            }
        }
    }
}

impl std::error::Error for ParseError {}

// Error carrier threaded through the nom combinators; `parse` flattens it
// into the public `ParseError` with line and column attached.
#[derive(Debug)]
struct DefError<'a> {
    span: Span<'a>,
    kind: ParseErrorKind,
}

impl<'a> nom::ParseError<Span<'a>> for DefError<'a> {
    fn from_error_kind(input: Span<'a>, _kind: nom::ErrorKind) -> Self {
        // The only bare nom failure here is `take_till1` running out of input.
        DefError {
            span: input,
            kind: ParseErrorKind::UnexpectedEndOfExpression,
        }
    }

    fn append(_input: Span<'a>, _kind: nom::ErrorKind, other: Self) -> Self {
        other
    }
}

fn fail<'a, T>(span: Span<'a>, kind: ParseErrorKind) -> nom::IResult<Span<'a>, T, DefError<'a>> {
    Err(nom::Err::Failure(DefError { span, kind }))
}

/// Parses a whole protocol-description file: one `name = expr` definition per
/// non-blank line. The last definition becomes the protocol entry point.
pub fn parse(input: &str) -> Result<FuncDefs, ParseError> {
    let mut defs = HashMap::new();
    let mut entry_point = String::new();
    for (idx, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (name, expr) = run_line(definition, line, idx + 1)?;
        debug!("parsed {} = {}", name, expr);
        defs.insert(name.clone(), expr);
        entry_point = name;
    }
    info!("parsed {} function definition(s)", defs.len());
    Ok(FuncDefs::new(defs, entry_point))
}

/// Parses a single bare expression, e.g. `ap ap cons 1 nil`.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    run_line(bare_expression, input, 1)
}

fn run_line<'a, T>(
    parser: impl Fn(Span<'a>) -> nom::IResult<Span<'a>, T, DefError<'a>>,
    line: &'a str,
    line_number: usize,
) -> Result<T, ParseError> {
    match parser(Span::new(line)) {
        Ok((_, value)) => Ok(value),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => Err(ParseError {
            kind: err.kind,
            line: line_number,
            column: err.span.get_column(),
        }),
        Err(nom::Err::Incomplete(_)) => unreachable!(),
    }
}

/// The next whitespace-delimited token, if any.
fn token(input: Span) -> nom::IResult<Span, Span, DefError> {
    nom::preceded(nom::multispace0, nom::take_till1(|c: char| c.is_whitespace()))(input)
}

fn definition(input: Span) -> nom::IResult<Span, (String, Expr), DefError> {
    let (rest, name_tok) = match token(input) {
        Ok(ok) => ok,
        Err(_) => return fail(input, ParseErrorKind::MissingName),
    };
    let name = *name_tok.fragment();
    if is_reserved(name) || !is_name(name) {
        return fail(name_tok, ParseErrorKind::MissingName);
    }

    let (rest, eq_tok) = match token(rest) {
        Ok(ok) => ok,
        Err(_) => return fail(rest, ParseErrorKind::MissingEquals),
    };
    if *eq_tok.fragment() != "=" {
        return fail(eq_tok, ParseErrorKind::MissingEquals);
    }

    let (rest, expr) = expression(rest)?;
    let (rest, ()) = end_of_line(rest)?;
    Ok((rest, (name.to_string(), expr)))
}

fn bare_expression(input: Span) -> nom::IResult<Span, Expr, DefError> {
    let (rest, expr) = expression(input)?;
    let (rest, ()) = end_of_line(rest)?;
    Ok((rest, expr))
}

fn end_of_line(input: Span) -> nom::IResult<Span, (), DefError> {
    match token(input) {
        Ok((_, tok)) => fail(tok, ParseErrorKind::TrailingTokens(tok.fragment().to_string())),
        Err(_) => Ok((input, ())),
    }
}

// Prefix notation: `ap` consumes two sub-expressions; every other token is a
// terminal atom.
fn expression(input: Span) -> nom::IResult<Span, Expr, DefError> {
    let (rest, tok) = token(input)?;
    match *tok.fragment() {
        "ap" => {
            let (rest, fun) = expression(rest)?;
            let (rest, arg) = expression(rest)?;
            Ok((rest, Expr::ap(fun, arg)))
        }
        "t" => Ok((rest, Expr::atom(Atom::True))),
        "f" => Ok((rest, Expr::atom(Atom::False))),
        "nil" => Ok((rest, Expr::nil())),
        "cons" => Ok((rest, Expr::atom(Atom::Cons))),
        word => terminal(tok, word, rest),
    }
}

fn terminal<'a>(
    tok: Span<'a>,
    word: &str,
    rest: Span<'a>,
) -> nom::IResult<Span<'a>, Expr, DefError<'a>> {
    if is_name(word) {
        return Ok((rest, Expr::name(word)));
    }
    let digits = word.strip_prefix('-').unwrap_or(word);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return match word.parse::<i64>() {
            Ok(n) => Ok((rest, Expr::num(n))),
            Err(_) => fail(tok, ParseErrorKind::NumberTooLarge(word.to_string())),
        };
    }
    fail(tok, ParseErrorKind::UnexpectedToken(word.to_string()))
}

// `[A-Za-z:][A-Za-z0-9:]*`
fn is_name(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if c == ':' || c.is_ascii_alphabetic() => {
            chars.all(|c| c == ':' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

fn is_reserved(word: &str) -> bool {
    matches!(word, "ap" | "cons" | "nil" | "t" | "f")
}
