use derivative::Derivative;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

/// A shared handle to an expression node. Cloning is cheap (`Rc`); the node
/// itself is immutable apart from the write-once memo slot.
#[derive(Clone, Debug)]
pub struct Expr(Rc<Node>);

#[derive(Derivative)]
#[derivative(Debug)]
struct Node {
    kind: ExprKind,
    // Holds the fully reduced form of this exact node once known. An
    // evaluated pair caches itself, so traversing this from `Debug` would
    // never terminate.
    #[derivative(Debug = "ignore")]
    cached: Cell<Option<Expr>>,
}

#[derive(Debug)]
pub enum ExprKind {
    Atom(Atom),
    Ap(Expr, Expr),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Atom {
    True,
    False,
    Nil,
    Cons,
    Number(i64),
    Name(String),
}

impl Expr {
    pub fn atom(atom: Atom) -> Expr {
        Expr(Rc::new(Node {
            kind: ExprKind::Atom(atom),
            cached: Cell::new(None),
        }))
    }

    pub fn num(n: i64) -> Expr {
        Expr::atom(Atom::Number(n))
    }

    pub fn name(name: impl Into<String>) -> Expr {
        Expr::atom(Atom::Name(name.into()))
    }

    pub fn nil() -> Expr {
        Expr::atom(Atom::Nil)
    }

    pub fn boolean(b: bool) -> Expr {
        Expr::atom(if b { Atom::True } else { Atom::False })
    }

    pub fn ap(fun: Expr, arg: Expr) -> Expr {
        Expr(Rc::new(Node {
            kind: ExprKind::Ap(fun, arg),
            cached: Cell::new(None),
        }))
    }

    /// `ap ap cons head tail`, the list-cell encoding.
    pub fn pair(head: Expr, tail: Expr) -> Expr {
        Expr::ap(Expr::ap(Expr::atom(Atom::Cons), head), tail)
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Node identity, the loop-exit check of the evaluator.
    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn cached(&self) -> Option<Expr> {
        let slot = self.0.cached.take();
        let result = slot.clone();
        self.0.cached.set(slot);
        result
    }

    pub fn set_cached(&self, evaluated: &Expr) {
        self.0.cached.set(Some(evaluated.clone()));
    }

    pub fn as_number(&self) -> Option<i64> {
        match self.kind() {
            ExprKind::Atom(Atom::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self.kind() {
            ExprKind::Atom(Atom::Name(name)) => Some(name),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.kind(), ExprKind::Atom(Atom::Nil))
    }

    pub fn is_cons(&self) -> bool {
        matches!(self.kind(), ExprKind::Atom(Atom::Cons))
    }

    pub fn is_pair(&self) -> bool {
        self.as_pair().is_some()
    }

    /// Recognizes `ap (ap cons head) tail` and returns both children.
    pub fn as_pair(&self) -> Option<(Expr, Expr)> {
        match self.kind() {
            ExprKind::Ap(fun, tail) => match fun.kind() {
                ExprKind::Ap(cons, head) if cons.is_cons() => Some((head.clone(), tail.clone())),
                _ => None,
            },
            _ => None,
        }
    }

    /// Deep equality on variant tags and children. Iterative; list spines can
    /// be arbitrarily long.
    pub fn eq_structural(&self, other: &Expr) -> bool {
        let mut pending = vec![(self.clone(), other.clone())];
        while let Some((a, b)) = pending.pop() {
            if a.ptr_eq(&b) {
                continue;
            }
            match (a.kind(), b.kind()) {
                (ExprKind::Atom(x), ExprKind::Atom(y)) => {
                    if x != y {
                        return false;
                    }
                }
                (ExprKind::Ap(f1, x1), ExprKind::Ap(f2, x2)) => {
                    pending.push((f1.clone(), f2.clone()));
                    pending.push((x1.clone(), x2.clone()));
                }
                _ => return false,
            }
        }
        true
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Atom(Atom::True) => write!(f, "t"),
            ExprKind::Atom(Atom::False) => write!(f, "f"),
            ExprKind::Atom(Atom::Nil) => write!(f, "nil"),
            ExprKind::Atom(Atom::Cons) => write!(f, "cons"),
            ExprKind::Atom(Atom::Number(n)) => write!(f, "{}", n),
            ExprKind::Atom(Atom::Name(name)) => write!(f, "{}", name),
            ExprKind::Ap(fun, arg) => write!(f, "(ap {} {})", fun, arg),
        }
    }
}

/// A 2D point used for screen coordinates. Not part of the expression
/// language; crosses into it via the Cons encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Vec2 {
    pub x: i64,
    pub y: i64,
}

impl Vec2 {
    pub fn new(x: i64, y: i64) -> Vec2 {
        Vec2 { x, y }
    }

    pub fn to_expr(self) -> Expr {
        Expr::pair(Expr::num(self.x), Expr::num(self.y))
    }
}

/// The protocol's function table: name -> defining expression, plus the
/// distinguished entry point. Built once at startup, read-only afterwards.
#[derive(Debug)]
pub struct FuncDefs {
    entry_point: String,
    defs: HashMap<String, Expr>,
}

impl FuncDefs {
    pub fn new(defs: HashMap<String, Expr>, entry_point: String) -> FuncDefs {
        FuncDefs { entry_point, defs }
    }

    pub fn get(&self, name: &str) -> Option<&Expr> {
        self.defs.get(name)
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}
