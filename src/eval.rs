use crate::expr::{Atom, Expr, ExprKind, FuncDefs};

use std::fmt::{self, Display, Formatter};

/// Bound on both the fixed-point loop and a single `try_reduce` chain; a
/// protocol that exceeds it is assumed to diverge.
pub const MAX_REDUCTIONS: usize = 1_000_000;

#[derive(Clone, Debug, PartialEq)]
pub enum EvalError {
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    UnknownCombinator(String),
    NonConvergence(usize),
}

impl Display for EvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {}, found {}", expected, found)
            }
            EvalError::UnknownCombinator(name) => write!(f, "unknown combinator {:?}", name),
            EvalError::NonConvergence(bound) => {
                write!(f, "no normal form after {} reduction steps", bound)
            }
        }
    }
}

impl std::error::Error for EvalError {}

/// Reduces `expr` to normal form. The result is memoized onto the node that
/// was passed in, so a second call on the same node is O(1) and returns the
/// reference-identical expression.
pub fn evaluate(defs: &FuncDefs, expr: &Expr) -> Result<Expr, EvalError> {
    if let Some(cached) = expr.cached() {
        return Ok(cached);
    }
    let original = expr.clone();
    let mut current = expr.clone();
    for _ in 0..MAX_REDUCTIONS {
        let next = try_reduce(defs, &current)?;
        if next.ptr_eq(&current) {
            // Fixed point: no rule applies anymore.
            original.set_cached(&next);
            return Ok(next);
        }
        current = next;
    }
    Err(EvalError::NonConvergence(MAX_REDUCTIONS))
}

// One reduction attempt. Returns the input node itself iff it is already in
// normal form.
fn try_reduce(defs: &FuncDefs, expr: &Expr) -> Result<Expr, EvalError> {
    if let Some(cached) = expr.cached() {
        return Ok(cached);
    }
    let (fun, x) = match expr.kind() {
        ExprKind::Atom(Atom::Name(name)) => {
            return Ok(match defs.get(name) {
                Some(def) => def.clone(),
                None => expr.clone(),
            });
        }
        ExprKind::Atom(_) => return Ok(expr.clone()),
        ExprKind::Ap(fun, arg) => (fun.clone(), arg.clone()),
    };

    let fun = evaluate(defs, &fun)?;

    // Single-argument combinators. `nil` applied to anything is
    // constant-true; this is how list termination checks are encoded.
    match fun.kind() {
        ExprKind::Atom(Atom::Nil) => return Ok(Expr::boolean(true)),
        ExprKind::Atom(Atom::Name(name)) => match name.as_str() {
            "neg" => return Ok(Expr::num(-eval_one_number(defs, &x)?)),
            "i" => return Ok(x),
            "isnil" => {
                let selector = Expr::ap(
                    Expr::boolean(true),
                    Expr::ap(Expr::boolean(true), Expr::boolean(false)),
                );
                return Ok(Expr::ap(x, selector));
            }
            "car" => return Ok(Expr::ap(x, Expr::boolean(true))),
            "cdr" => return Ok(Expr::ap(x, Expr::boolean(false))),
            _ => {}
        },
        _ => {}
    }

    if let ExprKind::Ap(inner_fun, inner_arg) = fun.kind() {
        // `y` was applied first, so it is the first surface operand; `x` is
        // the second. The operand order in div/lt/cons below looks swapped
        // for exactly that reason.
        let y = inner_arg.clone();
        let fun2 = evaluate(defs, inner_fun)?;

        // Two-argument combinators.
        match fun2.kind() {
            ExprKind::Atom(Atom::True) => return Ok(y),
            ExprKind::Atom(Atom::False) => return Ok(x),
            ExprKind::Atom(Atom::Cons) => return eval_cons(defs, &y, &x),
            ExprKind::Atom(Atom::Name(name)) => match name.as_str() {
                "add" => {
                    let (n1, n2) = eval_two_numbers(defs, &x, &y)?;
                    return Ok(Expr::num(n1 + n2));
                }
                "mul" => {
                    let (n1, n2) = eval_two_numbers(defs, &x, &y)?;
                    return Ok(Expr::num(n1 * n2));
                }
                "div" => {
                    let (n1, n2) = eval_two_numbers(defs, &x, &y)?;
                    return Ok(Expr::num(n2 / n1));
                }
                "lt" => {
                    let (n1, n2) = eval_two_numbers(defs, &x, &y)?;
                    return Ok(Expr::boolean(n2 < n1));
                }
                "eq" => {
                    let (n1, n2) = eval_two_numbers(defs, &x, &y)?;
                    return Ok(Expr::boolean(n1 == n2));
                }
                _ => {}
            },
            _ => {}
        }

        // Three-argument combinators.
        if let ExprKind::Ap(inner2_fun, inner2_arg) = fun2.kind() {
            let z = inner2_arg.clone();
            let fun3 = evaluate(defs, inner2_fun)?;
            if let Some(name) = fun3.as_name() {
                match name {
                    "s" => {
                        return Ok(Expr::ap(
                            Expr::ap(z, x.clone()),
                            Expr::ap(y, x),
                        ));
                    }
                    "c" => return Ok(Expr::ap(Expr::ap(z, x), y)),
                    "b" => return Ok(Expr::ap(z, Expr::ap(y, x))),
                    _ => {}
                }
            } else if fun3.is_cons() {
                // A pair used as a function selects over its two halves.
                return Ok(Expr::ap(Expr::ap(x, z), y));
            }
        }
    }

    // No rule applies: the node is in normal form.
    Ok(expr.clone())
}

// Builds the evaluated pair `ap (ap cons head) tail`. A pair built this way
// is final, so it caches itself.
fn eval_cons(defs: &FuncDefs, head: &Expr, tail: &Expr) -> Result<Expr, EvalError> {
    let head = evaluate(defs, head)?;
    let tail = evaluate(defs, tail)?;
    let pair = Expr::pair(head, tail);
    pair.set_cached(&pair);
    Ok(pair)
}

pub fn eval_one_number(defs: &FuncDefs, expr: &Expr) -> Result<i64, EvalError> {
    let evaluated = evaluate(defs, expr)?;
    evaluated.as_number().ok_or_else(|| EvalError::TypeMismatch {
        expected: "a number",
        found: evaluated.to_string(),
    })
}

fn eval_two_numbers(defs: &FuncDefs, a: &Expr, b: &Expr) -> Result<(i64, i64), EvalError> {
    Ok((eval_one_number(defs, a)?, eval_one_number(defs, b)?))
}

/// Evaluates `expr` and walks the Cons spine down to `nil`, evaluating each
/// tail along the way. The returned elements are not themselves evaluated
/// beyond what building the spine required.
pub fn extract_list(defs: &FuncDefs, expr: &Expr) -> Result<Vec<Expr>, EvalError> {
    let mut items = Vec::new();
    let mut current = evaluate(defs, expr)?;
    loop {
        if current.is_nil() {
            return Ok(items);
        }
        match current.as_pair() {
            Some((head, tail)) => {
                items.push(head);
                current = evaluate(defs, &tail)?;
            }
            None => {
                return Err(EvalError::TypeMismatch {
                    expected: "nil or a pair",
                    found: current.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse, parse_expr};
    use std::collections::HashMap;

    fn no_defs() -> FuncDefs {
        FuncDefs::new(HashMap::new(), String::new())
    }

    fn eval_str(src: &str) -> Expr {
        let defs = no_defs();
        evaluate(&defs, &parse_expr(src).unwrap()).unwrap()
    }

    fn eval_num(src: &str) -> i64 {
        eval_str(src).as_number().unwrap()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval_num("ap ap add 1 2"), 3);
        assert_eq!(eval_num("ap ap add -3 3"), 0);
        assert_eq!(eval_num("ap ap mul 3 4"), 12);
        assert_eq!(eval_num("ap neg 5"), -5);
        assert_eq!(eval_num("ap neg -7"), 7);
    }

    #[test]
    fn div_divides_first_operand_by_second_truncating() {
        assert_eq!(eval_num("ap ap div 4 2"), 2);
        assert_eq!(eval_num("ap ap div 7 -2"), -3);
        assert_eq!(eval_num("ap ap div -9 4"), -2);
        assert_eq!(eval_num("ap ap div 5 7"), 0);
    }

    #[test]
    fn lt_compares_first_operand_to_second() {
        assert_eq!(eval_str("ap ap lt 3 5").to_string(), "t");
        assert_eq!(eval_str("ap ap lt 5 3").to_string(), "f");
        assert_eq!(eval_str("ap ap lt 0 -1").to_string(), "f");
        assert_eq!(eval_str("ap ap lt 3 3").to_string(), "f");
    }

    #[test]
    fn eq_on_numbers() {
        assert_eq!(eval_str("ap ap eq 5 5").to_string(), "t");
        assert_eq!(eval_str("ap ap eq 5 6").to_string(), "f");
    }

    #[test]
    fn boolean_selectors() {
        assert_eq!(eval_num("ap ap t 1 5"), 1);
        assert_eq!(eval_num("ap ap f 1 5"), 5);
    }

    #[test]
    fn identity_and_constant_nil() {
        assert_eq!(eval_num("ap i 42"), 42);
        assert_eq!(eval_str("ap nil 99").to_string(), "t");
    }

    #[test]
    fn isnil() {
        assert_eq!(eval_str("ap isnil nil").to_string(), "t");
        assert_eq!(eval_str("ap isnil ap ap cons 1 nil").to_string(), "f");
    }

    #[test]
    fn car_and_cdr() {
        assert_eq!(eval_num("ap car ap ap cons 1 2"), 1);
        assert_eq!(eval_num("ap cdr ap ap cons 1 2"), 2);
        assert_eq!(eval_num("ap car ap cdr ap ap cons 1 ap ap cons 2 nil"), 2);
    }

    #[test]
    fn s_c_b_combinators() {
        // s add i 3 = (add 3) (i 3) = 6
        assert_eq!(eval_num("ap ap ap s add i 3"), 6);
        // c div 2 10 = div 10 2 = 5
        assert_eq!(eval_num("ap ap ap c div 2 10"), 5);
        // b neg neg 7 = neg (neg 7) = 7
        assert_eq!(eval_num("ap ap ap b neg neg 7"), 7);
    }

    #[test]
    fn pair_applied_as_function_selects() {
        // (cons 1 2) t = t 1 2 = 1
        assert_eq!(eval_num("ap ap ap cons 1 2 t"), 1);
        assert_eq!(eval_num("ap ap ap cons 1 2 f"), 2);
    }

    #[test]
    fn names_are_substituted_from_the_table() {
        let defs = parse("inc = ap add 1\nx = ap inc 41").unwrap();
        let result = evaluate(&defs, &Expr::name("x")).unwrap();
        assert_eq!(result.as_number(), Some(42));
    }

    #[test]
    fn unknown_names_are_normal_forms() {
        let defs = no_defs();
        let expr = parse_expr("ap ap mystery 1 2").unwrap();
        let result = evaluate(&defs, &expr).unwrap();
        assert!(result.ptr_eq(&expr));
    }

    #[test]
    fn second_evaluation_returns_the_identical_node() {
        let defs = no_defs();
        let expr = parse_expr("ap ap add 1 2").unwrap();
        let first = evaluate(&defs, &expr).unwrap();
        let second = evaluate(&defs, &expr).unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(first.as_number(), Some(3));
    }

    #[test]
    fn normal_forms_are_their_own_fixed_point() {
        let defs = no_defs();
        let atom = Expr::num(5);
        assert!(evaluate(&defs, &atom).unwrap().ptr_eq(&atom));
        let stuck = parse_expr("ap 1 2").unwrap();
        assert!(evaluate(&defs, &stuck).unwrap().ptr_eq(&stuck));
    }

    #[test]
    fn cons_evaluates_operands_eagerly() {
        let defs = no_defs();
        let expr = parse_expr("ap ap cons ap ap add 1 2 ap neg 4").unwrap();
        let result = evaluate(&defs, &expr).unwrap();
        let (head, tail) = result.as_pair().unwrap();
        assert_eq!(head.as_number(), Some(3));
        assert_eq!(tail.as_number(), Some(-4));
        // The pair caches itself.
        assert!(result.cached().unwrap().ptr_eq(&result));
    }

    #[test]
    fn type_mismatch_on_non_numeric_operand() {
        let defs = no_defs();
        let expr = parse_expr("ap ap add t 2").unwrap();
        match evaluate(&defs, &expr) {
            Err(EvalError::TypeMismatch { expected, .. }) => assert_eq!(expected, "a number"),
            other => panic!("expected a type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn divergence_hits_the_reduction_bound() {
        let defs = parse("loop = ap i loop").unwrap();
        match evaluate(&defs, &Expr::name("loop")) {
            Err(EvalError::NonConvergence(bound)) => assert_eq!(bound, MAX_REDUCTIONS),
            other => panic!("expected non-convergence, got {:?}", other),
        }
    }

    #[test]
    fn extract_list_walks_the_spine() {
        let defs = no_defs();
        let cases: &[(&str, usize)] = &[
            ("nil", 0),
            ("ap ap cons 1 nil", 1),
            ("ap ap cons 1 ap ap cons 2 nil", 2),
            ("ap ap cons 1 ap ap cons 2 ap ap cons 3 nil", 3),
        ];
        for (src, len) in cases {
            let expr = parse_expr(src).unwrap();
            let items = extract_list(&defs, &expr).unwrap();
            assert_eq!(items.len(), *len, "for {:?}", src);
            for (i, item) in items.iter().enumerate() {
                assert_eq!(item.as_number(), Some(i as i64 + 1), "for {:?}", src);
            }
        }
    }

    #[test]
    fn extract_list_keeps_nested_lists_whole() {
        let defs = no_defs();
        let expr =
            parse_expr("ap ap cons 1 ap ap cons ap ap cons 2 ap ap cons 3 nil nil").unwrap();
        let items = extract_list(&defs, &expr).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_number(), Some(1));
        let nested = extract_list(&defs, &items[1]).unwrap();
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].as_number(), Some(2));
        assert_eq!(nested[1].as_number(), Some(3));
    }

    #[test]
    fn extract_list_rejects_improper_lists() {
        let defs = no_defs();
        let expr = parse_expr("ap ap cons 1 2").unwrap();
        assert!(matches!(
            extract_list(&defs, &expr),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn list_spine_built_through_reduction() {
        // car/cdr over a spine that still needs reduction steps.
        let defs = parse("one = 1\nrest = ap ap cons 2 nil\nxs = ap ap cons one rest").unwrap();
        let items = extract_list(&defs, &Expr::name("xs")).unwrap();
        assert_eq!(items.len(), 2);
        let defs_ref = &defs;
        assert_eq!(eval_one_number(defs_ref, &items[0]).unwrap(), 1);
    }
}
