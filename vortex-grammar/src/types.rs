//! Static type checking (§4.3).
//!
//! Arithmetic requires `num`; `=~`/`!~` require `str` on the left and a
//! regex literal on the right; logical operators require `bool`; equality
//! requires matching types. A variable's type is unknown at compile time
//! (we have no schema binding identifiers to field/tag types), so any
//! subtree rooted at an `Ident` defers its check to evaluation — this
//! function only rejects type errors that are determinable from literals
//! and function return types alone.

use thiserror::Error;

use crate::ast::{BinOp, Expr, UnOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Num,
    Bool,
    Str,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("type error: {0}")]
pub struct ValidationError(pub String);

/// Functions that are known, at compile time, to return `num` (the
/// provided stateful functions and math passthroughs, §4.3). `if` is
/// handled separately since its return type depends on its branches.
fn is_numeric_function(name: &str) -> bool {
    !matches!(name, "if")
}

/// Infer the static type of `expr` when it is fully determinable without a
/// variable-type schema; `None` means "depends on a runtime value" and is
/// not itself an error.
pub fn infer_type(expr: &Expr) -> Option<Type> {
    match expr {
        Expr::Number(_) => Some(Type::Num),
        Expr::Str(_) => Some(Type::Str),
        Expr::Bool(_) => Some(Type::Bool),
        Expr::Regex(_) => None,
        Expr::Ident(_) => None,
        Expr::Unary { op, expr } => {
            let inner = infer_type(expr);
            match (op, inner) {
                (UnOp::Neg, Some(Type::Num)) => Some(Type::Num),
                (UnOp::Not, Some(Type::Bool)) => Some(Type::Bool),
                _ => None,
            }
        }
        Expr::Binary { op, left, right } => infer_binary_type(*op, left, right),
        Expr::Call { name, args } => {
            if name == "if" {
                if args.len() == 3 {
                    let a = infer_type(&args[1]);
                    let b = infer_type(&args[2]);
                    if a.is_some() && a == b {
                        a
                    } else {
                        None
                    }
                } else {
                    None
                }
            } else if is_numeric_function(name) {
                Some(Type::Num)
            } else {
                None
            }
        }
    }
}

fn infer_binary_type(op: BinOp, left: &Expr, right: &Expr) -> Option<Type> {
    use BinOp::*;
    match op {
        Or | And => {
            let l = infer_type(left);
            let r = infer_type(right);
            if l == Some(Type::Bool) && r == Some(Type::Bool) {
                Some(Type::Bool)
            } else {
                None
            }
        }
        Eq | Ne => {
            let l = infer_type(left);
            let r = infer_type(right);
            if l.is_some() && l == r {
                Some(Type::Bool)
            } else {
                None
            }
        }
        Lt | Le | Gt | Ge => {
            let l = infer_type(left);
            let r = infer_type(right);
            if l == Some(Type::Num) && r == Some(Type::Num) {
                Some(Type::Bool)
            } else {
                None
            }
        }
        Match | NotMatch => {
            let l = infer_type(left);
            if l == Some(Type::Str) && matches!(right, Expr::Regex(_)) {
                Some(Type::Bool)
            } else {
                None
            }
        }
        Add | Sub | Mul | Div | Mod => {
            let l = infer_type(left);
            let r = infer_type(right);
            if l == Some(Type::Num) && r == Some(Type::Num) {
                Some(Type::Num)
            } else {
                None
            }
        }
    }
}

/// Reject type errors determinable purely from the expression's literal
/// structure. Subtrees whose type depends on a variable are deferred to
/// evaluation (an evaluation type error there becomes an `EvalError`).
pub fn static_check(expr: &Expr) -> Result<(), ValidationError> {
    match expr {
        Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Regex(_) | Expr::Ident(_) => Ok(()),
        Expr::Unary { op, expr: inner } => {
            static_check(inner)?;
            if let Some(t) = infer_type(inner) {
                let ok = match op {
                    UnOp::Neg => t == Type::Num,
                    UnOp::Not => t == Type::Bool,
                };
                if !ok {
                    return Err(ValidationError(format!(
                        "unary {op:?} requires {:?}, found {t:?}",
                        expected_for_unary(*op)
                    )));
                }
            }
            Ok(())
        }
        Expr::Binary { op, left, right } => {
            static_check(left)?;
            static_check(right)?;
            check_binary(*op, left, right)
        }
        Expr::Call { name, args } => {
            for a in args {
                static_check(a)?;
            }
            if name == "if" && args.len() != 3 {
                return Err(ValidationError(
                    "if() requires exactly 3 arguments: condition, then, else".to_string(),
                ));
            }
            if name == "if" {
                if let Some(Type::Num | Type::Str) = infer_type(&args[0]) {
                    return Err(ValidationError(
                        "if() condition must be bool".to_string(),
                    ));
                }
            } else {
                for a in args {
                    if let Some(t) = infer_type(a) {
                        if t != Type::Num {
                            return Err(ValidationError(format!(
                                "{name}() arguments must be num, found {t:?}"
                            )));
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

fn expected_for_unary(op: UnOp) -> Type {
    match op {
        UnOp::Neg => Type::Num,
        UnOp::Not => Type::Bool,
    }
}

fn check_binary(op: BinOp, left: &Expr, right: &Expr) -> Result<(), ValidationError> {
    use BinOp::*;
    let l = infer_type(left);
    let r = infer_type(right);
    match op {
        Or | And => {
            require(l, Type::Bool, "logical")?;
            require(r, Type::Bool, "logical")
        }
        Eq | Ne => {
            if let (Some(lt), Some(rt)) = (l, r) {
                if lt != rt {
                    return Err(ValidationError(format!(
                        "equality requires matching types, found {lt:?} and {rt:?}"
                    )));
                }
            }
            Ok(())
        }
        Lt | Le | Gt | Ge => {
            require(l, Type::Num, "comparison")?;
            require(r, Type::Num, "comparison")
        }
        Match | NotMatch => {
            require(l, Type::Str, "=~/!~")?;
            if !matches!(right, Expr::Regex(_)) {
                return Err(ValidationError("=~/!~ requires a regex literal on the right".to_string()));
            }
            Ok(())
        }
        Add | Sub | Mul | Div | Mod => {
            require(l, Type::Num, "arithmetic")?;
            require(r, Type::Num, "arithmetic")
        }
    }
}

fn require(actual: Option<Type>, expected: Type, context: &str) -> Result<(), ValidationError> {
    match actual {
        Some(t) if t != expected => Err(ValidationError(format!(
            "{context} requires {expected:?}, found {t:?}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn literal_arithmetic_type_checks() {
        static_check(&parse("1 + 2").unwrap()).unwrap();
    }

    #[test]
    fn literal_arithmetic_type_mismatch_is_rejected() {
        let err = static_check(&parse("1 + TRUE").unwrap());
        assert!(err.is_err());
    }

    #[test]
    fn ident_defers_to_runtime() {
        // "x" has unknown compile-time type; should not be rejected statically.
        static_check(&parse("x + 1").unwrap()).unwrap();
    }

    #[test]
    fn regex_match_requires_literal_regex() {
        static_check(&parse("host =~ /web/").unwrap()).unwrap();
    }

    #[test]
    fn logical_and_requires_bool_literals() {
        let err = static_check(&parse("1 AND 2").unwrap());
        assert!(err.is_err());
    }

    #[test]
    fn equality_requires_matching_literal_types() {
        let err = static_check(&parse("1 == TRUE").unwrap());
        assert!(err.is_err());
    }

    #[test]
    fn if_requires_three_args() {
        let err = static_check(&parse("if(TRUE, 1)").unwrap());
        assert!(err.is_err());
    }

    #[test]
    fn if_allows_matching_branch_types() {
        static_check(&parse("if(TRUE, 1, 2)").unwrap()).unwrap();
    }
}
