//! Expression evaluation (§4.3, §9 "expression polymorphism").
//!
//! An `Evaluator` is bound to one expression instance for the lifetime of
//! a group: `sigma()`/`count()` accumulate across calls until the group's
//! window rolls over or the node is reset. Division by zero and
//! out-of-domain math (e.g. `ln(-1)`) produce `NaN` rather than an error;
//! `NaN` is treated as `false` wherever a predicate is required, per the
//! corresponding runtime semantics in §4.3.

use std::collections::HashMap;

use regex::Regex;
use vortex_shared::model::Value;

use crate::ast::{BinOp, Expr, UnOp};
use crate::functions::{math_passthrough, CountFunction, EvalError, MathFn, SigmaFunction, StatefulFunction};

pub struct Evaluator {
    functions: HashMap<String, Box<dyn StatefulFunction>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Reset all accumulated function state (window rollover or restore
    /// from an empty snapshot).
    pub fn reset(&mut self) {
        for f in self.functions.values_mut() {
            f.reset();
        }
    }

    /// Evaluate `expr` against the current variable bindings. Variable
    /// lookups missing from `vars` are an `EvalError::UnboundVariable`.
    pub fn eval(&mut self, expr: &Expr, vars: &HashMap<String, Value>) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Float(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Regex(_) => Err(EvalError::TypeError(
                "a regex literal is only valid as the right operand of =~/!~".to_string(),
            )),
            Expr::Ident(name) => vars
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Expr::Unary { op, expr } => self.eval_unary(*op, expr, vars),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, vars),
            Expr::Call { name, args } => self.eval_call(name, args, vars),
        }
    }

    fn eval_unary(&mut self, op: UnOp, expr: &Expr, vars: &HashMap<String, Value>) -> Result<Value, EvalError> {
        let v = self.eval(expr, vars)?;
        match op {
            UnOp::Neg => as_num(&v).map(|n| Value::Float(-n)),
            UnOp::Not => as_bool(&v).map(|b| Value::Bool(!b)),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        vars: &HashMap<String, Value>,
    ) -> Result<Value, EvalError> {
        use BinOp::*;
        match op {
            Or => {
                let l = as_bool(&self.eval(left, vars)?)?;
                if l {
                    return Ok(Value::Bool(true));
                }
                let r = as_bool(&self.eval(right, vars)?)?;
                Ok(Value::Bool(l || r))
            }
            And => {
                let l = as_bool(&self.eval(left, vars)?)?;
                if !l {
                    return Ok(Value::Bool(false));
                }
                let r = as_bool(&self.eval(right, vars)?)?;
                Ok(Value::Bool(l && r))
            }
            Eq | Ne => {
                let lv = self.eval(left, vars)?;
                let rv = self.eval(right, vars)?;
                let eq = values_equal(&lv, &rv)?;
                Ok(Value::Bool(if op == Eq { eq } else { !eq }))
            }
            Lt | Le | Gt | Ge => {
                let l = as_num(&self.eval(left, vars)?)?;
                let r = as_num(&self.eval(right, vars)?)?;
                let result = match op {
                    Lt => l < r,
                    Le => l <= r,
                    Gt => l > r,
                    Ge => l >= r,
                    _ => unreachable!(),
                };
                // NaN comparisons are always false, matching IEEE 754 and
                // the "NaN is falsy" predicate convention.
                Ok(Value::Bool(result))
            }
            Match | NotMatch => {
                let l = as_str(&self.eval(left, vars)?)?;
                let pattern = match right {
                    Expr::Regex(p) => p,
                    _ => {
                        return Err(EvalError::TypeError(
                            "=~/!~ requires a regex literal on the right".to_string(),
                        ))
                    }
                };
                let re = Regex::new(pattern)
                    .map_err(|e| EvalError::TypeError(format!("invalid regex /{pattern}/: {e}")))?;
                let matched = re.is_match(&l);
                Ok(Value::Bool(if op == Match { matched } else { !matched }))
            }
            Add | Sub | Mul | Div | Mod => {
                let l = as_num(&self.eval(left, vars)?)?;
                let r = as_num(&self.eval(right, vars)?)?;
                let result = match op {
                    Add => l + r,
                    Sub => l - r,
                    Mul => l * r,
                    // Division and modulo by zero yield NaN rather than panicking
                    // or erroring, per float semantics.
                    Div => l / r,
                    Mod => l % r,
                    _ => unreachable!(),
                };
                Ok(Value::Float(result))
            }
        }
    }

    fn eval_call(&mut self, name: &str, args: &[Expr], vars: &HashMap<String, Value>) -> Result<Value, EvalError> {
        if name == "if" {
            if args.len() != 3 {
                return Err(EvalError::ArityMismatch("if".to_string(), 3, args.len()));
            }
            let cond = as_bool(&self.eval(&args[0], vars)?)?;
            return if cond {
                self.eval(&args[1], vars)
            } else {
                self.eval(&args[2], vars)
            };
        }

        let mut numeric_args = Vec::with_capacity(args.len());
        for a in args {
            numeric_args.push(as_num(&self.eval(a, vars)?)?);
        }

        let func = self.functions.entry(name.to_string()).or_insert_with(|| {
            make_function(name)
        });
        let func = match func {
            Some(f) => f,
            None => return Err(EvalError::UnknownFunction(name.to_string())),
        };
        let result = func.call(&numeric_args)?;
        Ok(Value::Float(result))
    }
}

fn make_function(name: &str) -> Option<Box<dyn StatefulFunction>> {
    match name {
        "sigma" => Some(Box::new(SigmaFunction::new())),
        "count" => Some(Box::new(CountFunction::new())),
        _ => math_passthrough(name).map(|f| Box::new(MathFn(f)) as Box<dyn StatefulFunction>),
    }
}

fn as_num(v: &Value) -> Result<f64, EvalError> {
    match v {
        Value::Float(n) => Ok(*n),
        Value::Int(n) => Ok(*n as f64),
        other => Err(EvalError::TypeError(format!(
            "expected num, found {}",
            other.type_name()
        ))),
    }
}

fn as_bool(v: &Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Float(n) => Ok(!n.is_nan() && *n != 0.0),
        other => Err(EvalError::TypeError(format!(
            "expected bool, found {}",
            other.type_name()
        ))),
    }
}

fn as_str(v: &Value) -> Result<String, EvalError> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        other => Err(EvalError::TypeError(format!(
            "expected str, found {}",
            other.type_name()
        ))),
    }
}

fn values_equal(l: &Value, r: &Value) -> Result<bool, EvalError> {
    match (l, r) {
        (Value::Float(a), Value::Float(b)) => Ok(a == b),
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Float(a), Value::Int(b)) | (Value::Int(b), Value::Float(a)) => Ok(*a == *b as f64),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        _ => Err(EvalError::TypeError(format!(
            "cannot compare {} with {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn evaluates_arithmetic() {
        let expr = parse("1 + 2 * 3").unwrap();
        let mut ev = Evaluator::new();
        assert_eq!(ev.eval(&expr, &HashMap::new()).unwrap(), Value::Float(7.0));
    }

    #[test]
    fn evaluates_ident_from_vars() {
        let expr = parse("cpu > 90").unwrap();
        let mut ev = Evaluator::new();
        let v = vars(&[("cpu", Value::Float(95.0))]);
        assert_eq!(ev.eval(&expr, &v).unwrap(), Value::Bool(true));
    }

    #[test]
    fn unbound_variable_is_an_eval_error() {
        let expr = parse("missing > 1").unwrap();
        let mut ev = Evaluator::new();
        assert!(ev.eval(&expr, &HashMap::new()).is_err());
    }

    #[test]
    fn division_by_zero_yields_nan_not_error() {
        let expr = parse("1 / 0").unwrap();
        let mut ev = Evaluator::new();
        let result = ev.eval(&expr, &HashMap::new()).unwrap();
        match result {
            Value::Float(n) => assert!(n.is_nan() || n.is_infinite()),
            other => panic!("expected numeric result, got {other:?}"),
        }
    }

    #[test]
    fn regex_match_evaluates_against_string_var() {
        let expr = parse(r#"host =~ /^web-\d+$/"#).unwrap();
        let mut ev = Evaluator::new();
        let v = vars(&[("host", Value::Str("web-12".to_string()))]);
        assert_eq!(ev.eval(&expr, &v).unwrap(), Value::Bool(true));
    }

    #[test]
    fn if_short_circuits_untaken_branch() {
        // The untaken branch references an unbound variable; if `if` were
        // not short-circuiting this would error.
        let expr = parse("if(TRUE, 1, missing)").unwrap();
        let mut ev = Evaluator::new();
        assert_eq!(ev.eval(&expr, &HashMap::new()).unwrap(), Value::Float(1.0));
    }

    #[test]
    fn sigma_accumulates_across_evaluator_calls() {
        let expr = parse("sigma(x)").unwrap();
        let mut ev = Evaluator::new();
        for sample in [1.0, 2.0, 3.0, 4.0] {
            ev.eval(&expr, &vars(&[("x", Value::Float(sample))])).unwrap();
        }
        let z = ev
            .eval(&expr, &vars(&[("x", Value::Float(100.0))]))
            .unwrap();
        match z {
            Value::Float(n) => assert!(n > 1.0),
            other => panic!("expected numeric z-score, got {other:?}"),
        }
    }

    #[test]
    fn count_increments_with_each_call() {
        let expr = parse("count()").unwrap();
        let mut ev = Evaluator::new();
        assert_eq!(ev.eval(&expr, &HashMap::new()).unwrap(), Value::Float(1.0));
        assert_eq!(ev.eval(&expr, &HashMap::new()).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn reset_clears_stateful_function_accumulators() {
        let expr = parse("count()").unwrap();
        let mut ev = Evaluator::new();
        ev.eval(&expr, &HashMap::new()).unwrap();
        ev.eval(&expr, &HashMap::new()).unwrap();
        ev.reset();
        assert_eq!(ev.eval(&expr, &HashMap::new()).unwrap(), Value::Float(1.0));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let expr = parse("bogus(1)").unwrap();
        let mut ev = Evaluator::new();
        assert!(ev.eval(&expr, &HashMap::new()).is_err());
    }

    #[test]
    fn math_passthrough_applies() {
        let expr = parse("sqrt(9)").unwrap();
        let mut ev = Evaluator::new();
        assert_eq!(ev.eval(&expr, &HashMap::new()).unwrap(), Value::Float(3.0));
    }
}
