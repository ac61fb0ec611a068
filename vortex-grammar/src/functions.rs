//! Stateful and stateless functions callable from expressions (§4.3).
//!
//! `sigma()` and `count()` carry state across evaluations for the same
//! compiled expression instance (one evaluator per node per group, §5);
//! math passthroughs are pure. `if()` is not represented here — it
//! short-circuits its branches and can return any `Value` type, so the
//! evaluator special-cases it directly rather than routing it through
//! this trait.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("{0}() expects {1} argument(s), got {2}")]
    ArityMismatch(String, usize, usize),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
}

/// A function whose result depends on values seen on prior calls.
/// `reset()` clears accumulated state, used when a group's window rolls
/// over or a node is restored from an empty snapshot.
pub trait StatefulFunction: Send {
    fn reset(&mut self);
    fn call(&mut self, args: &[f64]) -> Result<f64, EvalError>;
    fn snapshot(&self) -> Vec<u8>;
    fn restore(&mut self, bytes: &[u8]);
}

/// Running mean/variance via Welford's algorithm; `sigma(x)` returns the
/// number of standard deviations `x` is from the running mean (z-score),
/// or `0.0` until at least two samples have been observed.
#[derive(Debug, Clone, Default)]
pub struct SigmaFunction {
    count: u64,
    mean: f64,
    m2: f64,
}

impl SigmaFunction {
    pub fn new() -> Self {
        Self::default()
    }

    fn observe(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }
}

impl StatefulFunction for SigmaFunction {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn call(&mut self, args: &[f64]) -> Result<f64, EvalError> {
        if args.len() != 1 {
            return Err(EvalError::ArityMismatch("sigma".to_string(), 1, args.len()));
        }
        let x = args[0];
        self.observe(x);
        let sd = self.variance().sqrt();
        if self.count < 2 || sd == 0.0 {
            Ok(0.0)
        } else {
            Ok((x - self.mean) / sd)
        }
    }

    fn snapshot(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24);
        buf.extend_from_slice(&self.count.to_le_bytes());
        buf.extend_from_slice(&self.mean.to_le_bytes());
        buf.extend_from_slice(&self.m2.to_le_bytes());
        buf
    }

    fn restore(&mut self, bytes: &[u8]) {
        if bytes.len() < 24 {
            return;
        }
        self.count = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        self.mean = f64::from_le_bytes(bytes[8..16].try_into().unwrap());
        self.m2 = f64::from_le_bytes(bytes[16..24].try_into().unwrap());
    }
}

/// `count()` returns the number of times it has been called since the
/// last reset; takes no arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountFunction {
    n: u64,
}

impl CountFunction {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatefulFunction for CountFunction {
    fn reset(&mut self) {
        self.n = 0;
    }

    fn call(&mut self, args: &[f64]) -> Result<f64, EvalError> {
        if !args.is_empty() {
            return Err(EvalError::ArityMismatch("count".to_string(), 0, args.len()));
        }
        self.n += 1;
        Ok(self.n as f64)
    }

    fn snapshot(&self) -> Vec<u8> {
        self.n.to_le_bytes().to_vec()
    }

    fn restore(&mut self, bytes: &[u8]) {
        if bytes.len() < 8 {
            return;
        }
        self.n = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    }
}

/// Pure single-argument math passthroughs (`abs`, `sqrt`, `floor`, `ceil`,
/// `round`, `ln`, `exp`). Stateless but implemented behind the same trait
/// so the evaluator's function table stays uniform.
#[derive(Debug, Clone, Copy)]
pub struct MathFn(pub fn(f64) -> f64);

impl StatefulFunction for MathFn {
    fn reset(&mut self) {}

    fn call(&mut self, args: &[f64]) -> Result<f64, EvalError> {
        if args.len() != 1 {
            return Err(EvalError::ArityMismatch("math fn".to_string(), 1, args.len()));
        }
        Ok((self.0)(args[0]))
    }

    fn snapshot(&self) -> Vec<u8> {
        Vec::new()
    }

    fn restore(&mut self, _bytes: &[u8]) {}
}

/// Look up the built-in `fn(f64) -> f64` for a math passthrough name, if
/// any. Returns `None` for names handled elsewhere (`sigma`, `count`,
/// `if`) or unknown names.
pub fn math_passthrough(name: &str) -> Option<fn(f64) -> f64> {
    match name {
        "abs" => Some(f64::abs),
        "sqrt" => Some(f64::sqrt),
        "floor" => Some(f64::floor),
        "ceil" => Some(f64::ceil),
        "round" => Some(f64::round),
        "ln" => Some(f64::ln),
        "exp" => Some(f64::exp),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigma_returns_zero_before_two_samples() {
        let mut f = SigmaFunction::new();
        assert_eq!(f.call(&[10.0]).unwrap(), 0.0);
    }

    #[test]
    fn sigma_tracks_running_zscore() {
        let mut f = SigmaFunction::new();
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            f.call(&[x]).unwrap();
        }
        // mean is 3, so the last sample (5) sits above the running mean.
        let z = f.call(&[5.0]).unwrap();
        assert!(z > 0.0);
    }

    #[test]
    fn sigma_snapshot_round_trips() {
        let mut f = SigmaFunction::new();
        for x in [1.0, 2.0, 3.0] {
            f.call(&[x]).unwrap();
        }
        let snap = f.snapshot();
        let mut restored = SigmaFunction::new();
        restored.restore(&snap);
        assert_eq!(restored.count, f.count);
        assert_eq!(restored.mean, f.mean);
        assert_eq!(restored.m2, f.m2);
    }

    #[test]
    fn count_increments_per_call_and_resets() {
        let mut f = CountFunction::new();
        assert_eq!(f.call(&[]).unwrap(), 1.0);
        assert_eq!(f.call(&[]).unwrap(), 2.0);
        f.reset();
        assert_eq!(f.call(&[]).unwrap(), 1.0);
    }

    #[test]
    fn count_rejects_arguments() {
        let mut f = CountFunction::new();
        assert!(f.call(&[1.0]).is_err());
    }

    #[test]
    fn math_passthrough_resolves_known_names() {
        assert!(math_passthrough("abs").is_some());
        assert!(math_passthrough("sigma").is_none());
        assert!(math_passthrough("if").is_none());
    }

    #[test]
    fn math_fn_applies_wrapped_function() {
        let mut f = MathFn(f64::sqrt);
        assert_eq!(f.call(&[9.0]).unwrap(), 3.0);
    }
}
