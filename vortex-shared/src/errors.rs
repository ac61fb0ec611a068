//! Error taxonomy.
//!
//! One variant per error category. `is_recoverable()` lets callers decide
//! whether to retry without matching on every variant.

use thiserror::Error;

pub type VortexResult<T> = Result<T, VortexError>;

#[derive(Debug, Error)]
pub enum VortexError {
    /// User program malformed or type-incompatible; surfaced at create/update,
    /// never observed at runtime.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Illegal state transition; reported synchronously.
    #[error("state error: {0}")]
    StateError(String),

    /// Network, timeout, or 5xx from a dependency. Retried with exponential
    /// backoff; surfaced as a dropped event after exhausting attempts.
    #[error("transient I/O error: {0}")]
    TransientIoError(String),

    /// 4xx from a dependency or authentication failure. Surfaced immediately,
    /// never retried.
    #[error("permanent I/O error: {0}")]
    PermanentIoError(String),

    /// Expression failed for a specific message; the message is dropped and
    /// counted.
    #[error("expression evaluation error: {0}")]
    EvalError(String),

    /// Unrecoverable; kills the owning task.
    #[error("fatal node error: {0}")]
    FatalNodeError(String),
}

impl VortexError {
    /// Whether this error class is worth retrying (§7 propagation rules).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VortexError::TransientIoError(_))
    }

    /// Whether this error should kill only the owning task (never crosses
    /// task boundaries, per §7).
    pub fn is_fatal_to_task(&self) -> bool {
        matches!(self, VortexError::FatalNodeError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_recoverable() {
        assert!(VortexError::TransientIoError("timeout".into()).is_recoverable());
    }

    #[test]
    fn permanent_is_not_recoverable() {
        assert!(!VortexError::PermanentIoError("401".into()).is_recoverable());
    }

    #[test]
    fn eval_error_is_not_recoverable() {
        assert!(!VortexError::EvalError("type mismatch".into()).is_recoverable());
    }

    #[test]
    fn fatal_node_error_is_fatal_to_task() {
        assert!(VortexError::FatalNodeError("oom".into()).is_fatal_to_task());
        assert!(!VortexError::ValidationError("bad".into()).is_fatal_to_task());
    }

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(
            VortexError::StateError("already enabled".into()).to_string(),
            "state error: already enabled"
        );
    }
}
