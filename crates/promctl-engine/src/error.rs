use thiserror::Error;

use promctl_state::StateError;

/// Errors that abort a pass. Everything the reconciler can recover from on
/// a later trigger is reported as a `PassOutcome` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type EngineResult<T> = Result<T, EngineError>;
