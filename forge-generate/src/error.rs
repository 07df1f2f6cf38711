use thiserror::Error;

use forge_runtime::RuntimeError;
use forge_text::TokenizerError;

/// The six error kinds of `spec.md` §7, unified across every crate in the
/// workspace. Each crate's narrower error type converts into this one at the
/// orchestrator boundary (`SPEC_FULL.md` §7).
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("runtime failure: {0}")]
    RuntimeFailure(String),

    #[error("cancelled")]
    Cancelled,

    #[error("tool failure: {0}")]
    ToolFailure(String),
}

impl From<RuntimeError> for ForgeError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::ModelNotFound(path) => ForgeError::NotFound(path),
            RuntimeError::ProviderUnsupported(providers) => {
                ForgeError::InvalidArgument(format!("no supported provider among {providers:?}"))
            }
            RuntimeError::ShapeMismatch(msg) => ForgeError::InvariantViolation(msg),
            RuntimeError::Internal(msg) => ForgeError::RuntimeFailure(msg),
        }
    }
}

impl From<TokenizerError> for ForgeError {
    fn from(err: TokenizerError) -> Self {
        match err {
            TokenizerError::NotFound(path) => ForgeError::NotFound(path),
            TokenizerError::Inner(msg) => ForgeError::RuntimeFailure(msg),
        }
    }
}
