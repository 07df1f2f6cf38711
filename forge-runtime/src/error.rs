use thiserror::Error;

/// Failure kinds surfaced by the tensor-runtime facade.
///
/// These map onto the error kinds of `spec.md` §7: `ModelNotFound` and
/// `TokenizerNotFound` are `NotFound`, `ShapeMismatch` and
/// `ProviderUnsupported` are `InvalidArgument`/`InvariantViolation`
/// depending on call site, and `Internal` is `RuntimeFailure`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),

    #[error("no supported execution provider among {0:?}")]
    ProviderUnsupported(Vec<String>),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("runtime error: {0}")]
    Internal(String),
}

impl From<ort::Error> for RuntimeError {
    fn from(err: ort::Error) -> Self {
        RuntimeError::Internal(err.to_string())
    }
}
