use thiserror::Error;

use forge_runtime::RuntimeError;
use forge_text::TokenizerError;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("runtime error: {0}")]
    RuntimeError(String),
}

impl From<RuntimeError> for EncodeError {
    fn from(err: RuntimeError) -> Self {
        EncodeError::RuntimeError(err.to_string())
    }
}

impl From<TokenizerError> for EncodeError {
    fn from(err: TokenizerError) -> Self {
        EncodeError::RuntimeError(err.to_string())
    }
}
