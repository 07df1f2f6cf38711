use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("runtime failure: {0}")]
    RuntimeFailure(String),
}

impl From<sqlx::Error> for RetrieveError {
    fn from(err: sqlx::Error) -> Self {
        RetrieveError::RuntimeFailure(err.to_string())
    }
}
