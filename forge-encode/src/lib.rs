//! Embedding and reranking model wrappers sharing the step-bound tensor
//! runtime abstraction (`forge-runtime`) and tokenizer (`forge-text`).

pub mod encoder;
pub mod error;
pub mod model;

pub use encoder::{Embedder, EncoderHost, Reranker, DEFAULT_MAX_INPUT_BYTES};
pub use error::EncodeError;
pub use model::EncoderModel;
