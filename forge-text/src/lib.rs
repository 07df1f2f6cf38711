//! Tokenization and chat-template rendering.
//!
//! This crate provides the encode/decode surface consumed by
//! `forge-generate` and `forge-encode`, and the chat-template string
//! builder consumed by `forge-agent`'s orchestrator.

pub mod template;
pub mod tokenizer;

pub use tokenizer::{TokenId, Tokenizer, TokenizerError};
