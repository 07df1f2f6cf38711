use std::path::Path;

use thiserror::Error;
use tokenizers::Tokenizer as HfTokenizer;

pub type TokenId = u32;

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("tokenizer file not found: {0}")]
    NotFound(String),

    #[error("tokenizer error: {0}")]
    Inner(String),
}

/// Wraps a Hugging Face `tokenizers::Tokenizer`, exposing only the
/// encode/decode surface the rest of the workspace is allowed to assume
/// (`spec.md` §6, Subword tokenizer).
pub struct Tokenizer {
    inner: HfTokenizer,
}

impl Tokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TokenizerError::NotFound(path.display().to_string()));
        }
        let inner =
            HfTokenizer::from_file(path).map_err(|e| TokenizerError::Inner(e.to_string()))?;
        Ok(Tokenizer { inner })
    }

    pub fn from_json(json: &str) -> Result<Self, TokenizerError> {
        let inner =
            HfTokenizer::from_bytes(json.as_bytes()).map_err(|e| TokenizerError::Inner(e.to_string()))?;
        Ok(Tokenizer { inner })
    }

    /// Encode `text`, returning the token ids and the tokenizer's normalized
    /// view of the input text.
    pub fn encode(&self, text: &str) -> Result<(Vec<TokenId>, String), TokenizerError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TokenizerError::Inner(e.to_string()))?;
        Ok((encoding.get_ids().to_vec(), text.to_string()))
    }

    pub fn decode(&self, ids: &[TokenId]) -> Result<String, TokenizerError> {
        self.inner
            .decode(ids, true)
            .map_err(|e| TokenizerError::Inner(e.to_string()))
    }

    /// Look up the id of a special/added token by its literal text, e.g.
    /// `<|eot_id|>`. Needed to splice control tokens into a prompt that the
    /// ordinary `encode` path would otherwise treat as literal text.
    pub fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.inner.token_to_id(token)
    }
}
