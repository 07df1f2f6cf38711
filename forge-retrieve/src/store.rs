use async_trait::async_trait;

use crate::error::RetrieveError;
use crate::item::{RetrievalItem, ScoredItem};

/// Common surface over the in-memory and pgvector-backed retrieval stores.
/// `async` throughout so a single trait object can back either; the
/// in-memory implementation's futures simply resolve immediately.
#[async_trait]
pub trait VectorStore {
    async fn upsert(&self, item: RetrievalItem) -> Result<(), RetrieveError>;
    async fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>, RetrieveError>;
}
