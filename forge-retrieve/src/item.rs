use std::collections::HashMap;

/// A retrievable document fragment: a dense vector, its source text, and
/// optional metadata (`spec.md` §3, Retrieval item).
///
/// `dim` is fixed per embedding model (1024 for the reference model); this
/// type does not enforce it itself -- the store does, at `upsert` time,
/// against whatever dimension its first inserted item established.
#[derive(Debug, Clone)]
pub struct RetrievalItem {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

impl RetrievalItem {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, text: impl Into<String>) -> Self {
        RetrievalItem {
            id: id.into(),
            vector,
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One scored hit from a `top_k` query.
#[derive(Debug, Clone)]
pub struct ScoredItem {
    pub item: RetrievalItem,
    pub score: f32,
}
