use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::RetrieveError;
use crate::item::{RetrievalItem, ScoredItem};
use crate::store::VectorStore;

/// The `1e-9` floor under the squared-sum before the square root, per
/// `spec.md` §4.9's numerical note, so normalizing an all-zero vector
/// divides by a small positive number rather than zero.
const NORM_EPSILON: f32 = 1e-9;

/// In-memory retrieval store: an insertion-ordered `Vec` plus an id index.
/// Upsert replaces in place so the original insertion position -- and
/// therefore tie-break order in `top_k` -- is preserved across updates.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: Vec<RetrievalItem>,
    index: HashMap<String, usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert `item` if its id is absent, else replace the existing entry
    /// in place (`spec.md` §3/§4.9).
    #[instrument(skip(self, item), fields(id = %item.id))]
    pub fn upsert(&mut self, item: RetrievalItem) {
        if let Some(&position) = self.index.get(&item.id) {
            self.items[position] = item;
        } else {
            self.index.insert(item.id.clone(), self.items.len());
            self.items.push(item);
        }
    }

    /// Cosine-similarity top-k: L2-normalize `query` and every stored
    /// vector, score by dot product, sort by descending similarity with
    /// ties broken by ascending insertion order, return the first `k`.
    #[instrument(skip(self, query))]
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>, RetrieveError> {
        if query.is_empty() {
            return Err(RetrieveError::InvalidArgument(
                "query vector must not be empty".into(),
            ));
        }

        let normalized_query = normalize(query);
        let mut scored: Vec<(usize, f32)> = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let normalized_item = normalize(&item.vector);
                let score = dot(&normalized_query, &normalized_item);
                (idx, score)
            })
            .collect();

        scored.sort_by(|(idx_a, score_a), (idx_b, score_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(idx_a.cmp(idx_b))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| ScoredItem {
                item: self.items[idx].clone(),
                score,
            })
            .collect())
    }
}

/// `VectorStore`-object-safe wrapper around [`InMemoryStore`], guarded by a
/// single-writer/many-readers mutex per `spec.md` §5's locking discipline:
/// upserts take the lock exclusively, queries take it only for their own
/// read.
#[derive(Debug, Default)]
pub struct SharedInMemoryStore {
    inner: Mutex<InMemoryStore>,
}

impl SharedInMemoryStore {
    pub fn new() -> Self {
        SharedInMemoryStore::default()
    }
}

#[async_trait]
impl VectorStore for SharedInMemoryStore {
    async fn upsert(&self, item: RetrievalItem) -> Result<(), RetrieveError> {
        self.inner.lock().await.upsert(item);
        Ok(())
    }

    async fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>, RetrieveError> {
        self.inner.lock().await.top_k(query, k)
    }
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let sum_sq: f32 = vector.iter().map(|x| x * x).sum();
    let norm = (sum_sq + NORM_EPSILON).sqrt();
    vector.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_existing_entry_in_place() {
        let mut store = InMemoryStore::new();
        store.upsert(RetrievalItem::new("a", vec![1.0, 0.0], "first"));
        store.upsert(RetrievalItem::new("b", vec![0.0, 1.0], "second"));
        store.upsert(RetrievalItem::new("a", vec![1.0, 0.0], "updated"));

        assert_eq!(store.len(), 2);
        let hits = store.top_k(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].item.id, "a");
        assert_eq!(hits[0].item.text, "updated");
    }

    #[test]
    fn top_k_orders_by_descending_cosine_similarity() {
        let mut store = InMemoryStore::new();
        store.upsert(RetrievalItem::new("orthogonal", vec![0.0, 1.0], "o"));
        store.upsert(RetrievalItem::new("exact", vec![1.0, 0.0], "e"));
        store.upsert(RetrievalItem::new("opposite", vec![-1.0, 0.0], "n"));

        let hits = store.top_k(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].item.id, "exact");
        assert_eq!(hits[2].item.id, "opposite");
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut store = InMemoryStore::new();
        store.upsert(RetrievalItem::new("first", vec![1.0, 0.0], "a"));
        store.upsert(RetrievalItem::new("second", vec![1.0, 0.0], "b"));

        let hits = store.top_k(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].item.id, "first");
        assert_eq!(hits[1].item.id, "second");
    }

    #[test]
    fn top_k_caps_at_requested_count() {
        let mut store = InMemoryStore::new();
        for i in 0..5 {
            store.upsert(RetrievalItem::new(i.to_string(), vec![1.0, 0.0], "x"));
        }
        assert_eq!(store.top_k(&[1.0, 0.0], 2).unwrap().len(), 2);
    }

    #[test]
    fn empty_query_is_invalid_argument() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.top_k(&[], 1),
            Err(RetrieveError::InvalidArgument(_))
        ));
    }

    proptest::proptest! {
        /// `top_k` results never increase in similarity going down the list,
        /// and are unaffected by a positive global rescale of the query
        /// (`spec.md` §8).
        #[test]
        fn top_k_is_sorted_and_scale_invariant(
            vectors in proptest::collection::vec((-10.0f32..10.0, -10.0f32..10.0), 1..8),
            query in (-10.0f32..10.0, -10.0f32..10.0),
            scale in 0.1f32..5.0,
        ) {
            let mut store = InMemoryStore::new();
            for (idx, (x, y)) in vectors.iter().enumerate() {
                store.upsert(RetrievalItem::new(idx.to_string(), vec![*x, *y], "x"));
            }

            let base_hits = store.top_k(&[query.0, query.1], vectors.len()).unwrap();
            let scaled_hits = store
                .top_k(&[query.0 * scale, query.1 * scale], vectors.len())
                .unwrap();

            for window in base_hits.windows(2) {
                prop_assert!(window[0].score >= window[1].score - 1e-5);
            }
            prop_assert_eq!(
                base_hits.iter().map(|h| h.item.id.clone()).collect::<Vec<_>>(),
                scaled_hits.iter().map(|h| h.item.id.clone()).collect::<Vec<_>>()
            );
        }
    }
}
