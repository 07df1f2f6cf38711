use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::instrument;

use crate::error::RetrieveError;
use crate::item::{RetrievalItem, ScoredItem};
use crate::store::VectorStore;

/// DDL for the pgvector-backed table, reproduced bit-for-bit from `spec.md`
/// §6 (Vector backend). Callers run this once against a database with the
/// `vector` extension enabled; `PostgresStore` itself never runs DDL.
pub const SCHEMA: &str = "\
create table if not exists document_embeddings (
    id serial primary key,
    file_path text not null unique,
    file_name text not null,
    content text not null,
    embedding vector(1024),
    created_at timestamptz not null default now(),
    updated_at timestamptz not null default now(),
    file_hash text not null,
    file_size bigint not null,
    file_extension text,
    tags jsonb
);
create index if not exists document_embeddings_embedding_idx
    on document_embeddings
    using ivfflat (embedding vector_cosine_ops)
    with (lists = 100);
";

/// pgvector-backed retrieval store. `upsert` keys on `file_path`'s unique
/// constraint, matching the table's `RetrievalItem::id`.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, RetrieveError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(PostgresStore { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PostgresStore { pool }
    }

    /// `(1 − (embedding <=> :q)) > :threshold order by embedding <=> :q
    /// limit :k`, per `spec.md` §6. The `<=>` operator is pgvector's cosine
    /// distance and is not representable as a bind parameter, so the
    /// comparison and ordering clauses are spliced as literal SQL; the
    /// vector literal and threshold remain bound parameters.
    #[instrument(skip(self, query))]
    pub async fn top_k_above_threshold(
        &self,
        query: &[f32],
        k: i64,
        threshold: f32,
    ) -> Result<Vec<ScoredItem>, RetrieveError> {
        if query.is_empty() {
            return Err(RetrieveError::InvalidArgument(
                "query vector must not be empty".into(),
            ));
        }
        let query_literal = vector_literal(query);

        let sql = format!(
            "select file_path, content, tags, 1 - (embedding <=> $1::vector) as score \
             from document_embeddings \
             where (1 - (embedding <=> $1::vector)) > $2 \
             order by embedding <=> $1::vector \
             limit $3"
        );

        let rows = sqlx::query(&sql)
            .bind(&query_literal)
            .bind(threshold)
            .bind(k)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let file_path: String = row.try_get("file_path")?;
                let content: String = row.try_get("content")?;
                let score: f32 = row.try_get("score")?;
                Ok(ScoredItem {
                    item: RetrievalItem::new(file_path, query.to_vec(), content),
                    score,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(RetrieveError::from)
    }
}

#[async_trait]
impl VectorStore for PostgresStore {
    #[instrument(skip(self, item), fields(id = %item.id))]
    async fn upsert(&self, item: RetrievalItem) -> Result<(), RetrieveError> {
        let embedding_literal = vector_literal(&item.vector);
        let tags = serde_json::to_value(&item.metadata)
            .map_err(|e| RetrieveError::InvalidArgument(e.to_string()))?;

        sqlx::query(
            "insert into document_embeddings \
                (file_path, file_name, content, embedding, file_hash, file_size, file_extension, tags) \
             values ($1, $2, $3, $4::vector, $5, $6, $7, $8) \
             on conflict (file_path) do update set \
                file_name = excluded.file_name, \
                content = excluded.content, \
                embedding = excluded.embedding, \
                file_hash = excluded.file_hash, \
                file_size = excluded.file_size, \
                file_extension = excluded.file_extension, \
                tags = excluded.tags, \
                updated_at = now()",
        )
        .bind(&item.id)
        .bind(file_name_of(&item.id))
        .bind(&item.text)
        .bind(&embedding_literal)
        .bind("")
        .bind(item.text.len() as i64)
        .bind(file_extension_of(&item.id))
        .bind(tags)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<ScoredItem>, RetrieveError> {
        self.top_k_above_threshold(query, k as i64, f32::MIN).await
    }
}

fn vector_literal(vector: &[f32]) -> String {
    let mut s = String::with_capacity(vector.len() * 8 + 2);
    s.push('[');
    for (idx, value) in vector.iter().enumerate() {
        if idx > 0 {
            s.push(',');
        }
        s.push_str(&value.to_string());
    }
    s.push(']');
    s
}

fn file_name_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn file_extension_of(path: &str) -> Option<String> {
    file_name_of(path)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_matches_pgvector_array_syntax() {
        assert_eq!(vector_literal(&[1.0, 0.5, -2.0]), "[1,0.5,-2]");
    }

    #[test]
    fn file_name_and_extension_split_on_last_separator() {
        assert_eq!(file_name_of("/docs/readme.md"), "readme.md");
        assert_eq!(file_extension_of("/docs/readme.md"), Some("md".to_string()));
        assert_eq!(file_extension_of("/docs/readme"), None);
    }
}
