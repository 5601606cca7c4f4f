//! pgvector-backed node storage, one table per variant.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info};

use crate::chunk::Node;
use crate::embed::Embedding;
use crate::error::{Error, Result};
use crate::variant::Variant;

/// A stored node with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNode {
    pub node: Node,
    pub score: Option<f64>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, nodes: &[Node], embeddings: &[Embedding]) -> Result<()>;

    /// Up to `top_k` nodes, most similar first.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredNode>>;
}

pub struct PgVectorStore {
    pool: PgPool,
    table: String,
    dim: usize,
}

impl PgVectorStore {
    pub fn new(pool: PgPool, variant: Variant, dim: usize) -> Self {
        Self {
            pool,
            table: table_name(variant),
            dim,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                node_id TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata_ JSONB NOT NULL,
                embedding vector({}) NOT NULL
            )",
            self.table, self.dim
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        debug!(table = %self.table, dim = self.dim, "Ensured vector table");
        Ok(())
    }

    fn check_dim(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dim {
            return Err(Error::InvalidInput(format!(
                "embedding has {} dimensions, table {} expects {}",
                embedding.len(),
                self.table,
                self.dim
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn add(&self, nodes: &[Node], embeddings: &[Embedding]) -> Result<()> {
        if nodes.len() != embeddings.len() {
            return Err(Error::InvalidInput(format!(
                "{} nodes but {} embeddings",
                nodes.len(),
                embeddings.len()
            )));
        }
        for embedding in embeddings {
            self.check_dim(embedding)?;
        }

        let sql = format!(
            "INSERT INTO {} (node_id, text, metadata_, embedding) VALUES ($1, $2, $3, $4::vector)",
            self.table
        );
        let mut tx = self.pool.begin().await?;
        for (node, embedding) in nodes.iter().zip(embeddings) {
            sqlx::query(&sql)
                .bind(&node.id)
                .bind(&node.text)
                .bind(serde_json::to_value(&node.metadata)?)
                .bind(vector_literal(embedding))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(table = %self.table, count = nodes.len(), "Inserted nodes");
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredNode>> {
        self.check_dim(query)?;

        let sql = format!(
            "SELECT node_id, text, metadata_, 1 - (embedding <=> $1::vector) AS score
             FROM {} ORDER BY embedding <=> $1::vector LIMIT $2",
            self.table
        );
        let rows = sqlx::query(&sql)
            .bind(vector_literal(query))
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<ScoredNode> {
                let metadata: serde_json::Value = row.try_get("metadata_")?;
                Ok(ScoredNode {
                    node: Node {
                        id: row.try_get("node_id")?,
                        text: row.try_get("text")?,
                        metadata: serde_json::from_value(metadata)?,
                    },
                    score: row.try_get("score")?,
                })
            })
            .collect()
    }
}

/// Table holding the nodes of `variant`.
pub fn table_name(variant: Variant) -> String {
    format!("data_{}", variant.key())
}

/// pgvector text form, e.g. `[0.1,0.2]`.
pub fn vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}
