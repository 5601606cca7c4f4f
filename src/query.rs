//! Retrieval-augmented answering: embed the question, fetch the closest
//! nodes of one variant, and have the LLM answer from them.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::Config;
use crate::embed::{Embedder, VoyageEmbedder};
use crate::error::Result;
use crate::ingest::IndexBackend;
use crate::llm::{AnthropicLlm, Llm};
use crate::store::{PgVectorStore, VectorStore};
use crate::variant::{EmbedModel, Variant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    pub text: String,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    pub answer: String,
    pub sources: Vec<SourceNode>,
}

impl EngineResponse {
    pub fn contexts(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.text.clone()).collect()
    }
}

#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, question: &str) -> Result<EngineResponse>;
}

/// Builds the query engine for a variant.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn engine(&self, variant: Variant, top_k: usize) -> Result<Arc<dyn QueryEngine>>;
}

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn Llm>,
    top_k: usize,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn Llm>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl QueryEngine for RetrievalEngine {
    async fn query(&self, question: &str) -> Result<EngineResponse> {
        let query_embedding = self.embedder.embed_query(question).await?;
        let hits = self.store.search(&query_embedding, self.top_k).await?;
        debug!(hits = hits.len(), top_k = self.top_k, "Retrieved nodes");

        let contexts: Vec<&str> = hits.iter().map(|h| h.node.text.as_str()).collect();
        let answer = self.llm.complete(&answer_prompt(question, &contexts)).await?;

        Ok(EngineResponse {
            answer: answer.trim().to_string(),
            sources: hits
                .into_iter()
                .map(|h| SourceNode {
                    text: h.node.text,
                    score: h.score,
                })
                .collect(),
        })
    }
}

fn answer_prompt(question: &str, contexts: &[&str]) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {}\n\
         Answer: ",
        contexts.join("\n\n"),
        question
    )
}

/// Production wiring: Voyage embedders, one pgvector table per variant and
/// the Anthropic answer model. Connections and clients are created on first
/// use so commands that never query do not need every secret.
pub struct RetrievalEngineFactory {
    config: Arc<Config>,
    pool: PgPool,
    embedders: DashMap<EmbedModel, Arc<dyn Embedder>>,
    llm: OnceCell<Arc<dyn Llm>>,
}

impl RetrievalEngineFactory {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&config.database_url()?)?;
        Ok(Self {
            config,
            pool,
            embedders: DashMap::new(),
            llm: OnceCell::new(),
        })
    }

    fn embedder_for(&self, model: EmbedModel) -> Result<Arc<dyn Embedder>> {
        if let Some(existing) = self.embedders.get(&model) {
            return Ok(Arc::clone(existing.value()));
        }
        let embedder: Arc<dyn Embedder> =
            Arc::new(VoyageEmbedder::for_model(self.config.voyage_api_key()?, model)?);
        self.embedders.insert(model, Arc::clone(&embedder));
        Ok(embedder)
    }

    async fn answer_llm(&self) -> Result<Arc<dyn Llm>> {
        let llm = self
            .llm
            .get_or_try_init(|| async {
                let llm = AnthropicLlm::new(self.config.anthropic_api_key()?, &self.config.llm_model)?;
                Ok::<Arc<dyn Llm>, crate::error::Error>(Arc::new(llm))
            })
            .await?;
        Ok(Arc::clone(llm))
    }

    fn store_for(&self, variant: Variant) -> PgVectorStore {
        PgVectorStore::new(self.pool.clone(), variant, self.config.embed_dim)
    }
}

#[async_trait]
impl EngineFactory for RetrievalEngineFactory {
    async fn engine(&self, variant: Variant, top_k: usize) -> Result<Arc<dyn QueryEngine>> {
        let engine = RetrievalEngine::new(
            self.embedder_for(variant.embed_model)?,
            Arc::new(self.store_for(variant)),
            self.answer_llm().await?,
            top_k,
        );
        Ok(Arc::new(engine))
    }
}

#[async_trait]
impl IndexBackend for RetrievalEngineFactory {
    async fn embedder(&self, model: EmbedModel) -> Result<Arc<dyn Embedder>> {
        self.embedder_for(model)
    }

    async fn create_store(&self, variant: Variant) -> Result<Arc<dyn VectorStore>> {
        let store = self.store_for(variant);
        store.ensure_table().await?;
        info!(variant = %variant, table = %store.table(), "Vector table ready");
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Node, NodeMetadata};
    use crate::embed::Embedding;
    use crate::store::ScoredNode;
    use parking_lot::Mutex;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }

        async fn embed_query(&self, _text: &str) -> Result<Embedding> {
            Ok(vec![1.0])
        }

        fn model_name(&self) -> &str {
            "unit"
        }
    }

    struct FixedStore {
        requested_k: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn add(&self, _nodes: &[Node], _embeddings: &[Embedding]) -> Result<()> {
            Ok(())
        }

        async fn search(&self, _query: &[f32], top_k: usize) -> Result<Vec<ScoredNode>> {
            *self.requested_k.lock() = Some(top_k);
            Ok(vec![ScoredNode {
                node: Node::new("Bromate MCL is 0.010 mg/L.", NodeMetadata::default()),
                score: Some(0.91),
            }])
        }
    }

    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Llm for RecordingLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            Ok("  0.010 mg/L \n".to_string())
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_query_grounds_answer_in_retrieved_nodes() {
        let store = Arc::new(FixedStore {
            requested_k: Mutex::new(None),
        });
        let llm = Arc::new(RecordingLlm {
            prompts: Mutex::new(Vec::new()),
        });
        let engine = RetrievalEngine::new(Arc::new(UnitEmbedder), store.clone(), llm.clone(), 3);

        let response = engine.query("What is the bromate MCL?").await.unwrap();
        assert_eq!(response.answer, "0.010 mg/L");
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].score, Some(0.91));
        assert_eq!(response.contexts(), vec!["Bromate MCL is 0.010 mg/L."]);
        assert_eq!(*store.requested_k.lock(), Some(3));

        let prompts = llm.prompts.lock();
        assert!(prompts[0].contains("Bromate MCL is 0.010 mg/L."));
        assert!(prompts[0].contains("Query: What is the bromate MCL?"));
    }
}
