//! Text embeddings via the Voyage AI API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::variant::EmbedModel;

const VOYAGE_EMBEDDINGS_URL: &str = "https://api.voyageai.com/v1/embeddings";
const DEFAULT_BATCH_SIZE: usize = 128;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub type Embedding = Vec<f32>;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed texts for indexing, preserving order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a search query. Providers may embed queries differently from
    /// documents.
    async fn embed_query(&self, text: &str) -> Result<Embedding>;

    fn model_name(&self) -> &str;
}

pub struct VoyageEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Embedding,
    index: usize,
}

impl VoyageEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn for_model(api_key: impl Into<String>, model: EmbedModel) -> Result<Self> {
        Self::new(api_key, model.as_str())
    }

    async fn embed_batch(&self, texts: &[String], input_type: &str) -> Result<Vec<Embedding>> {
        debug!(model = %self.model, count = texts.len(), input_type, "Embedding batch");

        let resp = self
            .client
            .post(VOYAGE_EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingsRequest {
                input: texts,
                model: &self.model,
                input_type,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "voyage",
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: EmbeddingsResponse = resp.json().await?;
        order_embeddings(parsed, texts.len())
    }
}

#[async_trait]
impl Embedder for VoyageEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch, "document").await?);
        }
        Ok(out)
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text.to_string()], "query")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidInput("voyage returned no embeddings".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn order_embeddings(response: EmbeddingsResponse, expected: usize) -> Result<Vec<Embedding>> {
    if response.data.len() != expected {
        return Err(Error::InvalidInput(format!(
            "voyage returned {} embeddings for {} inputs",
            response.data.len(),
            expected
        )));
    }
    let mut data = response.data;
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

/// Cosine similarity in [-1, 1]; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
