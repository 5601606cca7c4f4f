use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::chunk::{split_sentences, Chunker, Node, NodeMetadata};
use crate::embed::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::ingest::Document;
use crate::variant::ChunkStrategy;

/// Splits where the meaning shifts.
///
/// Each sentence is embedded together with `buffer_size` neighbours on each
/// side; a chunk boundary is placed after every sentence whose cosine
/// distance to the next group is above the `breakpoint_percentile` of all
/// distances in the document.
pub struct SemanticChunker {
    embedder: Arc<dyn Embedder>,
    pub breakpoint_percentile: f64,
    pub buffer_size: usize,
}

impl SemanticChunker {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            breakpoint_percentile: 95.0,
            buffer_size: 1,
        }
    }

    pub fn with_breakpoint_percentile(mut self, percentile: f64) -> Self {
        self.breakpoint_percentile = percentile.clamp(0.0, 100.0);
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    async fn chunk_document(&self, doc: &Document) -> Result<Vec<String>> {
        let sentences = split_sentences(&doc.text);
        if sentences.len() <= 1 {
            return Ok(sentences.into_iter().map(str::to_string).collect());
        }

        let groups: Vec<String> = (0..sentences.len())
            .map(|i| {
                let lo = i.saturating_sub(self.buffer_size);
                let hi = (i + self.buffer_size).min(sentences.len() - 1);
                sentences[lo..=hi].join(" ")
            })
            .collect();

        let embeddings = self.embedder.embed_documents(&groups).await?;
        let distances: Vec<f64> = embeddings
            .windows(2)
            .map(|w| 1.0 - cosine_similarity(&w[0], &w[1]))
            .collect();
        let threshold = percentile(&distances, self.breakpoint_percentile);

        debug!(
            source = %doc.id,
            sentences = sentences.len(),
            threshold,
            "Computed semantic breakpoints"
        );

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for (i, sentence) in sentences.iter().copied().enumerate() {
            current.push(sentence);
            if distances.get(i).is_some_and(|d| *d > threshold) {
                chunks.push(current.join(" "));
                current.clear();
            }
        }
        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
        Ok(chunks)
    }
}

#[async_trait]
impl Chunker for SemanticChunker {
    async fn chunk(&self, documents: &[Document]) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        for doc in documents {
            for (position, text) in self.chunk_document(doc).await?.into_iter().enumerate() {
                nodes.push(Node::new(
                    text,
                    NodeMetadata {
                        source: doc.id.clone(),
                        position,
                        level: 0,
                        parent_id: None,
                    },
                ));
            }
        }
        Ok(nodes)
    }

    fn strategy(&self) -> ChunkStrategy {
        ChunkStrategy::Semantic
    }
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
