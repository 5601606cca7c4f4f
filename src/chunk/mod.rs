//! Chunking strategies: documents in, ordered text nodes out.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::ingest::Document;
use crate::variant::ChunkStrategy;

mod fixed;
mod hierarchical;
mod semantic;

pub use fixed::*;
pub use hierarchical::*;
pub use semantic::*;

/// A retrievable unit of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub text: String,
    pub metadata: NodeMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Id of the source document.
    pub source: String,
    /// Position of this node among its siblings (0-indexed).
    pub position: usize,
    /// Depth in the hierarchy; 0 for flat strategies.
    pub level: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Node {
    pub fn new(text: impl Into<String>, metadata: NodeMetadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            metadata,
        }
    }
}

#[async_trait]
pub trait Chunker: Send + Sync {
    async fn chunk(&self, documents: &[Document]) -> Result<Vec<Node>>;

    fn strategy(&self) -> ChunkStrategy;
}

/// Chunker for `strategy`. The semantic strategy needs an embedder to find
/// topic boundaries.
pub fn get_chunker(
    strategy: ChunkStrategy,
    embedder: Option<Arc<dyn Embedder>>,
) -> Result<Box<dyn Chunker>> {
    match strategy {
        ChunkStrategy::Fixed => Ok(Box::new(FixedSizeChunker::default())),
        ChunkStrategy::Semantic => {
            let embedder = embedder.ok_or_else(|| {
                Error::InvalidInput("semantic chunking requires an embedder".to_string())
            })?;
            Ok(Box::new(SemanticChunker::new(embedder)))
        }
        ChunkStrategy::Hierarchical => Ok(Box::new(HierarchicalChunker::default())),
    }
}

/// Split text into sentences on terminal punctuation followed by whitespace,
/// and on blank lines. Returned slices are trimmed and non-empty.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '.' | '!' | '?' => chars.peek().is_some_and(|(_, next)| next.is_whitespace()),
            '\n' => chars.peek().is_some_and(|(_, next)| *next == '\n'),
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            let s = text[start..end].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}
