use async_trait::async_trait;

use crate::chunk::{split_text, Chunker, Node, NodeMetadata};
use crate::error::{Error, Result};
use crate::ingest::Document;
use crate::variant::ChunkStrategy;

/// Multi-level chunker. Each document is split at the largest size, and
/// every chunk is split again at the next size down. All levels are emitted;
/// children link to their parent via `parent_id`.
pub struct HierarchicalChunker {
    pub chunk_sizes: Vec<usize>,
    pub chunk_overlap: usize,
}

impl Default for HierarchicalChunker {
    fn default() -> Self {
        Self {
            chunk_sizes: vec![2048, 512, 128],
            chunk_overlap: 20,
        }
    }
}

impl HierarchicalChunker {
    fn split_level(&self, parent: Option<&Node>, text: &str, source: &str, level: usize) -> Vec<Node> {
        let Some(&size) = self.chunk_sizes.get(level) else {
            return Vec::new();
        };

        let mut nodes = Vec::new();
        for (position, chunk) in split_text(text, size, self.chunk_overlap)
            .into_iter()
            .enumerate()
        {
            let node = Node::new(
                chunk,
                NodeMetadata {
                    source: source.to_string(),
                    position,
                    level,
                    parent_id: parent.map(|p| p.id.clone()),
                },
            );
            let children = self.split_level(Some(&node), &node.text, source, level + 1);
            nodes.push(node);
            nodes.extend(children);
        }
        nodes
    }
}

#[async_trait]
impl Chunker for HierarchicalChunker {
    async fn chunk(&self, documents: &[Document]) -> Result<Vec<Node>> {
        if self.chunk_sizes.is_empty() {
            return Err(Error::InvalidInput(
                "hierarchical chunking needs at least one chunk size".to_string(),
            ));
        }
        Ok(documents
            .iter()
            .flat_map(|doc| self.split_level(None, &doc.text, &doc.id, 0))
            .collect())
    }

    fn strategy(&self) -> ChunkStrategy {
        ChunkStrategy::Hierarchical
    }
}
