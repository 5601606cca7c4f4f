use async_trait::async_trait;

use crate::chunk::{split_sentences, Chunker, Node, NodeMetadata};
use crate::error::Result;
use crate::ingest::Document;
use crate::variant::ChunkStrategy;

/// Sentence-aware fixed-size chunker.
///
/// Packs whole sentences into chunks of at most `chunk_size` tokens, carrying
/// up to `chunk_overlap` tokens of trailing sentences into the next chunk.
/// Sentences longer than a chunk are cut on word boundaries.
pub struct FixedSizeChunker {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for FixedSizeChunker {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

#[async_trait]
impl Chunker for FixedSizeChunker {
    async fn chunk(&self, documents: &[Document]) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        for doc in documents {
            for (position, text) in split_text(&doc.text, self.chunk_size, self.chunk_overlap)
                .into_iter()
                .enumerate()
            {
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
        ChunkStrategy::Fixed
    }
}

/// Split `text` into chunks of at most `chunk_size` words with up to
/// `overlap` words of sentence-aligned overlap.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);

    let mut pieces: Vec<Vec<&str>> = Vec::new();
    for sentence in split_sentences(text) {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        for window in words.chunks(chunk_size) {
            pieces.push(window.to_vec());
        }
    }

    let mut chunks = Vec::new();
    let mut current: Vec<Vec<&str>> = Vec::new();
    let mut current_len = 0;

    for piece in pieces {
        if current_len + piece.len() > chunk_size && !current.is_empty() {
            chunks.push(join_pieces(&current));

            let mut kept = Vec::new();
            let mut kept_len = 0;
            while let Some(last) = current.pop() {
                if kept_len + last.len() > overlap {
                    break;
                }
                kept_len += last.len();
                kept.push(last);
            }
            kept.reverse();
            current = kept;
            current_len = kept_len;

            while current_len + piece.len() > chunk_size && !current.is_empty() {
                let first = current.remove(0);
                current_len -= first.len();
            }
        }
        current_len += piece.len();
        current.push(piece);
    }

    if !current.is_empty() {
        chunks.push(join_pieces(&current));
    }
    chunks
}

fn join_pieces(pieces: &[Vec<&str>]) -> String {
    pieces
        .iter()
        .map(|p| p.join(" "))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            id: "doc.pdf".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_packs_sentences() {
        let chunks = split_text("One two three. Four five six. Seven eight nine.", 6, 0);
        assert_eq!(
            chunks,
            vec!["One two three. Four five six.", "Seven eight nine."]
        );
    }

    #[test]
    fn test_overlap_carries_trailing_sentence() {
        let chunks = split_text("One two three. Four five six. Seven eight nine.", 6, 3);
        assert_eq!(
            chunks,
            vec![
                "One two three. Four five six.",
                "Four five six. Seven eight nine."
            ]
        );
    }

    #[test]
    fn test_long_sentence_is_cut_on_words() {
        let chunks = split_text("a b c d e f g h i j", 4, 0);
        assert_eq!(chunks, vec!["a b c d", "e f g h", "i j"]);
    }

    #[test]
    fn test_chunks_never_exceed_size() {
        let text = "Alpha beta gamma delta. Epsilon zeta. Eta theta iota kappa lambda. Mu.";
        for chunk in split_text(text, 5, 2) {
            assert!(chunk.split_whitespace().count() <= 5, "{}", chunk);
        }
    }

    #[test]
    fn test_empty_text() {
        assert!(split_text("", 10, 2).is_empty());
    }

    #[tokio::test]
    async fn test_chunker_metadata() {
        let chunker = FixedSizeChunker {
            chunk_size: 3,
            chunk_overlap: 0,
        };
        let nodes = chunker
            .chunk(&[doc("One two three. Four five six.")])
            .await
            .unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].metadata.source, "doc.pdf");
        assert_eq!(nodes[0].metadata.position, 0);
        assert_eq!(nodes[1].metadata.position, 1);
        assert!(nodes[1].metadata.parent_id.is_none());
        assert_ne!(nodes[0].id, nodes[1].id);
    }
}
