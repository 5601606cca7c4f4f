//! Document loading and the indexing pipeline: every strategy chunks the
//! corpus once, every model embeds those chunks into its own table.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::chunk::get_chunker;
use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::store::VectorStore;
use crate::variant::{ChunkStrategy, EmbedModel, Variant};

pub const DEFAULT_EXTENSIONS: &[&str] = &["pdf"];

/// Model used to find semantic chunk boundaries.
pub const SEMANTIC_SPLIT_MODEL: EmbedModel = EmbedModel::Voyage3_5;

const EMBED_BATCH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// File name of the source.
    pub id: String,
    pub text: String,
}

/// Where the pipeline gets embedders and per-variant tables from.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    async fn embedder(&self, model: EmbedModel) -> Result<Arc<dyn Embedder>>;

    /// A ready-to-write store for `variant`, created if missing.
    async fn create_store(&self, variant: Variant) -> Result<Arc<dyn VectorStore>>;
}

/// Load every file in `dir` whose extension is in `extensions`
/// (case-insensitive), sorted by path.
pub async fn load_documents(dir: &Path, extensions: &[String]) -> Result<Vec<Document>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if matches {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = read_text(&path).await?;
        if text.trim().is_empty() {
            warn!(path = %path.display(), "Skipping document with no extractable text");
            continue;
        }
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        documents.push(Document { id, text });
    }

    if documents.is_empty() {
        return Err(Error::InvalidInput(format!(
            "no documents with extensions {:?} in {}",
            extensions,
            dir.display()
        )));
    }
    info!(count = documents.len(), dir = %dir.display(), "Loaded documents");
    Ok(documents)
}

async fn read_text(path: &Path) -> Result<String> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Ok(tokio::fs::read_to_string(path).await?);
    }

    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text(&owned)
            .map_err(|e| Error::Document(format!("{}: {}", owned.display(), e)))
    })
    .await
    .map_err(|e| Error::Document(format!("pdf extraction task failed: {}", e)))?
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSummary {
    pub variants: usize,
    pub nodes: usize,
}

/// Chunk `documents` with every strategy and index the chunks under every
/// model.
pub async fn run_pipeline(documents: &[Document], backend: &dyn IndexBackend) -> Result<IndexSummary> {
    let start = Instant::now();
    let mut summary = IndexSummary::default();

    for strategy in ChunkStrategy::ALL {
        let splitter = match strategy {
            ChunkStrategy::Semantic => Some(backend.embedder(SEMANTIC_SPLIT_MODEL).await?),
            _ => None,
        };
        let nodes = get_chunker(strategy, splitter)?.chunk(documents).await?;
        info!(strategy = %strategy, nodes = nodes.len(), "Chunked documents");

        let texts: Vec<String> = nodes.iter().map(|n| n.text.clone()).collect();
        for model in EmbedModel::ALL {
            let variant = Variant::new(strategy, model);
            let embedder = backend.embedder(model).await?;
            let store = backend.create_store(variant).await?;

            for (node_batch, text_batch) in nodes.chunks(EMBED_BATCH).zip(texts.chunks(EMBED_BATCH)) {
                let embeddings = embedder.embed_documents(text_batch).await?;
                store.add(node_batch, &embeddings).await?;
            }
            summary.variants += 1;
            summary.nodes += nodes.len();
            info!(variant = %variant, nodes = nodes.len(), "Indexed variant");
        }
    }

    info!(
        elapsed_secs = start.elapsed().as_secs(),
        "All {} variants indexed", summary.variants
    );
    Ok(summary)
}
