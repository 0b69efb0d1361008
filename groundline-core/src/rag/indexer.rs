//! Knowledge base ingestion.
//!
//! This module provides functionality to:
//! - Recursively collect text files from a directory tree
//! - Filter files by extension and exclude patterns
//! - Chunk, embed and upsert them into the vector index in batches

use super::chunker::Chunker;
use super::embedder::{Embedder, EmbedderError};
use super::store::VectorStore;
use super::types::PassageChunk;
use crate::config::IngestConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// An I/O error occurred while reading files or directories.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding failed for {doc_id}: {source}")]
    Embedding {
        doc_id: String,
        #[source]
        source: EmbedderError,
    },

    #[error("Vector index error: {0}")]
    Store(String),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IndexerError>;

/// A file that has been collected and read for ingestion.
#[derive(Debug, Clone)]
pub struct IndexedFile {
    /// Path relative to the ingestion root, with `/` separators.
    pub doc_id: String,
    pub path: PathBuf,
    pub content: String,
}

/// Totals for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
}

/// Walks a directory tree and loads its passages into the vector index.
#[derive(Clone)]
pub struct Ingestor {
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    chunker: Chunker,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(embedder: Embedder, store: Arc<dyn VectorStore>, config: IngestConfig) -> Self {
        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap);
        Self {
            embedder,
            store,
            chunker,
            config,
        }
    }

    /// Ingests every matching file under `root`.
    ///
    /// Each file is chunked and embedded in one batch; points are flushed to
    /// the index whenever `batch_size` of them are pending.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist or isn't accessible
    /// - Embedding generation fails for any file
    /// - An upsert fails (earlier batches stay in the index)
    pub async fn ingest_directory(&self, root: &Path) -> Result<IngestReport> {
        self.store
            .ensure_collection()
            .await
            .map_err(|e| IndexerError::Store(e.to_string()))?;

        let files = collect_files(root, &self.config).await?;
        info!("Found {} files to ingest under {}", files.len(), root.display());

        let mut report = IngestReport::default();
        let mut batch: Vec<PassageChunk> = Vec::new();
        let batch_size = self.config.batch_size.max(1);

        for file in files {
            report.files += 1;

            let chunks = self.chunker.split(&file.content);
            if chunks.is_empty() {
                warn!(doc_id = %file.doc_id, "No chunks created");
                continue;
            }

            let vectors = self
                .embedder
                .encode(&chunks)
                .await
                .map_err(|source| IndexerError::Embedding {
                    doc_id: file.doc_id.clone(),
                    source,
                })?;

            report.chunks += chunks.len();
            debug!(doc_id = %file.doc_id, chunks = chunks.len(), "File chunked");

            for (i, (text, vector)) in chunks.into_iter().zip(vectors).enumerate() {
                batch.push(PassageChunk::new(file.doc_id.clone(), i as u64, text, vector));
            }

            if batch.len() >= batch_size {
                self.flush(&mut batch).await?;
                info!("Upserted so far: {} chunks", report.chunks);
            }
        }

        // Flush remainder
        if !batch.is_empty() {
            self.flush(&mut batch).await?;
        }

        info!(files = report.files, chunks = report.chunks, "Ingestion finished");
        Ok(report)
    }

    async fn flush(&self, batch: &mut Vec<PassageChunk>) -> Result<()> {
        self.store
            .upsert(std::mem::take(batch))
            .await
            .map_err(|e| IndexerError::Store(e.to_string()))
    }
}

/// Recursively collects all ingestible files under `root`, sorted by path.
pub async fn collect_files(root: &Path, config: &IngestConfig) -> Result<Vec<IndexedFile>> {
    let mut paths = Vec::new();
    collect_paths_recursive(root, root, &mut paths, config).await?;
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = fs::read(&path).await?;
        files.push(IndexedFile {
            doc_id: doc_id_for(root, &path),
            content: String::from_utf8_lossy(&bytes).into_owned(),
            path,
        });
    }
    Ok(files)
}

fn collect_paths_recursive<'a>(
    root: &'a Path,
    dir: &'a Path,
    paths: &'a mut Vec<PathBuf>,
    config: &'a IngestConfig,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            // Only the part below the root is matched against exclude patterns
            let relative = path.strip_prefix(root).unwrap_or(&path);
            if should_exclude(relative, &config.exclude_patterns) {
                continue;
            }

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                collect_paths_recursive(root, &path, paths, config).await?;
            } else if file_type.is_file() && has_extension(&path, &config.extensions) {
                paths.push(path);
            }
        }

        Ok(())
    })
}

/// Document id of a file: its path relative to the root, `/`-separated.
fn doc_id_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Case-insensitive extension match; extensions may be given with or without a dot.
fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// A path is excluded if any of its components contains an exclude pattern.
fn should_exclude(path: &Path, patterns: &[String]) -> bool {
    path.components().any(|component| {
        if let Some(name) = component.as_os_str().to_str() {
            patterns.iter().any(|pattern| name.contains(pattern.as_str()))
        } else {
            false
        }
    })
}
