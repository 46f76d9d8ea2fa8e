//! Index build: attach embeddings to loaded documents.
//!
//! Each document goes through the embedding cache first. A hit reuses the
//! stored vector; a miss calls the embedder on `title + "\n" + content` and
//! stores the result. A document whose embedding fails is logged, counted,
//! and left unembedded (it stays searchable by keyword). New entries are
//! written to disk with a single flush at the end.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cache::EmbeddingCache;
use crate::embedding::Embedder;
use crate::models::Document;
use crate::progress::{IndexProgressEvent, ProgressReporter};

/// Documents between two progress events.
const PROGRESS_EVERY: usize = 10;

/// Outcome counts of [`embed_documents`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub total: usize,
    /// Served from the cache.
    pub cached: usize,
    /// Embedded by the provider in this run.
    pub embedded: usize,
    pub failed: usize,
}

impl IngestReport {
    /// Documents that ended up with an embedding.
    pub fn ready(&self) -> usize {
        self.cached + self.embedded
    }
}

/// Embed `docs` in place through `cache`, then flush the cache if anything
/// new was computed.
///
/// # Errors
///
/// A cache file that cannot be read or saved is an error; per-document
/// embedding failures are reported in [`IngestReport::failed`].
pub async fn embed_documents(
    docs: &mut [Document],
    cache: &EmbeddingCache,
    embedder: &dyn Embedder,
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let mut report = IngestReport {
        total: docs.len(),
        ..IngestReport::default()
    };

    for (i, doc) in docs.iter_mut().enumerate() {
        if let Some(embedding) = cache.get(doc) {
            doc.embedding = embedding;
            report.cached += 1;
        } else {
            match embedder.embed(&doc.embedding_text()).await {
                Ok(embedding) => {
                    cache.set(doc, embedding.clone()).with_context(|| {
                        format!("Failed to update embedding cache {}", cache.path().display())
                    })?;
                    doc.embedding = embedding;
                    report.embedded += 1;
                }
                Err(e) => {
                    warn!(id = %doc.id, model = embedder.model_name(), "embedding failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        let n = i + 1;
        if n % PROGRESS_EVERY == 0 || n == report.total {
            progress.report(IndexProgressEvent::Embedding {
                n: n as u64,
                total: report.total as u64,
                cached: report.cached as u64,
            });
        }
    }

    if report.embedded > 0 {
        cache
            .flush()
            .with_context(|| format!("Failed to save embedding cache {}", cache.path().display()))?;
    }

    info!(
        total = report.total,
        cached = report.cached,
        embedded = report.embedded,
        failed = report.failed,
        "embedding pass finished"
    );
    Ok(report)
}
