//! Index construction and the `rag-bot index` command.
//!
//! Building the index is the same for every command that needs vectors:
//! load the markdown documents, attach embeddings through the cache, and
//! wrap the result in a shared [`VectorIndex`]. `index` does only that and
//! prints a summary, which makes it the way to warm the cache ahead of
//! serving queries.

use std::sync::Arc;

use anyhow::Result;

use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::engine::RetrievalEngine;
use crate::ingest::{embed_documents, IngestReport};
use crate::keyword::KeywordRetriever;
use crate::loader::load_documents;
use crate::models::Document;
use crate::progress::{IndexProgressEvent, ProgressMode, ProgressReporter};
use crate::provider::OllamaClient;

/// Load documents and embed them through the on-disk cache.
pub async fn build_index(
    config: &Config,
    embedder: &dyn Embedder,
    progress: &dyn ProgressReporter,
) -> Result<(Vec<Document>, IngestReport)> {
    progress.report(IndexProgressEvent::Loading {
        root: config.documents.root.display().to_string(),
    });
    let mut docs = load_documents(&config.documents)?;

    let cache = EmbeddingCache::new(&config.cache.path);
    let report = embed_documents(&mut docs, &cache, embedder, progress).await?;
    Ok((docs, report))
}

/// Build a retrieval engine over freshly indexed documents, attaching the
/// keyword fallback when `retrieval.keyword_fallback` is set.
pub async fn build_engine(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    progress: &dyn ProgressReporter,
) -> Result<RetrievalEngine> {
    let (docs, report) = build_index(config, embedder.as_ref(), progress).await?;
    if report.ready() == 0 && !docs.is_empty() {
        tracing::warn!(
            documents = docs.len(),
            "no document has an embedding; vector search will find nothing"
        );
    }

    let keyword = config
        .retrieval
        .keyword_fallback
        .then(|| KeywordRetriever::new(docs.clone()));
    let index = Arc::new(docs.into_iter().collect());

    let engine = RetrievalEngine::new(embedder, index);
    Ok(match keyword {
        Some(keyword) => engine.with_keyword_fallback(keyword),
        None => engine,
    })
}

/// Run `rag-bot index`.
pub async fn run_index(config: &Config, mode: ProgressMode) -> Result<()> {
    let client = OllamaClient::new(&config.provider)?;
    let progress = mode.reporter();
    let (_, report) = build_index(config, &client, progress.as_ref()).await?;

    println!("index");
    println!("  documents: {}", report.total);
    println!("  from cache: {}", report.cached);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);
    println!("  cache: {}", config.cache.path.display());
    if report.failed > 0 {
        println!("  {} document(s) are searchable by keyword only", report.failed);
    }
    Ok(())
}
