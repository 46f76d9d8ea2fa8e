//! `rag-bot search` and `rag-bot ask`.
//!
//! `search` prints ranked hits from either retrieval path. `ask` retrieves
//! with the engine and hands the documents to the generator. A retrieval
//! failure in `ask` is reported as "No relevant documents found." instead
//! of an error, since an unanswerable question is not a broken command.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::config::Config;
use crate::embed_cmd::build_engine;
use crate::embedding::Embedder;
use crate::engine::{RankedDocument, Retrieval};
use crate::error::SearchError;
use crate::generation::answer;
use crate::keyword::KeywordRetriever;
use crate::loader::load_documents;
use crate::progress::ProgressMode;
use crate::provider::OllamaClient;

/// Longest accepted question, in characters.
pub const MAX_QUERY_CHARS: usize = 1000;

pub const NO_DOCUMENTS_MESSAGE: &str = "No relevant documents found.";

/// Trim a query and enforce the length limit.
pub fn validate_query(query: &str) -> Result<&str> {
    let query = query.trim();
    if query.is_empty() {
        bail!("Query must not be empty");
    }
    let chars = query.chars().count();
    if chars > MAX_QUERY_CHARS {
        bail!(
            "Query too long: {} characters (max {})",
            chars,
            MAX_QUERY_CHARS
        );
    }
    Ok(query)
}

/// Run `rag-bot search`.
pub async fn run_search(config: &Config, query: &str, mode: &str, limit: Option<i64>) -> Result<()> {
    let query = validate_query(query)?;
    let limit = limit.unwrap_or(config.retrieval.top_k);

    let results: Vec<RankedDocument> = match mode {
        "keyword" => {
            let retriever = KeywordRetriever::new(load_documents(&config.documents)?);
            retriever
                .search(query, limit)
                .into_iter()
                .map(|hit| RankedDocument {
                    document: hit.document.clone(),
                    score: hit.score,
                })
                .collect()
        }
        "vector" => {
            let client: Arc<dyn Embedder> = Arc::new(OllamaClient::new(&config.provider)?);
            let progress = ProgressMode::default_for_tty().reporter();
            let engine = build_engine(config, client, progress.as_ref()).await?;
            ranked_or_empty(engine.retrieve(query, limit).await)?
        }
        other => bail!("Unknown search mode: '{}'. Available: vector, keyword", other),
    };

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_results(&results);
    Ok(())
}

/// An index with nothing relevant is an empty result, as in keyword mode.
fn ranked_or_empty(retrieval: Result<Retrieval>) -> Result<Vec<RankedDocument>> {
    match retrieval {
        Ok(retrieval) => Ok(retrieval.documents),
        Err(e)
            if e
                .downcast_ref::<SearchError>()
                .is_some_and(|err| err.is_index_state()) =>
        {
            debug!("vector search found nothing: {:#}", e);
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

fn print_results(results: &[RankedDocument]) {
    for (i, result) in results.iter().enumerate() {
        let doc = &result.document;
        let title = if doc.title.is_empty() {
            "(untitled)"
        } else {
            doc.title.as_str()
        };
        println!("{}. [{:.2}] {}", i + 1, result.score, title);
        if !doc.url.is_empty() {
            println!("    url: {}", doc.url);
        }
        println!("    id: {}", doc.id);
        println!();
    }
}

/// Run `rag-bot ask`.
pub async fn run_ask(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    let query = validate_query(query)?;
    let limit = limit.unwrap_or(config.retrieval.top_k);

    let client = Arc::new(OllamaClient::new(&config.provider)?);
    let progress = ProgressMode::default_for_tty().reporter();
    let engine = build_engine(config, client.clone(), progress.as_ref()).await?;

    let docs = match engine.find_relevant_documents(query, limit).await {
        Ok(docs) if !docs.is_empty() => docs,
        Ok(_) => {
            println!("{}", NO_DOCUMENTS_MESSAGE);
            return Ok(());
        }
        Err(e) => {
            warn!("retrieval failed: {:#}", e);
            println!("{}", NO_DOCUMENTS_MESSAGE);
            return Ok(());
        }
    };

    let reply = answer(client.as_ref(), query, &docs, &config.generation).await?;
    println!("{}", reply);
    println!();
    println!("Sources:");
    for doc in &docs {
        println!("  - {}: {}", doc.title, doc.url);
    }
    Ok(())
}
