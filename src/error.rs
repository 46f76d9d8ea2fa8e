//! Typed errors for the retrieval core.
//!
//! Application code propagates `anyhow::Error`; these enums exist where a
//! caller has to tell failure kinds apart (e.g. to decide on a keyword
//! fallback, or to share one gate outcome between many waiters).

use std::path::PathBuf;

use thiserror::Error;

/// Failure to make a model available on the provider.
///
/// `Clone` because a single outcome is handed to every caller that joined
/// the same in-flight check.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    #[error("provider unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("provider reported an error: {0}")]
    Provider(String),

    #[error("failed to download model {model}: {source}")]
    Pull {
        model: String,
        #[source]
        source: Box<GateError>,
    },

    #[error("model {model} still not available after download")]
    StillUnavailable { model: String },
}

/// Failure of an embedding or generation call.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("input text is empty")]
    EmptyInput,

    #[error("model not available: {0}")]
    ModelUnavailable(#[from] GateError),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("provider returned an empty embedding")]
    EmptyEmbedding,
}

/// Why a vector search produced no results.
///
/// Every variant is a distinct condition so the retrieval engine can choose
/// to fall back to keyword search for the index-state cases.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchError {
    #[error("vector index is empty")]
    EmptyIndex,

    #[error("query embedding is empty")]
    EmptyQuery,

    #[error("no documents in the index have embeddings")]
    NoEmbeddedDocuments,

    #[error("no documents scored above the relevance threshold")]
    NoRelevantResults,
}

impl SearchError {
    /// True for conditions caused by the index contents rather than the
    /// query itself.
    pub fn is_index_state(&self) -> bool {
        !matches!(self, SearchError::EmptyQuery)
    }
}

/// Persistence failure of the embedding cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize embedding cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
