//! Core data models used throughout the retrieval pipeline.
//!
//! These types represent the documents and search results that flow from
//! the loader, through embedding and the vector index, to the generation
//! step.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A knowledge-base document.
///
/// `id` is derived from the source filename and is stable across runs.
/// Two documents with the same `id` are the same logical document; content
/// changes are detected through [`Document::content_hash`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub url: String,
    pub content: String,
    /// Optional keyword line from the source file. Empty when absent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub keywords: String,
    /// Embedding vector. Empty until the document has been embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Attach an embedding vector, consuming and returning the document.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// SHA-256 fingerprint of `title + "\n" + content`, as lowercase hex.
    ///
    /// Any edit to the title or body yields a different fingerprint, which
    /// is what invalidates a cached embedding.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The text that gets embedded for this document.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.content)
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// A ranked hit from [`VectorIndex::search`](crate::index::VectorIndex::search).
#[derive(Debug, Clone, Copy)]
pub struct SearchResult<'a> {
    pub document: &'a Document,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// A ranked hit from the keyword retriever.
#[derive(Debug, Clone, Copy)]
pub struct KeywordHit<'a> {
    pub document: &'a Document,
    pub score: f64,
}
