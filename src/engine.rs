//! Query-time retrieval: query text in, ranked documents out.
//!
//! The engine embeds the query through an [`Embedder`] (which in
//! production passes through the model gate), searches the shared
//! [`VectorIndex`], and unwraps the hits into documents in rank order.
//!
//! When a [`KeywordRetriever`] is attached, a vector search that fails
//! because of the index contents (empty, nothing embedded, nothing above
//! the threshold) is retried lexically. Embedding failures are never
//! papered over.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::SearchError;
use crate::index::{VectorIndex, DEFAULT_TOP_K};
use crate::keyword::KeywordRetriever;
use crate::models::Document;

/// Which path produced a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalSource {
    Vector,
    Keyword,
}

impl fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalSource::Vector => write!(f, "vector"),
            RetrievalSource::Keyword => write!(f, "keyword"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedDocument {
    pub document: Document,
    /// Cosine similarity for vector hits, additive overlap score for
    /// keyword hits.
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    pub source: RetrievalSource,
    pub documents: Vec<RankedDocument>,
}

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    keyword: Option<KeywordRetriever>,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            keyword: None,
        }
    }

    /// Attach a keyword retriever used when vector search has nothing usable.
    pub fn with_keyword_fallback(mut self, keyword: KeywordRetriever) -> Self {
        self.keyword = Some(keyword);
        self
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Ranked documents for `query`, most relevant first.
    ///
    /// `limit <= 0` means the index default.
    pub async fn find_relevant_documents(&self, query: &str, limit: i64) -> Result<Vec<Document>> {
        let retrieval = self.retrieve(query, limit).await?;
        Ok(retrieval
            .documents
            .into_iter()
            .map(|ranked| ranked.document)
            .collect())
    }

    /// Like [`find_relevant_documents`](Self::find_relevant_documents), but
    /// keeps scores and reports which path answered.
    pub async fn retrieve(&self, query: &str, limit: i64) -> Result<Retrieval> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .context("failed to embed query")?;

        let err = match self.index.search(&embedding, limit) {
            Ok(results) => {
                debug!(hits = results.len(), "vector search");
                return Ok(Retrieval {
                    source: RetrievalSource::Vector,
                    documents: results
                        .into_iter()
                        .map(|r| RankedDocument {
                            document: r.document.clone(),
                            score: f64::from(r.score),
                        })
                        .collect(),
                });
            }
            Err(err) => err,
        };

        match &self.keyword {
            Some(keyword) if err.is_index_state() => self.keyword_fallback(keyword, query, limit, err),
            _ => Err(err).context("vector search failed"),
        }
    }

    fn keyword_fallback(
        &self,
        keyword: &KeywordRetriever,
        query: &str,
        limit: i64,
        cause: SearchError,
    ) -> Result<Retrieval> {
        let limit = if limit <= 0 {
            DEFAULT_TOP_K as i64
        } else {
            limit
        };
        let hits = keyword.search(query, limit);
        if hits.is_empty() {
            return Err(cause).context("vector search failed and keyword fallback found nothing");
        }

        info!(reason = %cause, hits = hits.len(), "using keyword fallback");
        Ok(Retrieval {
            source: RetrievalSource::Keyword,
            documents: hits
                .into_iter()
                .map(|h| RankedDocument {
                    document: h.document.clone(),
                    score: h.score,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps known query strings to fixed vectors.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new(entries: &[(&str, &[f32])]) -> Self {
            Self {
                table: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_vec()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn model_name(&self) -> &str {
            "table"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.table
                .get(text)
                .cloned()
                .ok_or(ProviderError::Status {
                    status: 500,
                    body: "unknown text".to_string(),
                })
        }
    }

    fn embedded(id: &str, title: &str, v: &[f32]) -> Document {
        Document::new(id, title, format!("https://docs.example/{}", id), "")
            .with_embedding(v.to_vec())
    }

    fn index() -> Arc<VectorIndex> {
        Arc::new(
            vec![
                embedded("first", "First", &[1.0, 0.0, 0.0]),
                embedded("second", "Second", &[0.0, 1.0, 0.0]),
                embedded("third", "Third", &[0.9, 0.1, 0.0]),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[tokio::test]
    async fn returns_documents_in_rank_order() {
        let embedder = Arc::new(TableEmbedder::new(&[("x axis", &[1.0, 0.0, 0.0])]));
        let engine = RetrievalEngine::new(embedder.clone(), index());

        let docs = engine.find_relevant_documents("x axis", 2).await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "third"]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn embedding_failure_propagates_with_context() {
        let engine = RetrievalEngine::new(Arc::new(TableEmbedder::new(&[])), index());
        let err = engine.find_relevant_documents("unknown", 3).await.unwrap_err();
        assert!(err.to_string().contains("failed to embed query"));
        assert!(err.downcast_ref::<ProviderError>().is_some());
    }

    #[tokio::test]
    async fn search_failure_keeps_kind() {
        let embedder = Arc::new(TableEmbedder::new(&[("z axis", &[0.0, 0.0, 1.0])]));
        let engine = RetrievalEngine::new(embedder, index());
        let err = engine.find_relevant_documents("z axis", 3).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<SearchError>(),
            Some(&SearchError::NoRelevantResults)
        );
    }

    #[tokio::test]
    async fn keyword_fallback_on_unembedded_index() {
        let docs = vec![
            Document::new("dns", "DNS records", "https://docs.example/dns", "Edit A records."),
            Document::new("mail", "Mail setup", "https://docs.example/mail", "MX records."),
        ];
        let plain: Arc<VectorIndex> = Arc::new(docs.clone().into_iter().collect());
        let embedder = Arc::new(TableEmbedder::new(&[("dns records", &[1.0, 0.0])]));
        let engine = RetrievalEngine::new(embedder, plain)
            .with_keyword_fallback(KeywordRetriever::new(docs));

        let retrieval = engine.retrieve("dns records", 0).await.unwrap();
        assert_eq!(retrieval.source, RetrievalSource::Keyword);
        assert_eq!(retrieval.documents[0].document.id, "dns");
    }

    #[tokio::test]
    async fn keyword_fallback_does_not_hide_provider_errors() {
        let docs = vec![Document::new("dns", "DNS records", "", "")];
        let engine = RetrievalEngine::new(Arc::new(TableEmbedder::new(&[])), index())
            .with_keyword_fallback(KeywordRetriever::new(docs));
        let err = engine.retrieve("dns records", 3).await.unwrap_err();
        assert!(err.downcast_ref::<ProviderError>().is_some());
    }

    #[tokio::test]
    async fn keyword_fallback_without_hits_reports_cause() {
        let docs = vec![Document::new("dns", "DNS records", "", "")];
        let embedder = Arc::new(TableEmbedder::new(&[("payments", &[0.0, 0.0, 1.0])]));
        let engine = RetrievalEngine::new(embedder, index())
            .with_keyword_fallback(KeywordRetriever::new(docs));
        let err = engine.retrieve("payments", 3).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<SearchError>(),
            Some(&SearchError::NoRelevantResults)
        );
    }

    #[tokio::test]
    async fn concurrent_queries_share_the_index() {
        let embedder = Arc::new(TableEmbedder::new(&[
            ("x axis", &[1.0, 0.0, 0.0]),
            ("y axis", &[0.0, 1.0, 0.0]),
        ]));
        let engine = Arc::new(RetrievalEngine::new(embedder, index()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = engine.clone();
            let query = if i % 2 == 0 { "x axis" } else { "y axis" };
            handles.push(tokio::spawn(async move {
                engine.find_relevant_documents(query, 1).await.unwrap()[0].id.clone()
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let top = handle.await.unwrap();
            assert_eq!(top, if i % 2 == 0 { "first" } else { "second" });
        }
    }
}
