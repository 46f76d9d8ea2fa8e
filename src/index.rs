//! In-memory vector index with brute-force cosine similarity search.
//!
//! The index is built once at startup from the loaded documents and then
//! shared read-only; it has no internal locking. Documents without an
//! embedding are kept (so the index mirrors the knowledge base) but skipped
//! during search.
//!
//! # Search Algorithm
//!
//! 1. Reject an empty index or an empty query vector.
//! 2. Score every embedded document by cosine similarity.
//! 3. Drop scores at or below [`MIN_RELEVANCE`].
//! 4. Sort by score (desc) and truncate to `top_k`.

use std::cmp::Ordering;

use crate::error::SearchError;
use crate::models::{Document, SearchResult};

/// Similarity at or below which a hit is treated as noise.
pub const MIN_RELEVANCE: f32 = 0.1;

/// `top_k` used when the caller passes zero or a negative value.
pub const DEFAULT_TOP_K: usize = 5;

/// Ordered collection of documents searchable by embedding.
#[derive(Debug, Default, Clone)]
pub struct VectorIndex {
    documents: Vec<Document>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document. Adding the same document twice stores it twice.
    pub fn add(&mut self, doc: Document) {
        self.documents.push(doc);
    }

    pub fn add_all(&mut self, docs: impl IntoIterator<Item = Document>) {
        self.documents.extend(docs);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of documents that carry an embedding.
    pub fn embedded_count(&self) -> usize {
        self.documents.iter().filter(|d| d.has_embedding()).count()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Find the `top_k` documents most similar to `query`.
    ///
    /// `top_k <= 0` means [`DEFAULT_TOP_K`]. Fewer results are returned when
    /// fewer documents clear the relevance threshold.
    ///
    /// # Errors
    ///
    /// [`SearchError::EmptyIndex`], [`SearchError::EmptyQuery`],
    /// [`SearchError::NoEmbeddedDocuments`], or
    /// [`SearchError::NoRelevantResults`], checked in that order.
    pub fn search(&self, query: &[f32], top_k: i64) -> Result<Vec<SearchResult<'_>>, SearchError> {
        if self.documents.is_empty() {
            return Err(SearchError::EmptyIndex);
        }
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let top_k = if top_k <= 0 {
            DEFAULT_TOP_K
        } else {
            top_k as usize
        };

        let mut embedded = 0usize;
        let mut results: Vec<SearchResult<'_>> = Vec::new();

        for doc in self.documents.iter().filter(|d| d.has_embedding()) {
            embedded += 1;
            let score = cosine_similarity(query, &doc.embedding);
            if score > MIN_RELEVANCE {
                results.push(SearchResult {
                    document: doc,
                    score,
                });
            }
        }

        if embedded == 0 {
            return Err(SearchError::NoEmbeddedDocuments);
        }
        if results.is_empty() {
            return Err(SearchError::NoRelevantResults);
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(top_k);

        Ok(results)
    }
}

impl FromIterator<Document> for VectorIndex {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        Self {
            documents: iter.into_iter().collect(),
        }
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Sums are accumulated in `f64` and the result narrowed to `f32`, which
/// keeps rounding error down on high-dimensional vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns exactly `0.0` for empty vectors, vectors of different lengths,
/// or a zero-magnitude vector on either side.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedded(id: &str, v: &[f32]) -> Document {
        Document::new(id, id, "", "").with_embedding(v.to_vec())
    }

    fn three_doc_index() -> VectorIndex {
        let mut index = VectorIndex::new();
        index.add(embedded("first", &[1.0, 0.0, 0.0]));
        index.add(embedded("second", &[0.0, 1.0, 0.0]));
        index.add(embedded("third", &[0.9, 0.1, 0.0]));
        index
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_symmetric() {
        let a = vec![0.3, -1.2, 4.0, 0.0];
        let b = vec![2.0, 0.5, -0.7, 1.1];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let sim = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(sim, 0.0);
        assert!(!sim.is_nan());
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn search_ranks_and_filters() {
        let index = three_doc_index();
        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.id, "first");
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results[1].document.id, "third");
        assert!((results[1].score - 0.9939).abs() < 1e-3);
    }

    #[test]
    fn below_threshold_is_excluded_even_with_room() {
        let index = three_doc_index();
        let results = index.search(&[1.0, 0.0, 0.0], 10).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "third"]);
    }

    #[test]
    fn non_positive_top_k_uses_default() {
        let mut index = VectorIndex::new();
        for i in 0..8 {
            index.add(embedded(&format!("d{}", i), &[1.0, i as f32 * 0.01]));
        }
        assert_eq!(index.search(&[1.0, 0.0], 0).unwrap().len(), DEFAULT_TOP_K);
        assert_eq!(index.search(&[1.0, 0.0], -3).unwrap().len(), DEFAULT_TOP_K);
        assert_eq!(index.search(&[1.0, 0.0], 7).unwrap().len(), 7);
    }

    #[test]
    fn empty_index_errors() {
        let index = VectorIndex::new();
        assert_eq!(index.search(&[1.0], 3).unwrap_err(), SearchError::EmptyIndex);
    }

    #[test]
    fn empty_query_errors() {
        let index = three_doc_index();
        assert_eq!(index.search(&[], 3).unwrap_err(), SearchError::EmptyQuery);
    }

    #[test]
    fn no_embedded_documents_errors() {
        let index: VectorIndex = vec![
            Document::new("a", "A", "", "text"),
            Document::new("b", "B", "", "text"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            index.search(&[1.0, 0.0], 3).unwrap_err(),
            SearchError::NoEmbeddedDocuments
        );
    }

    #[test]
    fn orthogonal_query_has_no_relevant_results() {
        let mut index = VectorIndex::new();
        index.add(embedded("a", &[1.0, 0.0, 0.0]));
        index.add(embedded("b", &[0.0, 1.0, 0.0]));
        assert_eq!(
            index.search(&[0.0, 0.0, 1.0], 3).unwrap_err(),
            SearchError::NoRelevantResults
        );
    }

    #[test]
    fn partially_embedded_index_skips_missing() {
        let mut index = VectorIndex::new();
        index.add(Document::new("plain", "Plain", "", "no vector"));
        index.add(embedded("vec", &[0.0, 1.0]));
        let results = index.search(&[0.0, 1.0], 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "vec");
        assert_eq!(index.embedded_count(), 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut index = VectorIndex::new();
        let d = embedded("dup", &[1.0, 0.0]);
        index.add_all(vec![d.clone(), d]);
        assert_eq!(index.search(&[1.0, 0.0], 5).unwrap().len(), 2);
    }
}
