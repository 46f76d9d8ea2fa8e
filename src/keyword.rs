//! Lexical keyword retrieval.
//!
//! A simple, auditable alternative to vector search that needs no
//! embeddings: the query is normalized into content tokens, and each
//! document is scored by how those tokens overlap its header and keyword
//! field.
//!
//! # Scoring
//!
//! For every query token:
//!
//! | Match | Weight |
//! |-------|--------|
//! | token is a substring of the header | 3.0 |
//! | token is a substring of the keyword field | 2.0 |
//! | each header word containing, or contained in, the token | 1.0 |
//! | each keyword-field word containing, or contained in, the token | 0.5 |
//!
//! Header and keyword-field words are split on whitespace only; the length
//! and stop-word filters apply to the query alone.
//!
//! Weights add up across tokens and match kinds. Documents scoring 0 are
//! dropped; the rest are sorted by score (desc) and truncated to `top_k`.
//! Unlike [`VectorIndex::search`](crate::index::VectorIndex::search), a
//! `top_k` of zero or less returns nothing.

use std::collections::HashSet;

use crate::models::{Document, KeywordHit};

const HEADER_WEIGHT: f64 = 3.0;
const KEYWORD_WEIGHT: f64 = 2.0;
const HEADER_WORD_WEIGHT: f64 = 1.0;
const KEYWORD_WORD_WEIGHT: f64 = 0.5;

/// Tokens this short carry no signal.
const MIN_TOKEN_CHARS: usize = 3;

/// Russian and English function words ignored in queries.
const STOP_WORDS: &[&str] = &[
    // Russian
    "без", "более", "был", "была", "были", "было", "быть", "вам", "вас", "весь", "во", "вот",
    "все", "всего", "всех", "вы", "где", "да", "даже", "для", "его", "ее", "если", "есть",
    "еще", "же", "за", "здесь", "или", "им", "их", "как", "какая", "какой", "когда", "кто",
    "ли", "либо", "мне", "может", "можно", "мой", "мы", "на", "над", "надо", "нам", "нас",
    "не", "него", "нее", "нет", "ни", "них", "но", "ну", "об", "однако", "он", "она", "они",
    "оно", "от", "очень", "по", "под", "при", "про", "раз", "сам", "себя", "так", "также",
    "такой", "там", "тебя", "тем", "то", "того", "тоже", "только", "том", "ты", "уже",
    "хотя", "чего", "чей", "чем", "что", "чтобы", "эта", "эти", "это", "этот", "мою", "моя",
    "мое", "свой", "своя", "свою", "будет", "сделать", "нужно",
    // English
    "about", "after", "all", "also", "and", "any", "are", "because", "been", "before",
    "but", "can", "could", "did", "does", "for", "from", "had", "has", "have", "her", "his",
    "how", "into", "its", "just", "more", "not", "now", "only", "other", "our", "out",
    "should", "some", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "was", "were", "what", "when", "where", "which", "while",
    "who", "why", "will", "with", "would", "you", "your",
];

struct IndexedDocument {
    document: Document,
    header: String,
    keywords: String,
    header_words: Vec<String>,
    keyword_words: Vec<String>,
}

/// Scores documents against a query by term overlap.
pub struct KeywordRetriever {
    documents: Vec<IndexedDocument>,
    stop_words: HashSet<&'static str>,
}

impl KeywordRetriever {
    /// Build a retriever over `documents`.
    ///
    /// The header is the document title. The keyword field is the
    /// document's `keywords` line when present, otherwise its content.
    pub fn new(documents: Vec<Document>) -> Self {
        let stop_words: HashSet<&'static str> = STOP_WORDS.iter().copied().collect();
        let documents = documents
            .into_iter()
            .map(|document| {
                let header = document.title.to_lowercase();
                let keyword_source = if document.keywords.trim().is_empty() {
                    &document.content
                } else {
                    &document.keywords
                };
                let keywords = keyword_source.to_lowercase();
                let header_words = split_words(&header);
                let keyword_words = split_words(&keywords);
                IndexedDocument {
                    document,
                    header,
                    keywords,
                    header_words,
                    keyword_words,
                }
            })
            .collect();
        Self {
            documents,
            stop_words,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Normalize a query into the tokens used for scoring.
    pub fn query_tokens(&self, query: &str) -> Vec<String> {
        tokenize(query, &self.stop_words)
    }

    /// Return at most `top_k` documents ranked by keyword score.
    pub fn search(&self, query: &str, top_k: i64) -> Vec<KeywordHit<'_>> {
        if top_k <= 0 {
            return Vec::new();
        }
        let tokens = self.query_tokens(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<KeywordHit<'_>> = self
            .documents
            .iter()
            .filter_map(|indexed| {
                let score = score_document(indexed, &tokens);
                (score > 0.0).then_some(KeywordHit {
                    document: &indexed.document,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k as usize);
        hits
    }
}

fn score_document(doc: &IndexedDocument, tokens: &[String]) -> f64 {
    let mut score = 0.0;
    for token in tokens {
        if doc.header.contains(token.as_str()) {
            score += HEADER_WEIGHT;
        }
        if doc.keywords.contains(token.as_str()) {
            score += KEYWORD_WEIGHT;
        }
        score += HEADER_WORD_WEIGHT * overlapping_words(&doc.header_words, token) as f64;
        score += KEYWORD_WORD_WEIGHT * overlapping_words(&doc.keyword_words, token) as f64;
    }
    score
}

fn overlapping_words(words: &[String], token: &str) -> usize {
    words
        .iter()
        .filter(|w| w.contains(token) || token.contains(w.as_str()))
        .count()
}

/// Document-side words for partial matching. Short words and stop words
/// are kept; only queries are filtered.
fn split_words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Lower-case, keep only letters and whitespace, split, and drop short
/// tokens and stop words.
fn tokenize(text: &str, stop_words: &HashSet<&'static str>) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .filter(|t| !stop_words.contains(t))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, title: &str, keywords: &str) -> Document {
        let mut d = Document::new(id, title, format!("https://docs.example/{}", id), "");
        d.keywords = keywords.to_string();
        d
    }

    fn retriever() -> KeywordRetriever {
        KeywordRetriever::new(vec![
            doc("domain", "Как подключить домен", "домен, dns, подключение"),
            doc("payment", "Настройка оплаты", "оплата, касса, платежи"),
            doc("mail", "Настройка почты на домене", "почта, email, домен"),
        ])
    }

    #[test]
    fn tokens_are_normalized() {
        let r = retriever();
        assert_eq!(
            r.query_tokens("Как ПОДКЛЮЧИТЬ мой домен?! 123"),
            vec!["подключить", "домен"]
        );
        assert_eq!(r.query_tokens("The DNS records, for example"), vec!["dns", "records", "example"]);
    }

    #[test]
    fn stop_words_only_is_empty() {
        let r = retriever();
        assert!(r.search("как это что the and", 5).is_empty());
        assert!(r.search("", 5).is_empty());
        assert!(r.search("a b ab ?!", 5).is_empty());
    }

    #[test]
    fn header_match_outranks_keyword_match() {
        let r = retriever();
        let hits = r.search("подключить домен", 5);
        assert_eq!(hits[0].document.id, "domain");
        let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
        assert!(ids.contains(&"mail"));
        assert!(!ids.contains(&"payment"));
    }

    #[test]
    fn scores_accumulate_per_match_kind() {
        let r = KeywordRetriever::new(vec![doc("d", "Домен", "домен")]);
        let hits = r.search("домен", 5);
        // header substring 3.0 + keyword substring 2.0 + header word 1.0 + keyword word 0.5
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 6.5).abs() < 1e-9);
    }

    #[test]
    fn partial_word_overlap_scores() {
        let r = KeywordRetriever::new(vec![doc("d", "Настройки", "")]);
        // "настройка" is not a substring of "настройки", and vice versa: no score.
        assert!(r.search("настройка", 5).is_empty());

        let r = KeywordRetriever::new(vec![doc("d", "Платежные системы", "")]);
        // "платеж" is contained in the header word "платежные".
        let hits = r.search("платеж", 5);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 4.0).abs() < 1e-9);
    }

    #[test]
    fn short_document_words_still_match_partially() {
        let r = KeywordRetriever::new(vec![doc("go", "Go", "go")]);
        let hits = r.search("google", 5);
        // header word 1.0 + keyword word 0.5; neither field contains "google"
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.5).abs() < 1e-9);

        let r = KeywordRetriever::new(vec![doc("pay", "Оплата на сайте", "")]);
        // "на" is a stop word in queries but still a header word.
        let hits = r.search("настройка", 5);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn content_is_keyword_field_without_keywords() {
        let d = Document::new("x", "Untitled", "", "Instructions about invoices");
        let r = KeywordRetriever::new(vec![d]);
        let hits = r.search("invoices", 3);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 2.5).abs() < 1e-9);
    }

    #[test]
    fn top_k_is_strict() {
        let r = retriever();
        assert_eq!(r.search("настройка домен", 1).len(), 1);
        assert!(r.search("домен", 0).is_empty());
        assert!(r.search("домен", -1).is_empty());
        assert_eq!(r.search("домен", 10).len(), 2);
    }
}
