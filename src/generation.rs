//! Answer generation on top of retrieved documents.
//!
//! Builds a grounded prompt from the query and its context documents, sends
//! it to a [`Generator`], and cleans up the reply. Small local models tend
//! to echo parts of the prompt back, so [`sanitize_response`] cuts the
//! reply at the first echoed section marker.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;
use crate::models::Document;

/// Sampling options sent with every generation request.
///
/// Serialized in the provider's option names (`max_tokens` goes out as
/// `num_predict`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f64,
    #[serde(default = "default_max_tokens", rename(serialize = "num_predict"))]
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_temperature() -> f64 {
    0.3
}
fn default_top_k() -> u32 {
    30
}
fn default_top_p() -> f64 {
    0.8
}
fn default_repeat_penalty() -> f64 {
    1.1
}
fn default_max_tokens() -> u32 {
    600
}

/// Produces text from a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError>;
}

/// One entry of the context block: header, link, and body text.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextDocument {
    pub header: String,
    pub link: String,
    pub text: String,
}

impl From<&Document> for ContextDocument {
    fn from(doc: &Document) -> Self {
        Self {
            header: doc.title.clone(),
            link: doc.url.clone(),
            text: doc.content.clone(),
        }
    }
}

const SECTION_DOCUMENTS: &str = "DOCUMENTS:";
const SECTION_RULES: &str = "RULES:";
const SECTION_QUESTION: &str = "QUESTION:";
const SECTION_ANSWER: &str = "ANSWER:";

/// Build the grounded answer prompt.
///
/// Documents are numbered from 1 in the order given, each with its header,
/// link, and content.
pub fn build_answer_prompt(query: &str, docs: &[ContextDocument]) -> String {
    let mut context = String::new();
    for (i, doc) in docs.iter().enumerate() {
        context.push_str(&format!(
            "=== DOCUMENT {} ===\nHEADER: {}\nLINK: {}\nCONTENT:\n{}\n\n",
            i + 1,
            doc.header,
            doc.link,
            doc.text
        ));
    }

    format!(
        "You are a technical support expert. Answer the user's question using ONLY the information in the documents below.

{SECTION_DOCUMENTS}
{context}
{SECTION_RULES}
  - Give concrete steps that solve the problem
  - Be brief and to the point
  - Use only facts from the documents
  - Always cite the source as: Title: link
  - If the documents do not contain the answer, reply \"Information not found\"
  - If further actions are needed, list them
  - Do NOT repeat these rules in the answer
  - Do NOT mention \"documents\" or \"instructions\"

{SECTION_QUESTION} {query}

Give a detailed answer with concrete steps and cite the source as \"Title: link\".

{SECTION_ANSWER}
"
    )
}

/// Trim the reply, drop a leading answer marker, and cut at the first
/// echoed prompt section.
pub fn sanitize_response(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix(SECTION_ANSWER) {
        text = rest.trim_start();
    }

    let cut = [SECTION_DOCUMENTS, SECTION_RULES, SECTION_QUESTION, SECTION_ANSWER]
        .iter()
        .filter_map(|marker| find_line_start(text, marker))
        .min();
    if let Some(cut) = cut {
        text = &text[..cut];
    }

    text.trim().to_string()
}

/// Byte offset of the first line that starts with `marker`.
fn find_line_start(text: &str, marker: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with(marker) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Generate an answer to `query` grounded in `docs`.
pub async fn answer(
    generator: &dyn Generator,
    query: &str,
    docs: &[Document],
    options: &GenerationOptions,
) -> Result<String> {
    let context: Vec<ContextDocument> = docs.iter().map(ContextDocument::from).collect();
    let prompt = build_answer_prompt(query, &context);
    debug!(documents = context.len(), prompt_chars = prompt.chars().count(), "generating answer");

    let raw = generator
        .generate(&prompt, options)
        .await
        .context("answer generation failed")?;

    let answer = sanitize_response(&raw);
    if answer.is_empty() {
        bail!("generator returned an empty answer");
    }
    Ok(answer)
}
