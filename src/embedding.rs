//! Embedding abstraction.
//!
//! Defines the [`Embedder`] trait that retrieval and ingest depend on, plus
//! the text preparation every embedding backend applies before sending
//! input to a model. The Ollama-backed implementation lives in
//! [`crate::provider`].

use async_trait::async_trait;

use crate::error::ProviderError;

/// Turns text into a dense vector.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"mxbai-embed-large"`).
    fn model_name(&self) -> &str;

    /// Embed one piece of text.
    ///
    /// # Errors
    ///
    /// [`ProviderError::EmptyInput`] for blank text, otherwise whatever the
    /// backend reports.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Trim `text` and cap it at `max_chars` characters.
///
/// The cut always lands on a character boundary, so multi-byte text is
/// never split mid-codepoint.
///
/// # Errors
///
/// [`ProviderError::EmptyInput`] when nothing but whitespace remains.
pub fn prepare_text(text: &str, max_chars: usize) -> Result<&str, ProviderError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderError::EmptyInput);
    }
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => Ok(&text[..cut]),
        None => Ok(text),
    }
}
