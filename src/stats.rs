//! Embedding cache overview.
//!
//! Backs `rag-bot cache stats` (how many embeddings are stored, for how
//! many documents, file size, freshness of the newest entry) and
//! `rag-bot cache clear`.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::cache::{CacheStats, EmbeddingCache};
use crate::config::Config;

/// Run `rag-bot cache stats`.
pub fn run_cache_stats(config: &Config) -> Result<()> {
    let cache = EmbeddingCache::new(&config.cache.path);
    let stats = cache
        .stats()
        .with_context(|| format!("Failed to read cache {}", config.cache.path.display()))?;
    let file_size = std::fs::metadata(&config.cache.path).ok().map(|m| m.len());
    print!("{}", render_cache_stats(&stats, file_size));
    Ok(())
}

/// Run `rag-bot cache clear`: empty the cache and write the empty file.
///
/// An unreadable file is still replaced; only the reported count is lost.
pub fn run_cache_clear(config: &Config) -> Result<()> {
    let cache = EmbeddingCache::new(&config.cache.path);
    let removed = match cache.stats() {
        Ok(stats) => stats.entries,
        Err(e) => {
            warn!(error = %e, "clearing a cache that could not be read");
            0
        }
    };
    cache.clear();
    cache
        .flush()
        .with_context(|| format!("Failed to clear cache {}", config.cache.path.display()))?;
    println!(
        "Cleared {} embedding(s) from {}",
        removed,
        config.cache.path.display()
    );
    Ok(())
}

/// Render a cache summary. `file_size` is `None` when the file does not exist.
pub fn render_cache_stats(stats: &CacheStats, file_size: Option<u64>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Embedding Cache");
    let _ = writeln!(out, "===============");
    let _ = writeln!(out);
    let _ = writeln!(out, "  File:        {}", stats.path.display());
    let _ = writeln!(
        out,
        "  Size:        {}",
        file_size
            .map(format_bytes)
            .unwrap_or_else(|| "(not written yet)".to_string())
    );
    let _ = writeln!(out, "  Entries:     {}", stats.entries);
    let _ = writeln!(out, "  Documents:   {}", stats.documents);
    let _ = writeln!(
        out,
        "  Newest:      {}",
        stats
            .newest
            .map(|ts| format_relative(ts, Utc::now()))
            .unwrap_or_else(|| "never".to_string())
    );
    if let Some(warning) = &stats.load_warning {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Warning: {}", warning);
    }
    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" style age, falling back to a date past 30 days or for
/// timestamps in the future.
fn format_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();
    if delta < 0 || delta >= 86400 * 30 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, plural(mins))
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, plural(days))
    }
}
