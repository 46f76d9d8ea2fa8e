//! Index progress reporting.
//!
//! `rag-bot index` can take minutes on a cold cache, one provider call per
//! document. Progress goes to **stderr** so stdout stays parseable for
//! scripts.

use std::io::Write;

/// A single progress event while building the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexProgressEvent {
    /// Walking the documents root; total unknown.
    Loading { root: String },
    /// `n` of `total` documents processed, `cached` of them served from the
    /// embedding cache.
    Embedding { n: u64, total: u64, cached: u64 },
}

/// Reports index progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IndexProgressEvent);
}

/// Human-friendly progress on stderr: "index  embedding  120 / 1,500 documents (97 cached)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IndexProgressEvent) {
        let line = match &event {
            IndexProgressEvent::Loading { root } => format!("index {}  loading...\n", root),
            IndexProgressEvent::Embedding { n, total, cached } => format!(
                "index  embedding  {} / {} documents ({} cached)\n",
                format_number(*n),
                format_number(*total),
                format_number(*cached)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IndexProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

fn event_json(event: &IndexProgressEvent) -> serde_json::Value {
    match event {
        IndexProgressEvent::Loading { root } => serde_json::json!({
            "event": "progress",
            "phase": "loading",
            "root": root
        }),
        IndexProgressEvent::Embedding { n, total, cached } => serde_json::json!({
            "event": "progress",
            "phase": "embedding",
            "n": n,
            "total": total,
            "cached": cached
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IndexProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
