//! Markdown knowledge-base loader.
//!
//! Walks `documents.root`, applies include/exclude globs to paths relative
//! to the root, and parses every matching file into a [`Document`].
//!
//! # File Format
//!
//! ```text
//! # How to connect a domain            <- title (first "# " line)
//! **URL:** https://docs.example/domain   <- source URL (first match after the title)
//! **Keywords:** domain, dns              <- optional keyword line
//!
//! Body text, with <a href="x">html links</a> rewritten to [html links](x).
//! ```
//!
//! Everything before the URL line is dropped from the content. The document
//! ID is the file stem, so `docs/domain.md` becomes `domain`. A file that
//! cannot be read is logged and skipped; later files whose stem repeats an
//! earlier ID are skipped too.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::models::Document;

/// Load and parse every matching markdown file, sorted by document ID.
pub fn load_documents(config: &DocumentsConfig) -> Result<Vec<Document>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Documents root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let parser = MarkdownParser::new()?;
    let mut paths = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        paths.push(path.to_path_buf());
    }

    let mut seen = HashSet::new();
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        match parser.parse_file(&path) {
            Ok(doc) => {
                if !seen.insert(doc.id.clone()) {
                    warn!(id = %doc.id, path = %path.display(), "duplicate document id, skipping");
                    continue;
                }
                documents.push(doc);
            }
            Err(e) => warn!(path = %path.display(), "skipping document: {:#}", e),
        }
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    debug!(count = documents.len(), root = %root.display(), "loaded documents");
    Ok(documents)
}

/// Parses the markdown layout described in the module docs.
pub struct MarkdownParser {
    url_line: Regex,
    keywords_line: Regex,
    html_link: Regex,
}

impl MarkdownParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            url_line: Regex::new(r"\*\*URL:\*\*\s+(.+)")?,
            keywords_line: Regex::new(r"^\s*\*\*Keywords:\*\*\s*(.*)$")?,
            html_link: Regex::new(r#"<a\s+href="([^"]+)"[^>]*>(.*?)</a>"#)?,
        })
    }

    pub fn parse_file(&self, path: &Path) -> Result<Document> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if id.is_empty() {
            bail!("Cannot derive a document id from {}", path.display());
        }
        Ok(self.parse_str(&id, &text))
    }

    pub fn parse_str(&self, id: &str, text: &str) -> Document {
        let mut lines: Vec<&str> = text.lines().collect();

        let mut title = String::new();
        if let Some(i) = lines.iter().position(|l| l.starts_with("# ")) {
            title = lines[i][2..].trim().to_string();
            lines.drain(..=i);
        }

        let mut url = String::new();
        if let Some((i, found)) = lines
            .iter()
            .enumerate()
            .find_map(|(i, l)| self.url_line.captures(l).map(|c| (i, c[1].trim().to_string())))
        {
            url = found;
            lines.drain(..=i);
        }

        let mut keywords = String::new();
        if let Some((i, found)) = lines.iter().enumerate().find_map(|(i, l)| {
            self.keywords_line
                .captures(l)
                .map(|c| (i, c[1].trim().to_string()))
        }) {
            keywords = found;
            lines.remove(i);
        }

        let content = lines.join("\n");
        let content = self
            .html_link
            .replace_all(content.trim(), "[$2]($1)")
            .into_owned();

        let mut doc = Document::new(id, title, url, content);
        doc.keywords = keywords;
        doc
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
