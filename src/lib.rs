//! # rag-bot
//!
//! Retrieval core for a support bot that answers questions from a markdown
//! knowledge base with a local Ollama model.
//!
//! Documents are embedded once (through a persistent look-aside cache),
//! held in an in-memory vector index, and searched by cosine similarity at
//! query time. The matching documents are handed to a generation model
//! together with the question. A keyword retriever covers the cases where
//! no vectors are available.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Loader  │──▶│    Ingest    │──▶│ VectorIndex │
//! │ markdown │   │ cache+embed  │   │  (cosine)   │
//! └──────────┘   └──────┬───────┘   └──────┬──────┘
//!                       │                  │
//!                       ▼                  ▼
//!                ┌─────────────┐    ┌─────────────┐
//!                │  ModelGate  │◀───│   Engine    │──▶ generation
//!                │ single-flt  │    │ (+keyword)  │
//!                └──────┬──────┘    └─────────────┘
//!                       ▼
//!                 Ollama HTTP API
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag-bot models ensure           # download the configured models
//! rag-bot index                   # embed the knowledge base
//! rag-bot search "domain" --mode keyword
//! rag-bot ask "How do I connect a domain?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors at the seams |
//! | [`gate`] | Model availability with single-flight checks |
//! | [`cache`] | Persistent embedding cache |
//! | [`index`] | Vector index and cosine similarity |
//! | [`keyword`] | Keyword retrieval |
//! | [`engine`] | Query-time retrieval |
//! | [`embedding`] | Embedder abstraction |
//! | [`provider`] | Ollama HTTP client |
//! | [`generation`] | Answer prompt and generation |
//! | [`loader`] | Markdown document loader |
//! | [`ingest`] | Embedding pass over loaded documents |

pub mod cache;
pub mod config;
pub mod embed_cmd;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod gate;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod keyword;
pub mod loader;
pub mod logging;
pub mod models;
pub mod models_cmd;
pub mod progress;
pub mod provider;
pub mod search;
pub mod stats;
