//! Model availability gate.
//!
//! Before any embedding or generation request reaches the provider, the
//! model it names must be present there. [`ModelGate::ensure_available`]
//! checks the provider's model list, downloads the model if it is missing,
//! and remembers models that turned out to be ready.
//!
//! # Single flight
//!
//! Concurrent callers asking for the same model share one check-or-download
//! sequence. The first caller registers an in-flight [`OnceCell`] for the
//! model name and runs the sequence; everyone arriving while it runs awaits
//! that cell and receives the identical outcome, success or error. The
//! entry is removed once the sequence finishes, so a failed attempt is
//! retried from scratch by the next caller.
//!
//! Readiness is sticky: once a model is marked ready it is never checked
//! again unless [`ModelGate::invalidate`] is called.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::GateError;

/// Provider operations the gate needs.
///
/// Implemented by [`OllamaApi`](crate::provider::OllamaApi) for the real
/// provider and by counting doubles in tests.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Names of the models currently available on the provider.
    async fn list_models(&self) -> Result<Vec<String>, GateError>;

    /// Download `model`, blocking until the provider reports completion.
    async fn pull_model(&self, model: &str) -> Result<(), GateError>;
}

type Outcome = Result<(), GateError>;

/// Ensures models are available, collapsing concurrent checks per model.
pub struct ModelGate {
    registry: Arc<dyn ModelRegistry>,
    ready: RwLock<HashSet<String>>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<Outcome>>>>,
}

impl ModelGate {
    pub fn new(registry: Arc<dyn ModelRegistry>) -> Self {
        Self {
            registry,
            ready: RwLock::new(HashSet::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `model` has already been confirmed available.
    pub fn is_ready(&self, model: &str) -> bool {
        self.ready
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(model)
    }

    /// Forget that `model` was ready; the next call checks the provider again.
    pub fn invalidate(&self, model: &str) {
        self.ready
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(model);
    }

    /// Make sure `model` is available on the provider, downloading it if needed.
    ///
    /// Returns immediately when the model is already known to be ready.
    /// Otherwise joins the in-flight check for `model` or starts one.
    ///
    /// # Errors
    ///
    /// Any [`GateError`] from listing or pulling, or
    /// [`GateError::StillUnavailable`] if the model is missing even after a
    /// successful download. Errors are not cached.
    pub async fn ensure_available(&self, model: &str) -> Result<(), GateError> {
        if self.is_ready(model) {
            return Ok(());
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            // A sequence may have completed between the fast path and here.
            if self.is_ready(model) {
                return Ok(());
            }
            in_flight
                .entry(model.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let outcome = cell.get_or_init(|| self.check_or_pull(model)).await.clone();

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if in_flight
                .get(model)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                in_flight.remove(model);
            }
        }

        outcome
    }

    async fn check_or_pull(&self, model: &str) -> Outcome {
        if self.is_listed(model).await? {
            self.mark_ready(model);
            debug!(model, "model available");
            return Ok(());
        }

        info!(model, "model not found on provider, downloading");
        self.registry
            .pull_model(model)
            .await
            .map_err(|e| GateError::Pull {
                model: model.to_string(),
                source: Box::new(e),
            })?;

        if self.is_listed(model).await? {
            self.mark_ready(model);
            info!(model, "model downloaded");
            Ok(())
        } else {
            warn!(model, "model still missing after download");
            Err(GateError::StillUnavailable {
                model: model.to_string(),
            })
        }
    }

    async fn is_listed(&self, model: &str) -> Result<bool, GateError> {
        let names = self.registry.list_models().await?;
        Ok(names.iter().any(|name| model_matches(name, model)))
    }

    fn mark_ready(&self, model: &str) {
        self.ready
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.to_string());
    }
}

/// Exact match, or a provider name that contains the requested one
/// (`"mxbai-embed-large:latest"` satisfies `"mxbai-embed-large"`).
fn model_matches(provider_name: &str, wanted: &str) -> bool {
    provider_name == wanted || provider_name.contains(wanted)
}
