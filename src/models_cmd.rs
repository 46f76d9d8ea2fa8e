//! `rag-bot models`: inspect and prepare provider models.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::gate::{ModelGate, ModelRegistry};
use crate::provider::OllamaApi;

/// Models a default `models ensure` prepares: the embedding model, then the
/// generation model when it differs.
pub fn configured_models(config: &Config) -> Vec<String> {
    let mut models = vec![config.provider.embed_model.clone()];
    if config.provider.llm_model != config.provider.embed_model {
        models.push(config.provider.llm_model.clone());
    }
    models
}

/// Run `rag-bot models list`.
pub async fn run_models_list(config: &Config) -> Result<()> {
    let api = OllamaApi::new(&config.provider)?;
    let models = api
        .list_models()
        .await
        .with_context(|| format!("Failed to list models at {}", api.base_url()))?;

    if models.is_empty() {
        println!("No models installed at {}.", api.base_url());
        return Ok(());
    }
    for model in models {
        println!("{}", model);
    }
    Ok(())
}

/// Run `rag-bot models ensure [<name>]`, downloading whatever is missing.
pub async fn run_models_ensure(config: &Config, model: Option<String>) -> Result<()> {
    let api = Arc::new(OllamaApi::new(&config.provider)?);
    let gate = ModelGate::new(api);

    let models = match model {
        Some(model) => vec![model],
        None => configured_models(config),
    };

    println!("{:<32} STATUS", "MODEL");
    for model in &models {
        gate.ensure_available(model)
            .await
            .with_context(|| format!("Model {} is not available", model))?;
        println!("{:<32} ready", model);
    }
    Ok(())
}
