//! Model and credential resolution.

use std::env;

use tracing::debug;

use crate::core::types::Model;
use crate::io::config::ModelEntry;

/// Host model registry and credential store.
pub trait ModelResolver: Send + Sync {
    /// Look up a model by provider and id.
    fn find_model(&self, provider: &str, id: &str) -> Option<Model>;

    /// API key for `model`, or `None` when no credential is configured.
    fn api_key(&self, model: &Model) -> Option<String>;
}

/// Resolver backed by the `[[models]]` catalog in `turnguard.toml`.
///
/// Keys are read from the environment at lookup time, so rotating a key does
/// not require reloading config.
#[derive(Debug, Clone, Default)]
pub struct ConfigModelResolver {
    entries: Vec<ModelEntry>,
}

impl ConfigModelResolver {
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self { entries }
    }

    fn entry(&self, provider: &str, id: &str) -> Option<&ModelEntry> {
        self.entries
            .iter()
            .find(|entry| entry.provider == provider && entry.id == id)
    }
}

impl ModelResolver for ConfigModelResolver {
    fn find_model(&self, provider: &str, id: &str) -> Option<Model> {
        self.entry(provider, id)
            .map(|entry| Model::new(&entry.provider, &entry.id))
    }

    fn api_key(&self, model: &Model) -> Option<String> {
        let entry = self.entry(&model.provider, &model.id)?;
        if entry.api_key_env.is_empty() {
            debug!(%model, "model has no api_key_env");
            return None;
        }
        env::var(&entry.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}
