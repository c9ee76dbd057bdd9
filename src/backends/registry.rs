/*!
 * Name-to-constructor registry for generation backends.
 *
 * The registry is resolved once at startup: the configured backend name is
 * looked up and its constructor builds a shared instance.
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{GenerationBackend, MockBackend, OllamaBackend};
use crate::app_config::BackendConfig;
use crate::errors::BackendError;

/// Builds a backend from its configuration
pub type BackendConstructor =
    Arc<dyn Fn(&BackendConfig) -> Result<Arc<dyn GenerationBackend>, BackendError> + Send + Sync>;

#[derive(Clone)]
pub struct BackendRegistry {
    constructors: BTreeMap<String, BackendConstructor>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry").field("backends", &self.names()).finish()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl BackendRegistry {
    /// A registry without any backend
    pub fn empty() -> Self {
        Self { constructors: BTreeMap::new() }
    }

    /// `mock` and `ollama`
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("mock", |_| Ok(Arc::new(MockBackend::working()) as Arc<dyn GenerationBackend>));
        registry.register("ollama", |config| {
            Ok(Arc::new(OllamaBackend::new(config)?) as Arc<dyn GenerationBackend>)
        });
        registry
    }

    /// Adds or replaces the constructor for `name` (case-insensitive)
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&BackendConfig) -> Result<Arc<dyn GenerationBackend>, BackendError> + Send + Sync + 'static,
    {
        self.constructors.insert(name.to_lowercase(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_lowercase())
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Builds the backend named by `config.name`
    pub fn create(&self, config: &BackendConfig) -> Result<Arc<dyn GenerationBackend>, BackendError> {
        let name = config.name.to_lowercase();
        let constructor = self
            .constructors
            .get(&name)
            .ok_or_else(|| BackendError::UnknownBackend(config.name.clone()))?;
        constructor(config)
    }
}
