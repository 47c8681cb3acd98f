//! Handler registry: step type tag → handler factory.
//!
//! Populated once at startup through `&mut` access, then shared behind an
//! `Arc` and only read.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::filter::FilterStep;
use super::http::{HttpSettings, HttpStep};
use super::StepHandler;

/// Constructor for a step handler
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn StepHandler> + Send + Sync>;

/// Registry lookup failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown step type '{0}'")]
    UnknownStepType(String),
}

/// Maps step type tags to handler factories
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `http` and `filter` steps
    ///
    /// The legacy tags `http_request_node` and `filter_node` resolve to the
    /// same handlers.
    pub fn with_builtins(settings: HttpSettings) -> Self {
        let mut registry = Self::new();

        // One client shared by every http step
        let client = HttpStep::default_client();
        for tag in ["http", "http_request_node"] {
            let client = client.clone();
            let settings = settings.clone();
            registry.register(tag, move || {
                Box::new(HttpStep::with_client(client.clone(), settings.clone()))
            });
        }

        for tag in ["filter", "filter_node"] {
            registry.register(tag, || Box::new(FilterStep::new()));
        }

        registry
    }

    /// Register a factory for a tag, replacing any previous one
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn StepHandler> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
    }

    /// Build a handler for a tag
    pub fn resolve(&self, tag: &str) -> Result<Box<dyn StepHandler>, RegistryError> {
        self.factories
            .get(tag)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnknownStepType(tag.to_string()))
    }

    /// Check whether a tag is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// All registered tags, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.factories.keys().cloned().collect();
        tags.sort();
        tags
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}
