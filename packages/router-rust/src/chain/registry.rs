use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use super::handler::{ChainTemplate, Handler};

/// Builds one handler instance for a chain template.
pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn Handler> + Send + Sync>;

/// Errors building a chain template from handler names.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("unknown handler: {name}")]
    UnknownHandler { name: String },

    #[error("handler chain is empty")]
    Empty,
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Registry of handler factories, keyed by handler name.
///
/// Chains are described in configuration as ordered name lists; the registry
/// turns such a list into a [`ChainTemplate`]. Registration order is kept so
/// [`HandlerRegistry::names`] is stable.
pub struct HandlerRegistry {
    /// Name-based lookup: handler name -> factory.
    factories: DashMap<String, HandlerFactory>,
    /// Registration order.
    order: RwLock<Vec<String>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Registers `factory` under `name`. Re-registering a name replaces the
    /// factory but keeps its original position in [`HandlerRegistry::names`].
    pub fn register(&self, name: &str, factory: HandlerFactory) {
        if self.factories.insert(name.to_string(), factory).is_none() {
            self.order.write().push(name.to_string());
        }
    }

    /// Registers a single shared handler instance under its own name.
    pub fn register_shared(&self, handler: Arc<dyn Handler>) {
        let name = handler.name();
        self.register(name, Arc::new(move || handler.clone()));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.read().clone()
    }

    /// Builds a template running the named handlers in the given order.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::Empty` for an empty list and
    /// `ChainError::UnknownHandler` for the first unregistered name.
    pub fn build<S: AsRef<str>>(&self, names: &[S]) -> Result<ChainTemplate, ChainError> {
        if names.is_empty() {
            return Err(ChainError::Empty);
        }
        let handlers = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.factories
                    .get(name)
                    .map(|factory| (factory.value())())
                    .ok_or_else(|| ChainError::UnknownHandler {
                        name: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let template = ChainTemplate::new(handlers);
        tracing::debug!(handlers = ?template.names(), "built handler chain");
        Ok(template)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
