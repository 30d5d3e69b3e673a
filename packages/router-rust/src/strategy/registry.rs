use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use waypoint_core::{SelectionError, Strategy, StrategyFactory};

use super::builtin::{RandomStrategy, RoundRobinStrategy, SessionStickinessStrategy, SessionStore};
use super::{STRATEGY_RANDOM, STRATEGY_ROUND_ROBIN, STRATEGY_SESSION_STICKINESS};

// ---------------------------------------------------------------------------
// StrategyRegistry
// ---------------------------------------------------------------------------

/// Name -> strategy factory mapping.
///
/// Populated at startup and only read afterwards. Lookups hand out the
/// factory; callers build a fresh strategy value per selection.
pub struct StrategyRegistry {
    factories: DashMap<String, StrategyFactory>,
    sessions: Arc<SessionStore>,
}

impl StrategyRegistry {
    /// Creates an empty registry with its own session store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
            sessions: Arc::new(SessionStore::new()),
        }
    }

    /// Creates a registry holding the built-in strategies.
    #[must_use]
    pub fn with_builtin() -> Self {
        Self::with_session_store(Arc::new(SessionStore::new()))
    }

    /// Like [`StrategyRegistry::with_builtin`], with sticky sessions kept in `sessions`.
    #[must_use]
    pub fn with_session_store(sessions: Arc<SessionStore>) -> Self {
        let registry = Self {
            factories: DashMap::new(),
            sessions,
        };
        registry.install_builtin();
        registry
    }

    /// Process-wide registry with the built-in strategies, initialized on first use.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<StrategyRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::with_builtin())).clone()
    }

    fn install_builtin(&self) {
        let cursor = Arc::new(AtomicUsize::new(0));
        self.register(
            STRATEGY_ROUND_ROBIN,
            Arc::new(move || -> Box<dyn Strategy> {
                Box::new(RoundRobinStrategy::with_cursor(cursor.clone()))
            }),
        );

        self.register(
            STRATEGY_RANDOM,
            Arc::new(|| -> Box<dyn Strategy> { Box::new(RandomStrategy) }),
        );

        let sessions = self.sessions.clone();
        let sticky_cursor = Arc::new(AtomicUsize::new(0));
        self.register(
            STRATEGY_SESSION_STICKINESS,
            Arc::new(move || -> Box<dyn Strategy> {
                Box::new(SessionStickinessStrategy::new(
                    sessions.clone(),
                    RoundRobinStrategy::with_cursor(sticky_cursor.clone()),
                ))
            }),
        );
    }

    /// Registers `factory` under `name`, replacing any previous registration.
    pub fn register(&self, name: &str, factory: StrategyFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Looks up the factory registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `SelectionError::StrategyNotFound` for unregistered names.
    pub fn lookup(&self, name: &str) -> Result<StrategyFactory, SelectionError> {
        self.factories
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SelectionError::StrategyNotFound {
                name: name.to_string(),
            })
    }

    /// Session store backing the session-stickiness strategy.
    #[must_use]
    pub fn sessions(&self) -> Arc<SessionStore> {
        self.sessions.clone()
    }

    /// Registered strategy names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
