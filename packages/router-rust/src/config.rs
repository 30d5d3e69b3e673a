//! Router configuration.
//!
//! [`RouterConfig`] is a plain serde struct holding global load-balancing
//! settings plus per-service overrides. Overrides are looked up most specific
//! first: `"<source>.<target>"`, then `"<target>"`, then the global settings.
//! [`SharedConfig`] publishes a validated snapshot through `ArcSwap` so that
//! readers never block and a reload replaces the whole configuration at once.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Deserialize;
use waypoint_core::{BackoffPolicy, ConfigProvider};

use crate::backoff::BackoffConfig;
use crate::balancer::LOADBALANCE_HANDLER;
use crate::strategy::{
    SessionStore, DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_TTL, STRATEGY_ROUND_ROBIN,
};
use crate::transport::TRANSPORT_HANDLER;

/// Handler names of the default chain.
pub const DEFAULT_HANDLER_CHAIN: &[&str] = &[LOADBALANCE_HANDLER, TRANSPORT_HANDLER];

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config for [{scope}]: {message}")]
    Invalid { scope: String, message: String },
}

// ---------------------------------------------------------------------------
// RouterConfig
// ---------------------------------------------------------------------------

/// Top-level router configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterConfig {
    /// Settings applied when no override matches.
    pub load_balance: LoadBalanceSettings,
    /// Overrides keyed by `"<target>"` or `"<source>.<target>"`.
    pub services: HashMap<String, LoadBalanceOverride>,
    /// Per-target reference settings (preferred transport).
    pub references: HashMap<String, ReferenceConfig>,
    /// Ordered handler names making up the invocation chain.
    pub handler_chain: Vec<String>,
    /// Limits of the session-stickiness binding store.
    pub session_stickiness: SessionStickinessSettings,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            load_balance: LoadBalanceSettings::default(),
            services: HashMap::new(),
            references: HashMap::new(),
            handler_chain: DEFAULT_HANDLER_CHAIN.iter().map(ToString::to_string).collect(),
            session_stickiness: SessionStickinessSettings::default(),
        }
    }
}

/// Global load-balancing settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadBalanceSettings {
    /// Strategy used when a call names none.
    pub strategy: String,
    /// Filters applied when a call names none.
    pub filters: Vec<String>,
    pub retry_enabled: bool,
    pub retry_on_same: u32,
    pub retry_on_next: u32,
    pub backoff: BackoffConfig,
}

impl Default for LoadBalanceSettings {
    fn default() -> Self {
        Self {
            strategy: STRATEGY_ROUND_ROBIN.to_string(),
            filters: Vec::new(),
            retry_enabled: false,
            retry_on_same: 0,
            retry_on_next: 0,
            backoff: BackoffConfig::Zero,
        }
    }
}

/// Per-service override. Unset fields fall through to the next scope.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadBalanceOverride {
    pub strategy: Option<String>,
    pub retry_enabled: Option<bool>,
    pub retry_on_same: Option<u32>,
    pub retry_on_next: Option<u32>,
    pub backoff: Option<BackoffConfig>,
}

/// Settings for calls made to one target service.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReferenceConfig {
    /// Preferred transport protocol; empty means "let the instance decide".
    pub transport: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStickinessSettings {
    /// Seconds a session binding survives without being used.
    pub timeout_secs: u64,
    /// Maximum number of bindings kept.
    pub capacity: usize,
}

impl Default for SessionStickinessSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SESSION_TTL.as_secs(),
            capacity: DEFAULT_SESSION_CAPACITY,
        }
    }
}

impl SessionStickinessSettings {
    /// Builds an empty binding store with these limits.
    #[must_use]
    pub fn store(&self) -> SessionStore {
        SessionStore::with_limits(self.capacity, Duration::from_secs(self.timeout_secs))
    }
}

/// Override key for a (source, target) pair. An empty source yields the
/// target-only key.
#[must_use]
pub fn ms_key(source: &str, target: &str) -> String {
    if source.is_empty() {
        target.to_string()
    } else {
        format!("{source}.{target}")
    }
}

impl RouterConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON and
    /// `ConfigError::Invalid` for out-of-range settings.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`RouterConfig::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Checks every backoff description.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending scope.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.load_balance
            .backoff
            .validate()
            .map_err(|message| ConfigError::Invalid {
                scope: "loadBalance".to_string(),
                message,
            })?;
        for (key, over) in &self.services {
            if let Some(backoff) = &over.backoff {
                backoff.validate().map_err(|message| ConfigError::Invalid {
                    scope: key.clone(),
                    message,
                })?;
            }
        }
        if self.session_stickiness.timeout_secs == 0 || self.session_stickiness.capacity == 0 {
            return Err(ConfigError::Invalid {
                scope: "sessionStickiness".to_string(),
                message: "timeoutSecs and capacity must be positive".to_string(),
            });
        }
        if self.handler_chain.is_empty() {
            return Err(ConfigError::Invalid {
                scope: "handlerChain".to_string(),
                message: "handler chain must name at least one handler".to_string(),
            });
        }
        Ok(())
    }

    /// Resolves one override field, most specific scope first.
    fn lookup<T>(
        &self,
        source: &str,
        target: &str,
        field: impl Fn(&LoadBalanceOverride) -> Option<T>,
    ) -> Option<T> {
        let pair = (!source.is_empty())
            .then(|| self.services.get(&ms_key(source, target)))
            .flatten();
        pair.and_then(&field)
            .or_else(|| self.services.get(target).and_then(&field))
    }
}

impl ConfigProvider for RouterConfig {
    fn retry_enabled(&self, source: &str, target: &str) -> bool {
        self.lookup(source, target, |o| o.retry_enabled)
            .unwrap_or(self.load_balance.retry_enabled)
    }

    fn retry_on_same(&self, source: &str, target: &str) -> u32 {
        self.lookup(source, target, |o| o.retry_on_same)
            .unwrap_or(self.load_balance.retry_on_same)
    }

    fn retry_on_next(&self, source: &str, target: &str) -> u32 {
        self.lookup(source, target, |o| o.retry_on_next)
            .unwrap_or(self.load_balance.retry_on_next)
    }

    fn backoff_policy(&self, source: &str, target: &str) -> Box<dyn BackoffPolicy> {
        self.lookup(source, target, |o| o.backoff)
            .unwrap_or(self.load_balance.backoff)
            .build()
    }

    fn default_strategy_name(&self, source: &str, target: &str) -> String {
        self.lookup(source, target, |o| o.strategy.clone())
            .unwrap_or_else(|| self.load_balance.strategy.clone())
    }

    fn default_filters(&self) -> Vec<String> {
        self.load_balance.filters.clone()
    }

    fn preferred_transport(&self, target: &str) -> String {
        self.references
            .get(target)
            .map(|r| r.transport.clone())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// SharedConfig
// ---------------------------------------------------------------------------

/// Hot-reloadable configuration handle shared by every call.
#[derive(Debug)]
pub struct SharedConfig {
    current: ArcSwap<RouterConfig>,
}

impl SharedConfig {
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RouterConfig> {
        self.current.load_full()
    }

    /// Validates `config` and swaps it in. The old snapshot stays in effect on error.
    ///
    /// # Errors
    ///
    /// Returns the validation error without changing the active configuration.
    pub fn reload(&self, config: RouterConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.current.store(Arc::new(config));
        tracing::info!("router configuration reloaded");
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl ConfigProvider for SharedConfig {
    fn retry_enabled(&self, source: &str, target: &str) -> bool {
        self.current.load().retry_enabled(source, target)
    }

    fn retry_on_same(&self, source: &str, target: &str) -> u32 {
        self.current.load().retry_on_same(source, target)
    }

    fn retry_on_next(&self, source: &str, target: &str) -> u32 {
        self.current.load().retry_on_next(source, target)
    }

    fn backoff_policy(&self, source: &str, target: &str) -> Box<dyn BackoffPolicy> {
        self.current.load().backoff_policy(source, target)
    }

    fn default_strategy_name(&self, source: &str, target: &str) -> String {
        self.current.load().default_strategy_name(source, target)
    }

    fn default_filters(&self) -> Vec<String> {
        self.current.load().default_filters()
    }

    fn preferred_transport(&self, target: &str) -> String {
        self.current.load().preferred_transport(target)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
