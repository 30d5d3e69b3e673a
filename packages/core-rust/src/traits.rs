use std::sync::Arc;
use std::time::Duration;

use crate::error::SelectionError;
use crate::instance::ServiceInstance;
use crate::selection::{PickRequest, SelectionCriteria};

/// Instance selection algorithm (round robin, random, session stickiness, ...).
///
/// A strategy sees the already-filtered candidate list and returns one of them.
pub trait Strategy: Send + Sync {
    /// Registered name of the strategy.
    fn name(&self) -> &str;

    /// Picks one instance from `instances`, or `None` if it cannot choose.
    fn pick(&self, instances: &[ServiceInstance], request: &PickRequest<'_>) -> Option<ServiceInstance>;
}

/// Constructs a fresh strategy value for one selection.
pub type StrategyFactory = Arc<dyn Fn() -> Box<dyn Strategy> + Send + Sync>;

/// Builds scoped selection contexts from per-attempt criteria.
pub trait SelectionEngine: Send + Sync {
    /// Builds a context for one pick.
    ///
    /// # Errors
    ///
    /// Returns a `SelectionError` if the criteria cannot be turned into a context.
    fn build(&self, criteria: SelectionCriteria) -> Result<Box<dyn SelectionContext>, SelectionError>;
}

/// Single-use context that picks exactly one instance.
pub trait SelectionContext: Send {
    /// Picks one live instance.
    ///
    /// # Errors
    ///
    /// Returns `SelectionError::NoInstance` when no candidate is left, or a
    /// registry/strategy error.
    fn pick(&mut self) -> Result<ServiceInstance, SelectionError>;
}

/// Source of the live instance set per service.
pub trait InstanceRegistry: Send + Sync {
    /// Returns a snapshot of the instances currently known for `service`.
    fn instances(&self, service: &str) -> anyhow::Result<Vec<ServiceInstance>>;
}

/// Delay between same-instance attempts.
pub trait BackoffPolicy: Send + Sync {
    /// Delay to wait after the `attempt`-th failed attempt (1-based).
    /// `None` means give up retrying on this instance.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Load-balancing configuration as seen by the router.
///
/// Every per-call setting is resolved for a (source, target) service pair.
pub trait ConfigProvider: Send + Sync {
    fn retry_enabled(&self, source: &str, target: &str) -> bool;

    /// Extra attempts on the same instance within one round.
    fn retry_on_same(&self, source: &str, target: &str) -> u32;

    /// Extra rounds, each on a freshly selected instance.
    fn retry_on_next(&self, source: &str, target: &str) -> u32;

    fn backoff_policy(&self, source: &str, target: &str) -> Box<dyn BackoffPolicy>;

    fn default_strategy_name(&self, source: &str, target: &str) -> String;

    /// Ordered filter names applied when a call specifies none.
    fn default_filters(&self) -> Vec<String>;

    /// Preferred transport for calls to `target`; empty when unset.
    fn preferred_transport(&self, target: &str) -> String;
}
