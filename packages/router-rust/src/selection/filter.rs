//! Named instance filters.
//!
//! Filters run in the order the call (or the configured defaults) lists them
//! and narrow the candidate list before the strategy picks.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use waypoint_core::ServiceInstance;

/// Keeps instances whose tags contain every route tag of the call.
pub const FILTER_TAGS: &str = "tags";
/// Keeps instances advertising the requested protocol, if one was requested.
pub const FILTER_PROTOCOL: &str = "protocol";

/// Call attributes a filter may inspect.
#[derive(Debug, Clone, Copy)]
pub struct FilterCriteria<'a> {
    pub source_service: &'a str,
    pub target_service: &'a str,
    pub protocol: &'a str,
    pub route_tags: &'a BTreeMap<String, String>,
}

pub type InstanceFilter =
    Arc<dyn Fn(Vec<ServiceInstance>, &FilterCriteria<'_>) -> Vec<ServiceInstance> + Send + Sync>;

/// Name -> filter mapping.
pub struct FilterRegistry {
    filters: DashMap<String, InstanceFilter>,
}

impl FilterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: DashMap::new(),
        }
    }

    /// Creates a registry holding the `tags` and `protocol` filters.
    #[must_use]
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(FILTER_TAGS, Arc::new(tags_filter));
        registry.register(FILTER_PROTOCOL, Arc::new(protocol_filter));
        registry
    }

    pub fn register(&self, name: &str, filter: InstanceFilter) {
        self.filters.insert(name.to_string(), filter);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Applies the named filters in order. Unknown names are logged and skipped.
    #[must_use]
    pub fn apply(
        &self,
        names: &[String],
        mut instances: Vec<ServiceInstance>,
        criteria: &FilterCriteria<'_>,
    ) -> Vec<ServiceInstance> {
        for name in names {
            let Some(filter) = self.filters.get(name).map(|f| f.value().clone()) else {
                tracing::warn!(filter = %name, "unknown instance filter, skipping");
                continue;
            };
            instances = filter(instances, criteria);
        }
        instances
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn tags_filter(instances: Vec<ServiceInstance>, criteria: &FilterCriteria<'_>) -> Vec<ServiceInstance> {
    if criteria.route_tags.is_empty() {
        return instances;
    }
    instances
        .into_iter()
        .filter(|ins| {
            criteria
                .route_tags
                .iter()
                .all(|(k, v)| ins.tags.get(k) == Some(v))
        })
        .collect()
}

fn protocol_filter(
    instances: Vec<ServiceInstance>,
    criteria: &FilterCriteria<'_>,
) -> Vec<ServiceInstance> {
    if criteria.protocol.is_empty() {
        return instances;
    }
    instances
        .into_iter()
        .filter(|ins| ins.supports(criteria.protocol))
        .collect()
}
