use std::collections::BTreeMap;
use std::fmt;

use crate::traits::Strategy;

/// Everything a selection engine needs to build a per-attempt selection context.
pub struct SelectionCriteria {
    pub source_service: String,
    pub target_service: String,
    /// Requested protocol; empty when the call has not asked for one yet.
    pub protocol: String,
    /// Sticky-session token; empty when the call has no affinity yet.
    pub session_token: String,
    pub filters: Vec<String>,
    /// Strategy instance, `None` when the strategy name could not be resolved.
    pub strategy: Option<Box<dyn Strategy>>,
    pub route_tags: BTreeMap<String, String>,
}

impl fmt::Debug for SelectionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionCriteria")
            .field("source_service", &self.source_service)
            .field("target_service", &self.target_service)
            .field("protocol", &self.protocol)
            .field("session_token", &self.session_token)
            .field("filters", &self.filters)
            .field("strategy", &self.strategy.as_ref().map(|s| s.name().to_string()))
            .field("route_tags", &self.route_tags)
            .finish()
    }
}

/// Call attributes visible to a strategy while it picks an instance.
#[derive(Debug, Clone, Copy)]
pub struct PickRequest<'a> {
    pub target_service: &'a str,
    pub session_token: &'a str,
}
