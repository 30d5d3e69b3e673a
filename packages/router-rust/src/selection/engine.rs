use std::collections::BTreeMap;
use std::sync::Arc;

use waypoint_core::{
    InstanceRegistry, PickRequest, SelectionContext, SelectionCriteria, SelectionEngine,
    SelectionError, ServiceInstance, Strategy,
};

use super::filter::{FilterCriteria, FilterRegistry};

// ---------------------------------------------------------------------------
// DefaultSelectionEngine
// ---------------------------------------------------------------------------

/// Selection engine over an [`InstanceRegistry`] and a [`FilterRegistry`].
///
/// Each pick reads a fresh registry snapshot, narrows it with the call's
/// filters, and lets the call's strategy choose.
#[derive(Clone)]
pub struct DefaultSelectionEngine {
    registry: Arc<dyn InstanceRegistry>,
    filters: Arc<FilterRegistry>,
}

impl DefaultSelectionEngine {
    #[must_use]
    pub fn new(registry: Arc<dyn InstanceRegistry>, filters: Arc<FilterRegistry>) -> Self {
        Self { registry, filters }
    }
}

impl SelectionEngine for DefaultSelectionEngine {
    fn build(&self, criteria: SelectionCriteria) -> Result<Box<dyn SelectionContext>, SelectionError> {
        let Some(strategy) = criteria.strategy else {
            return Err(SelectionError::MissingStrategy {
                service: criteria.target_service,
            });
        };
        Ok(Box::new(DefaultSelection {
            registry: self.registry.clone(),
            filters: self.filters.clone(),
            strategy,
            source_service: criteria.source_service,
            target_service: criteria.target_service,
            protocol: criteria.protocol,
            session_token: criteria.session_token,
            filter_names: criteria.filters,
            route_tags: criteria.route_tags,
        }))
    }
}

// ---------------------------------------------------------------------------
// DefaultSelection
// ---------------------------------------------------------------------------

/// Per-attempt selection context built by [`DefaultSelectionEngine`].
pub struct DefaultSelection {
    registry: Arc<dyn InstanceRegistry>,
    filters: Arc<FilterRegistry>,
    strategy: Box<dyn Strategy>,
    source_service: String,
    target_service: String,
    protocol: String,
    session_token: String,
    filter_names: Vec<String>,
    route_tags: BTreeMap<String, String>,
}

impl SelectionContext for DefaultSelection {
    fn pick(&mut self) -> Result<ServiceInstance, SelectionError> {
        let instances = self
            .registry
            .instances(&self.target_service)
            .map_err(|err| SelectionError::Registry {
                service: self.target_service.clone(),
                message: format!("{err:#}"),
            })?;

        let criteria = FilterCriteria {
            source_service: &self.source_service,
            target_service: &self.target_service,
            protocol: &self.protocol,
            route_tags: &self.route_tags,
        };
        let candidates = self.filters.apply(&self.filter_names, instances, &criteria);

        let request = PickRequest {
            target_service: &self.target_service,
            session_token: &self.session_token,
        };
        self.strategy
            .pick(&candidates, &request)
            .ok_or_else(|| SelectionError::NoInstance {
                service: self.target_service.clone(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
