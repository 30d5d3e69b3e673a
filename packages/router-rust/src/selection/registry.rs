use dashmap::DashMap;
use waypoint_core::{InstanceRegistry, ServiceInstance};

/// In-memory instance registry keyed by service name.
///
/// Stands in for a discovery-backed registry: instances are registered and
/// removed explicitly, and every lookup returns a snapshot copy.
#[derive(Debug, Default)]
pub struct StaticInstanceRegistry {
    services: DashMap<String, Vec<ServiceInstance>>,
}

impl StaticInstanceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instance under its `service_name`, replacing one with the same id.
    pub fn register(&self, instance: ServiceInstance) {
        let mut entry = self
            .services
            .entry(instance.service_name.clone())
            .or_default();
        match entry.iter_mut().find(|ins| ins.id == instance.id) {
            Some(existing) => *existing = instance,
            None => entry.push(instance),
        }
    }

    /// Removes an instance. Returns `true` if it was registered.
    pub fn deregister(&self, service: &str, instance_id: &str) -> bool {
        let Some(mut entry) = self.services.get_mut(service) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|ins| ins.id != instance_id);
        before != entry.len()
    }

    /// Number of instances registered for `service`.
    #[must_use]
    pub fn count(&self, service: &str) -> usize {
        self.services.get(service).map_or(0, |entry| entry.len())
    }
}

impl InstanceRegistry for StaticInstanceRegistry {
    fn instances(&self, service: &str) -> anyhow::Result<Vec<ServiceInstance>> {
        Ok(self
            .services
            .get(service)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_list() {
        let registry = StaticInstanceRegistry::new();
        registry.register(ServiceInstance::new("a", "orders").with_endpoint("http", "a:1"));
        registry.register(ServiceInstance::new("b", "orders").with_endpoint("http", "b:1"));
        registry.register(ServiceInstance::new("c", "billing"));

        let orders = registry.instances("orders").unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(registry.count("billing"), 1);
        assert!(registry.instances("unknown").unwrap().is_empty());
    }

    #[test]
    fn register_same_id_replaces() {
        let registry = StaticInstanceRegistry::new();
        registry.register(ServiceInstance::new("a", "orders").with_endpoint("http", "old:1"));
        registry.register(ServiceInstance::new("a", "orders").with_endpoint("http", "new:1"));
        let orders = registry.instances("orders").unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].endpoint("http"), Some("new:1"));
    }

    #[test]
    fn deregister_removes_instance() {
        let registry = StaticInstanceRegistry::new();
        registry.register(ServiceInstance::new("a", "orders"));
        assert!(registry.deregister("orders", "a"));
        assert!(!registry.deregister("orders", "a"));
        assert!(!registry.deregister("unknown", "a"));
        assert_eq!(registry.count("orders"), 0);
    }
}
