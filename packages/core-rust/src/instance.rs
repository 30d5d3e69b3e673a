use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single live instance of a service as reported by the instance registry.
///
/// The router never mutates instances; it reads the snapshot handed out by a
/// selection context and resolves one endpoint from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    /// Registry-assigned instance identifier.
    pub id: String,
    /// Name of the service this instance belongs to.
    pub service_name: String,
    /// Protocol name -> endpoint address. Ordered so that iteration is stable.
    pub endpoints: BTreeMap<String, String>,
    /// Protocol to use when neither the call nor configuration asks for one.
    #[serde(default)]
    pub default_protocol: Option<String>,
    /// Free-form labels matched against route tags by the `tags` filter.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ServiceInstance {
    /// Creates an instance with no endpoints, tags or default protocol.
    #[must_use]
    pub fn new(id: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            service_name: service_name.into(),
            endpoints: BTreeMap::new(),
            default_protocol: None,
            tags: BTreeMap::new(),
        }
    }

    /// Adds an endpoint for `protocol`, replacing any previous address.
    #[must_use]
    pub fn with_endpoint(mut self, protocol: impl Into<String>, address: impl Into<String>) -> Self {
        self.endpoints.insert(protocol.into(), address.into());
        self
    }

    #[must_use]
    pub fn with_default_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.default_protocol = Some(protocol.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Returns the endpoint address advertised for `protocol`.
    #[must_use]
    pub fn endpoint(&self, protocol: &str) -> Option<&str> {
        self.endpoints.get(protocol).map(String::as_str)
    }

    /// Returns `true` if the instance advertises `protocol`.
    #[must_use]
    pub fn supports(&self, protocol: &str) -> bool {
        self.endpoints.contains_key(protocol)
    }

    /// Protocol names this instance advertises, in map order.
    #[must_use]
    pub fn supported_protocols(&self) -> Vec<String> {
        self.endpoints.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ServiceInstance {
        ServiceInstance::new("inst-1", "orders")
            .with_endpoint("http", "a:1")
            .with_endpoint("grpc", "b:2")
            .with_tag("version", "v2")
    }

    #[test]
    fn endpoint_lookup_by_protocol() {
        let ins = sample();
        assert_eq!(ins.endpoint("http"), Some("a:1"));
        assert_eq!(ins.endpoint("grpc"), Some("b:2"));
        assert_eq!(ins.endpoint("highway"), None);
        assert!(ins.supports("grpc"));
        assert!(!ins.supports("highway"));
    }

    #[test]
    fn supported_protocols_are_sorted() {
        assert_eq!(sample().supported_protocols(), vec!["grpc", "http"]);
    }

    #[test]
    fn deserializes_with_optional_fields_missing() {
        let json = r#"{"id":"i1","serviceName":"orders","endpoints":{"http":"10.0.0.1:8080"}}"#;
        let ins: ServiceInstance = serde_json::from_str(json).unwrap();
        assert_eq!(ins.endpoint("http"), Some("10.0.0.1:8080"));
        assert!(ins.default_protocol.is_none());
        assert!(ins.tags.is_empty());
    }
}
