use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::args::CallArgs;

/// Per-call context for one logical outbound request.
///
/// Created by the caller before endpoint selection and threaded through every
/// retry attempt. Handlers fill in the lazily-resolved fields (`strategy`,
/// `protocol`, `filters`, `endpoint`) as the call moves down the chain.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Service being called.
    pub target_service: String,
    /// Service issuing the call. Empty when the caller is not a named service.
    pub source_service: String,
    /// Operation name, used for logs only.
    pub operation: String,
    /// Requested protocol. Empty until resolved against the picked instance.
    pub protocol: String,
    /// Selection strategy name. Once set it is reused for every retry round.
    pub strategy: String,
    /// Ordered instance filter names.
    pub filters: Vec<String>,
    /// Tags an instance must carry to be eligible.
    pub route_tags: BTreeMap<String, String>,
    /// Endpoint address chosen for the current attempt.
    pub endpoint: String,
    /// Transport-specific arguments.
    pub args: Option<Arc<dyn CallArgs>>,
    /// Generic call metadata propagated alongside the request.
    pub metadata: HashMap<String, String>,
    /// Distributed trace identifier.
    pub trace_id: String,
    /// Cancelled by the caller when the call is abandoned.
    pub cancel: CancellationToken,
    /// Per-attempt deadline enforced by the transport layer.
    pub timeout: Option<Duration>,
}

impl CallContext {
    /// Creates a context for a call from `source_service` to `target_service`
    /// with a fresh trace id.
    #[must_use]
    pub fn new(source_service: impl Into<String>, target_service: impl Into<String>) -> Self {
        Self {
            target_service: target_service.into(),
            source_service: source_service.into(),
            operation: String::new(),
            protocol: String::new(),
            strategy: String::new(),
            filters: Vec::new(),
            route_tags: BTreeMap::new(),
            endpoint: String::new(),
            args: None,
            metadata: HashMap::new(),
            trace_id: uuid::Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: impl CallArgs + 'static) -> Self {
        self.args = Some(Arc::new(args));
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_route_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.route_tags.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reads a metadata entry, returning an empty string when it is absent.
    #[must_use]
    pub fn read_metadata(&self, key: &str) -> String {
        self.metadata.get(key).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
