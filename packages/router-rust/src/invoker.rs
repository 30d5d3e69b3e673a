//! Assembly of the default handler chain.

use std::sync::Arc;

use waypoint_core::{CallContext, ConfigProvider, InstanceRegistry, Response};

use crate::balancer::{EndpointSelector, LoadBalanceHandler};
use crate::chain::{ChainError, ChainTemplate, Handler, HandlerRegistry};
use crate::config::SharedConfig;
use crate::selection::{DefaultSelectionEngine, FilterRegistry};
use crate::strategy::StrategyRegistry;
use crate::transport::{TransportHandler, TransportService};

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

/// Entry point for outbound calls: runs each call through the configured
/// handler chain.
///
/// The chain order comes from `handlerChain` in the configuration snapshot
/// taken at construction; retry limits, strategies and filters are read
/// from the live [`SharedConfig`] on every call.
#[derive(Debug, Clone)]
pub struct Invoker {
    template: ChainTemplate,
}

impl Invoker {
    #[must_use]
    pub fn builder(
        config: Arc<SharedConfig>,
        instances: Arc<dyn InstanceRegistry>,
        transport: TransportService,
    ) -> InvokerBuilder {
        InvokerBuilder {
            config,
            instances,
            transport,
            strategies: None,
            filters: None,
            extra: Vec::new(),
        }
    }

    #[must_use]
    pub fn template(&self) -> &ChainTemplate {
        &self.template
    }

    /// Runs one logical call and returns its single response.
    pub async fn invoke(&self, ctx: &mut CallContext) -> Response {
        self.template.invoke(ctx).await
    }
}

// ---------------------------------------------------------------------------
// InvokerBuilder
// ---------------------------------------------------------------------------

pub struct InvokerBuilder {
    config: Arc<SharedConfig>,
    instances: Arc<dyn InstanceRegistry>,
    transport: TransportService,
    strategies: Option<Arc<StrategyRegistry>>,
    filters: Option<Arc<FilterRegistry>>,
    extra: Vec<Arc<dyn Handler>>,
}

impl InvokerBuilder {
    /// Uses `strategies` instead of the process-wide registry.
    #[must_use]
    pub fn strategies(mut self, strategies: Arc<StrategyRegistry>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    #[must_use]
    pub fn filters(mut self, filters: Arc<FilterRegistry>) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Makes `handler` available to the configured chain under its name.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.extra.push(handler);
        self
    }

    /// Builds the chain named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] if the configured chain is empty or names a
    /// handler that is not registered.
    pub fn build(self) -> Result<Invoker, ChainError> {
        let strategies = self.strategies.unwrap_or_else(StrategyRegistry::global);
        let filters = self
            .filters
            .unwrap_or_else(|| Arc::new(FilterRegistry::with_builtin()));
        let engine = DefaultSelectionEngine::new(self.instances, filters);
        let config: Arc<dyn ConfigProvider> = self.config.clone();
        let selector = EndpointSelector::new(config, strategies, Arc::new(engine));

        let registry = HandlerRegistry::new();
        registry.register_shared(Arc::new(LoadBalanceHandler::new(selector)));
        registry.register_shared(Arc::new(TransportHandler::new(self.transport)));
        for handler in self.extra {
            registry.register_shared(handler);
        }

        let names = self.config.snapshot().handler_chain.clone();
        let template = registry.build(&names)?;
        tracing::info!(handlers = ?template.names(), "invoker ready");
        Ok(Invoker { template })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use waypoint_core::{InvocationError, ServiceInstance, LB_SESSION_ID};

    use super::*;
    use crate::chain::Chain;
    use crate::config::RouterConfig;
    use crate::selection::StaticInstanceRegistry;
    use crate::strategy::STRATEGY_SESSION_STICKINESS;
    use crate::transport::{build_transport_pipeline, ProtocolRouter};

    fn instances() -> Arc<StaticInstanceRegistry> {
        let registry = StaticInstanceRegistry::new();
        registry.register(ServiceInstance::new("a", "orders").with_endpoint("http", "a:1"));
        registry.register(ServiceInstance::new("b", "orders").with_endpoint("http", "b:1"));
        Arc::new(registry)
    }

    /// Transport failing every call on `a:1`.
    fn transport(calls: Arc<AtomicU32>) -> TransportService {
        let router = ProtocolRouter::new().with(
            "http",
            tower::service_fn(move |ctx: CallContext| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if ctx.endpoint == "a:1" {
                        Err(InvocationError::downstream(anyhow::anyhow!("a is down")))
                    } else {
                        Ok(Response::ok(format!("served by {}", ctx.endpoint)))
                    }
                }
            }),
        );
        build_transport_pipeline(router, None)
    }

    fn shared(json: &str) -> Arc<SharedConfig> {
        Arc::new(SharedConfig::new(RouterConfig::from_json_str(json).unwrap()))
    }

    #[tokio::test]
    async fn retries_onto_healthy_instance() {
        let calls = Arc::new(AtomicU32::new(0));
        let invoker = Invoker::builder(
            shared(r#"{"loadBalance": {"retryEnabled": true, "retryOnNext": 1, "retryOnSame": 1}}"#),
            instances(),
            transport(calls.clone()),
        )
        .strategies(Arc::new(StrategyRegistry::with_builtin()))
        .build()
        .unwrap();

        let mut ctx = CallContext::new("gw", "orders");
        let resp = invoker.invoke(&mut ctx).await;

        assert!(resp.is_ok());
        assert_eq!(resp.body, bytes::Bytes::from_static(b"served by b:1"));
        // Two attempts on a:1, then one on b:1.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(invoker.template().names(), vec!["loadbalancer", "transport"]);
    }

    #[tokio::test]
    async fn without_retry_reports_downstream_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let invoker = Invoker::builder(shared("{}"), instances(), transport(calls.clone()))
            .strategies(Arc::new(StrategyRegistry::with_builtin()))
            .build()
            .unwrap();

        let resp = invoker.invoke(&mut CallContext::new("gw", "orders")).await;
        assert!(matches!(resp.error(), Some(InvocationError::Downstream(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Counts calls passing through it.
    struct Counting(Arc<AtomicU32>);

    #[async_trait]
    impl Handler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, chain: &mut Chain, ctx: &mut CallContext) -> Response {
            self.0.fetch_add(1, Ordering::SeqCst);
            chain.next(ctx).await
        }
    }

    #[tokio::test]
    async fn extra_handlers_join_configured_chain() {
        let seen = Arc::new(AtomicU32::new(0));
        let invoker = Invoker::builder(
            shared(r#"{
                "handlerChain": ["loadbalancer", "counting", "transport"],
                "loadBalance": {"retryEnabled": true, "retryOnSame": 2}
            }"#),
            instances(),
            transport(Arc::new(AtomicU32::new(0))),
        )
        .strategies(Arc::new(StrategyRegistry::with_builtin()))
        .handler(Arc::new(Counting(seen.clone())))
        .build()
        .unwrap();

        // Round robin starts on a:1, which always fails: three attempts.
        invoker.invoke(&mut CallContext::new("gw", "orders")).await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    /// Transport recording every endpoint it is asked to call.
    fn recording_transport(seen: Arc<std::sync::Mutex<Vec<String>>>) -> TransportService {
        let router = ProtocolRouter::new().with(
            "http",
            tower::service_fn(move |ctx: CallContext| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(ctx.endpoint.clone());
                    if ctx.endpoint == "a:1" {
                        Err(InvocationError::downstream(anyhow::anyhow!("a is down")))
                    } else {
                        Ok(Response::ok("ok"))
                    }
                }
            }),
        );
        build_transport_pipeline(router, None)
    }

    fn sticky_call(token: &str) -> CallContext {
        CallContext::new("gw", "orders")
            .with_strategy(STRATEGY_SESSION_STICKINESS)
            .with_metadata(LB_SESSION_ID, format!("{LB_SESSION_ID}={token}"))
    }

    #[tokio::test]
    async fn sticky_session_moves_off_failing_instance() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let strategies = Arc::new(StrategyRegistry::with_builtin());
        strategies.sessions().bind("u1", "a");
        let invoker = Invoker::builder(
            shared(r#"{"loadBalance": {"retryEnabled": true, "retryOnNext": 3, "retryOnSame": 0}}"#),
            instances(),
            recording_transport(seen.clone()),
        )
        .strategies(strategies.clone())
        .build()
        .unwrap();

        let resp = invoker.invoke(&mut sticky_call("u1")).await;

        assert!(resp.is_ok());
        assert_eq!(*seen.lock().unwrap(), vec!["a:1", "b:1"]);
        // Later calls with the session stay on the healthy instance.
        assert_eq!(strategies.sessions().get("u1").as_deref(), Some("b"));
        assert!(invoker.invoke(&mut sticky_call("u1")).await.is_ok());
        assert_eq!(seen.lock().unwrap().last().map(String::as_str), Some("b:1"));
    }

    #[tokio::test]
    async fn session_bindings_stay_bounded() {
        let config = shared(r#"{"sessionStickiness": {"capacity": 256}}"#);
        let strategies = Arc::new(StrategyRegistry::with_session_store(Arc::new(
            config.snapshot().session_stickiness.store(),
        )));
        let invoker = Invoker::builder(
            config,
            instances(),
            recording_transport(Arc::new(std::sync::Mutex::new(Vec::new()))),
        )
        .strategies(strategies.clone())
        .build()
        .unwrap();

        for n in 0..10_000 {
            invoker.invoke(&mut sticky_call(&format!("user-{n}"))).await;
        }
        let kept = strategies.sessions().len();
        assert!(kept > 0 && kept <= 512, "kept {kept} bindings");
    }

    #[test]
    fn unknown_configured_handler_fails_build() {
        let err = Invoker::builder(
            shared(r#"{"handlerChain": ["loadbalancer", "ratelimit", "transport"]}"#),
            instances(),
            transport(Arc::new(AtomicU32::new(0))),
        )
        .build()
        .unwrap_err();
        assert!(matches!(err, ChainError::UnknownHandler { name } if name == "ratelimit"));
    }
}
