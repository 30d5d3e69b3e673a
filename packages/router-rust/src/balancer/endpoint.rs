use std::sync::Arc;

use waypoint_core::{
    CallContext, ConfigProvider, SelectionCriteria, SelectionEngine, SelectionError,
    ServiceInstance, Strategy,
};

use super::session::session_token;
use crate::strategy::{StrategyRegistry, STRATEGY_SESSION_STICKINESS};

// ---------------------------------------------------------------------------
// EndpointSelector
// ---------------------------------------------------------------------------

/// Picks one live instance for a call and resolves the endpoint address to
/// dial on it.
///
/// Selection pins the call's lazily-resolved settings (strategy name,
/// filters, protocol) onto the [`CallContext`], so every retry round of the
/// same call selects under the same rules.
#[derive(Clone)]
pub struct EndpointSelector {
    config: Arc<dyn ConfigProvider>,
    strategies: Arc<StrategyRegistry>,
    engine: Arc<dyn SelectionEngine>,
}

impl EndpointSelector {
    #[must_use]
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        strategies: Arc<StrategyRegistry>,
        engine: Arc<dyn SelectionEngine>,
    ) -> Self {
        Self {
            config,
            strategies,
            engine,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    /// Selects an instance for `ctx` and returns the endpoint address for the
    /// call's protocol.
    ///
    /// # Errors
    ///
    /// Returns the selection engine's error as-is (`MissingStrategy` when the
    /// strategy could not be resolved, `NoInstance`, `Registry`), or
    /// `ProtocolMismatch` when the picked instance has no endpoint for the
    /// resolved protocol.
    pub fn select(&self, ctx: &mut CallContext) -> Result<String, SelectionError> {
        metrics::counter!("waypoint_lb_selections_total", "target" => ctx.target_service.clone())
            .increment(1);
        let result = self.select_inner(ctx);
        if result.is_err() {
            metrics::counter!(
                "waypoint_lb_selection_failures_total",
                "target" => ctx.target_service.clone()
            )
            .increment(1);
        }
        result
    }

    fn select_inner(&self, ctx: &mut CallContext) -> Result<String, SelectionError> {
        let strategy = self.resolve_strategy(ctx);

        if ctx.filters.is_empty() {
            ctx.filters = self.config.default_filters();
        }

        let session = if ctx.strategy == STRATEGY_SESSION_STICKINESS {
            session_token(ctx)
        } else {
            String::new()
        };

        let criteria = SelectionCriteria {
            source_service: ctx.source_service.clone(),
            target_service: ctx.target_service.clone(),
            protocol: ctx.protocol.clone(),
            session_token: session,
            filters: ctx.filters.clone(),
            strategy,
            route_tags: ctx.route_tags.clone(),
        };
        let instance = self.engine.build(criteria)?.pick()?;

        if ctx.protocol.is_empty() {
            ctx.protocol = self.default_protocol(&ctx.target_service, &instance);
        }

        match instance.endpoint(&ctx.protocol) {
            Some(endpoint) => {
                tracing::debug!(
                    source = %ctx.source_service,
                    target_service = %ctx.target_service,
                    instance = %instance.id,
                    protocol = %ctx.protocol,
                    endpoint,
                    "selected endpoint"
                );
                Ok(endpoint.to_string())
            }
            None => {
                let err = SelectionError::ProtocolMismatch {
                    protocol: ctx.protocol.clone(),
                    service: ctx.target_service.clone(),
                    supported: instance.supported_protocols(),
                };
                tracing::error!(instance = %instance.id, "{err}");
                Err(err)
            }
        }
    }

    /// Releases the sticky session of `ctx` after its instance failed a whole
    /// round, so the next selection moves to another instance. Calls not
    /// using session stickiness, or without a token, are left alone.
    pub fn release_session(&self, ctx: &CallContext) {
        if ctx.strategy != STRATEGY_SESSION_STICKINESS {
            return;
        }
        let token = session_token(ctx);
        if token.is_empty() {
            return;
        }
        if let Some(instance) = self.strategies.sessions().release(&token) {
            tracing::info!(
                source = %ctx.source_service,
                target_service = %ctx.target_service,
                instance = %instance,
                "released session binding of failing instance"
            );
        }
    }

    /// Pins the strategy name onto `ctx` and builds a strategy value.
    ///
    /// A lookup failure is logged and yields `None`; the selection engine
    /// then reports the call as lacking a strategy.
    fn resolve_strategy(&self, ctx: &mut CallContext) -> Option<Box<dyn Strategy>> {
        if ctx.strategy.is_empty() {
            ctx.strategy = self
                .config
                .default_strategy_name(&ctx.source_service, &ctx.target_service);
        }
        match self.strategies.lookup(&ctx.strategy) {
            Ok(factory) => Some(factory()),
            Err(err) => {
                tracing::error!(
                    source = %ctx.source_service,
                    target_service = %ctx.target_service,
                    error = %err,
                    "get strategy [{}] failed",
                    ctx.strategy
                );
                None
            }
        }
    }

    /// Protocol to use when the call requested none: the configured transport
    /// for `target`, then the instance default, then the instance's first
    /// advertised protocol.
    fn default_protocol(&self, target: &str, instance: &ServiceInstance) -> String {
        let preferred = self.config.preferred_transport(target);
        if !preferred.is_empty() {
            return preferred;
        }
        if let Some(protocol) = instance.default_protocol.as_deref().filter(|p| !p.is_empty()) {
            return protocol.to_string();
        }
        instance.endpoints.keys().next().cloned().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
