use async_trait::async_trait;
use waypoint_core::{CallContext, Response};

use super::endpoint::EndpointSelector;
use super::retry::{RetryOrchestrator, RetryPolicy};
use crate::chain::{Chain, Handler};

/// Name of the load-balancing handler in handler chain configuration.
pub const LOADBALANCE_HANDLER: &str = "loadbalancer";

// ---------------------------------------------------------------------------
// LoadBalanceHandler
// ---------------------------------------------------------------------------

/// Chain step that picks the endpoint for a call and supervises retries of
/// the remaining steps.
///
/// With retries disabled for the (source, target) pair, the call is selected
/// once and the rest of the chain runs once. Otherwise the
/// [`RetryOrchestrator`] drives rounds and attempts under the pair's
/// configured limits and backoff.
#[derive(Clone)]
pub struct LoadBalanceHandler {
    selector: EndpointSelector,
    orchestrator: RetryOrchestrator,
}

impl LoadBalanceHandler {
    #[must_use]
    pub fn new(selector: EndpointSelector) -> Self {
        Self {
            orchestrator: RetryOrchestrator::new(selector.clone()),
            selector,
        }
    }

    async fn handle_without_retry(&self, chain: &mut Chain, ctx: &mut CallContext) -> Response {
        match self.selector.select(ctx) {
            Ok(endpoint) => {
                ctx.endpoint = endpoint;
                chain.next(ctx).await
            }
            Err(err) => Response::from_error(err),
        }
    }

    async fn handle_with_retry(&self, chain: &mut Chain, ctx: &mut CallContext) -> Response {
        let config = self.selector.config();
        let policy = RetryPolicy::from_config(config.as_ref(), &ctx.source_service, &ctx.target_service);
        let backoff = config.backoff_policy(&ctx.source_service, &ctx.target_service);
        self.orchestrator
            .run(chain, ctx, policy, backoff.as_ref())
            .await
    }
}

#[async_trait]
impl Handler for LoadBalanceHandler {
    fn name(&self) -> &'static str {
        LOADBALANCE_HANDLER
    }

    async fn handle(&self, chain: &mut Chain, ctx: &mut CallContext) -> Response {
        if self
            .selector
            .config()
            .retry_enabled(&ctx.source_service, &ctx.target_service)
        {
            self.handle_with_retry(chain, ctx).await
        } else {
            self.handle_without_retry(chain, ctx).await
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
