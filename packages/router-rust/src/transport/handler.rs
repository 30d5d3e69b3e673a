use async_trait::async_trait;
use parking_lot::Mutex;
use tower::{Service, ServiceExt};
use waypoint_core::{CallContext, InvocationError, Response};

use super::router::TransportService;
use crate::chain::{Chain, Handler};

/// Name of the transport handler in handler chain configuration.
pub const TRANSPORT_HANDLER: &str = "transport";

// ---------------------------------------------------------------------------
// TransportHandler
// ---------------------------------------------------------------------------

/// Terminal chain step: sends the call to `ctx.endpoint` through a tower
/// transport service and turns the outcome into the step's [`Response`].
///
/// The service is cloned per call so concurrent calls never wait on each
/// other's readiness.
pub struct TransportHandler<S = TransportService> {
    service: Mutex<S>,
}

impl<S> TransportHandler<S> {
    #[must_use]
    pub fn new(service: S) -> Self {
        Self {
            service: Mutex::new(service),
        }
    }
}

#[async_trait]
impl<S> Handler for TransportHandler<S>
where
    S: Service<CallContext, Response = Response, Error = InvocationError> + Clone + Send + 'static,
    S::Future: Send,
{
    fn name(&self) -> &'static str {
        TRANSPORT_HANDLER
    }

    async fn handle(&self, _chain: &mut Chain, ctx: &mut CallContext) -> Response {
        let service = self.service.lock().clone();
        match service.oneshot(ctx.clone()).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(
                    target_service = %ctx.target_service,
                    endpoint = %ctx.endpoint,
                    error = %err,
                    "transport call failed"
                );
                Response::from_error(err)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
