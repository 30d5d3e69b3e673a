//! Pipeline composition: wraps the protocol router in the transport layers.

use std::time::Duration;

use tower::util::BoxCloneService;
use tower::ServiceBuilder;

use super::metrics::MetricsLayer;
use super::router::{ProtocolRouter, TransportService};
use super::timeout::TimeoutLayer;

/// Build the transport pipeline around `router`.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- records every attempt, including timeouts and cancellations
/// 2. `TimeoutLayer` -- per-call deadline, falling back to `default_timeout`, and cancellation
///
/// The result is cheap to clone; each clone shares the registered clients.
#[must_use]
pub fn build_transport_pipeline(
    router: ProtocolRouter,
    default_timeout: Option<Duration>,
) -> TransportService {
    BoxCloneService::new(
        ServiceBuilder::new()
            .layer(MetricsLayer)
            .layer(TimeoutLayer::new(default_timeout))
            .service(router),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
