//! Per-attempt instrumentation for transport calls: a `tracing` span plus
//! `metrics` counters and a duration histogram.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use waypoint_core::{CallContext, InvocationError, Response};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Records duration and outcome of every transport call.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<CallContext> for MetricsService<S>
where
    S: Service<CallContext, Response = Response, Error = InvocationError> + Send,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = InvocationError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, InvocationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, ctx: CallContext) -> Self::Future {
        let target = ctx.target_service.clone();
        let protocol = ctx.protocol.clone();
        let args = ctx.args.as_ref().map_or("none", |args| args.transport());

        let span = info_span!(
            "transport",
            target_service = %target,
            protocol = %protocol,
            args,
            endpoint = %ctx.endpoint,
            trace_id = %ctx.trace_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(ctx);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(InvocationError::Timeout { .. }) => "timeout",
                    Err(InvocationError::Cancelled) => "cancelled",
                    Err(_) => "error",
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::histogram!(
                    "waypoint_transport_duration_seconds",
                    "target" => target.clone(),
                    "protocol" => protocol,
                    "outcome" => outcome
                )
                .record(elapsed.as_secs_f64());

                tracing::debug!(
                    target_service = %target,
                    duration_ms,
                    outcome,
                    "transport call complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;

    /// Completes immediately with a fixed result.
    struct ImmediateService {
        fail: bool,
    }

    impl Service<CallContext> for ImmediateService {
        type Response = Response;
        type Error = InvocationError;
        type Future = Pin<Box<dyn Future<Output = Result<Response, InvocationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, ctx: CallContext) -> Self::Future {
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(InvocationError::downstream(anyhow::anyhow!("refused by {}", ctx.endpoint)))
                } else {
                    Ok(Response::ok("pong").with_status(200))
                }
            })
        }
    }

    #[tokio::test]
    async fn passes_through_response() {
        let svc = MetricsLayer.layer(ImmediateService { fail: false });
        let resp = svc.oneshot(CallContext::new("gw", "orders")).await.unwrap();
        assert_eq!(resp.status, Some(200));
        assert_eq!(resp.body, bytes::Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn passes_through_error() {
        let svc = MetricsLayer.layer(ImmediateService { fail: true });
        let mut ctx = CallContext::new("gw", "orders");
        ctx.endpoint = "a:1".to_string();
        let err = svc.oneshot(ctx).await.unwrap_err();
        assert!(err.to_string().contains("refused by a:1"));
    }
}
