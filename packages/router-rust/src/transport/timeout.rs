//! Timeout and cancellation middleware for transport calls.
//!
//! A call fails with `InvocationError::Timeout` once it exceeds its deadline
//! (`ctx.timeout`, else the layer default), and with
//! `InvocationError::Cancelled` as soon as its cancellation token fires.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};
use waypoint_core::{CallContext, InvocationError, Response};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer enforcing per-call deadlines and cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutLayer {
    default_timeout: Option<Duration>,
}

impl TimeoutLayer {
    /// `default_timeout` applies to calls that carry no timeout of their own.
    #[must_use]
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            default_timeout: self.default_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    default_timeout: Option<Duration>,
}

impl<S> Service<CallContext> for TimeoutService<S>
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
        let timeout = ctx.timeout.or(self.default_timeout);
        let cancel = ctx.cancel.clone();
        let fut = self.inner.call(ctx);
        Box::pin(async move {
            let guarded = async move {
                tokio::select! {
                    result = fut => result,
                    () = cancel.cancelled() => Err(InvocationError::Cancelled),
                }
            };
            let Some(duration) = timeout else {
                return guarded.await;
            };
            match tokio::time::timeout(duration, guarded).await {
                Ok(result) => result,
                Err(_elapsed) => Err(InvocationError::Timeout {
                    timeout_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;

    /// Service that takes a configurable delay before responding.
    #[derive(Clone)]
    struct SlowService {
        delay_ms: u64,
    }

    impl Service<CallContext> for SlowService {
        type Response = Response;
        type Error = InvocationError;
        type Future = Pin<Box<dyn Future<Output = Result<Response, InvocationError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _ctx: CallContext) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(Response::ok("slow"))
            })
        }
    }

    fn ctx(timeout_ms: Option<u64>) -> CallContext {
        let ctx = CallContext::new("gw", "orders");
        match timeout_ms {
            Some(ms) => ctx.with_timeout(Duration::from_millis(ms)),
            None => ctx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_within_deadline() {
        let svc = TimeoutLayer::default().layer(SlowService { delay_ms: 10 });
        let resp = svc.oneshot(ctx(Some(1_000))).await.unwrap();
        assert!(resp.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn call_timeout_overrides_default() {
        let svc = TimeoutLayer::new(Some(Duration::from_secs(60)))
            .layer(SlowService { delay_ms: 500 });
        let err = svc.oneshot(ctx(Some(100))).await.unwrap_err();
        assert!(matches!(err, InvocationError::Timeout { timeout_ms: 100 }));
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_applies_without_call_timeout() {
        let svc = TimeoutLayer::new(Some(Duration::from_millis(50)))
            .layer(SlowService { delay_ms: 500 });
        let err = svc.oneshot(ctx(None)).await.unwrap_err();
        assert!(matches!(err, InvocationError::Timeout { timeout_ms: 50 }));
    }

    #[tokio::test(start_paused = true)]
    async fn no_deadline_waits_for_completion() {
        let svc = TimeoutLayer::default().layer(SlowService { delay_ms: 5_000 });
        assert!(svc.oneshot(ctx(None)).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn cancellation_aborts_call() {
        let svc = TimeoutLayer::default().layer(SlowService { delay_ms: 60_000 });
        let call = ctx(None);
        call.cancel.cancel();
        let err = svc.oneshot(call).await.unwrap_err();
        assert!(matches!(err, InvocationError::Cancelled));
    }
}
