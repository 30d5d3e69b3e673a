//! Protocol routing: dispatches a call to the transport client registered
//! for its resolved protocol.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::util::BoxCloneService;
use tower::{Service, ServiceExt};
use waypoint_core::{CallContext, InvocationError, Response};

/// A type-erased transport client.
pub type TransportService = BoxCloneService<CallContext, Response, InvocationError>;

type TransportFuture = Pin<Box<dyn Future<Output = Result<Response, InvocationError>> + Send>>;

// ---------------------------------------------------------------------------
// ProtocolRouter
// ---------------------------------------------------------------------------

/// Routes calls to a transport client by `ctx.protocol` (e.g. `"http"`,
/// `"grpc"`). Calls for a protocol with no registered client fail with
/// `InvocationError::UnsupportedProtocol`.
///
/// Each call drives a clone of the target client to readiness on its own, so
/// the router itself is always ready.
#[derive(Clone, Default)]
pub struct ProtocolRouter {
    clients: HashMap<String, TransportService>,
}

impl ProtocolRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the client for `protocol`, replacing any previous one.
    pub fn register<S>(&mut self, protocol: impl Into<String>, client: S)
    where
        S: Service<CallContext, Response = Response, Error = InvocationError>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.clients
            .insert(protocol.into(), BoxCloneService::new(client));
    }

    /// Builder-style [`ProtocolRouter::register`].
    #[must_use]
    pub fn with<S>(mut self, protocol: impl Into<String>, client: S) -> Self
    where
        S: Service<CallContext, Response = Response, Error = InvocationError>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        self.register(protocol, client);
        self
    }

    /// Registered protocols, sorted.
    #[must_use]
    pub fn protocols(&self) -> Vec<String> {
        let mut protocols: Vec<String> = self.clients.keys().cloned().collect();
        protocols.sort();
        protocols
    }
}

impl Service<CallContext> for ProtocolRouter {
    type Response = Response;
    type Error = InvocationError;
    type Future = TransportFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: CallContext) -> Self::Future {
        match self.clients.get(&ctx.protocol) {
            Some(client) => Box::pin(client.clone().oneshot(ctx)),
            None => {
                let protocol = ctx.protocol;
                Box::pin(async move { Err(InvocationError::UnsupportedProtocol { protocol }) })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Replies with its tag and the endpoint it was asked to reach.
    #[derive(Clone)]
    struct Echo(&'static str);

    impl Service<CallContext> for Echo {
        type Response = Response;
        type Error = InvocationError;
        type Future = TransportFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, ctx: CallContext) -> Self::Future {
            let tag = self.0;
            Box::pin(async move { Ok(Response::ok(format!("{tag}:{}", ctx.endpoint))) })
        }
    }

    fn call(protocol: &str) -> CallContext {
        let mut ctx = CallContext::new("gw", "orders").with_protocol(protocol);
        ctx.endpoint = "a:1".to_string();
        ctx
    }

    #[tokio::test]
    async fn routes_by_protocol() {
        let router = ProtocolRouter::new().with("http", Echo("http")).with("grpc", Echo("grpc"));
        assert_eq!(router.protocols(), vec!["grpc", "http"]);

        let resp = router.clone().oneshot(call("grpc")).await.unwrap();
        assert_eq!(resp.body, bytes::Bytes::from_static(b"grpc:a:1"));
        let resp = router.oneshot(call("http")).await.unwrap();
        assert_eq!(resp.body, bytes::Bytes::from_static(b"http:a:1"));
    }

    #[tokio::test]
    async fn unknown_protocol_is_rejected() {
        let router = ProtocolRouter::new().with("http", Echo("http"));
        let err = router.oneshot(call("highway")).await.unwrap_err();
        assert!(matches!(err, InvocationError::UnsupportedProtocol { protocol } if protocol == "highway"));
    }
}
