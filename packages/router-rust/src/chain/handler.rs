use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use waypoint_core::{CallContext, Response};

/// Future returned by [`Chain::next`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Response> + Send + 'a>>;

// ---------------------------------------------------------------------------
// Handler trait
// ---------------------------------------------------------------------------

/// One processing step of a call.
///
/// A handler either produces the response itself or hands the call on with
/// [`Chain::next`] and post-processes what comes back. Whatever it returns is
/// the single response for this step.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Stable name used in handler chain configuration.
    fn name(&self) -> &'static str;

    async fn handle(&self, chain: &mut Chain, ctx: &mut CallContext) -> Response;
}

// ---------------------------------------------------------------------------
// ChainTemplate
// ---------------------------------------------------------------------------

/// Immutable, shareable ordered handler list. Each call gets its own
/// [`Chain`] cursor over it.
#[derive(Clone)]
pub struct ChainTemplate {
    handlers: Arc<[Arc<dyn Handler>]>,
}

impl ChainTemplate {
    #[must_use]
    pub fn new(handlers: Vec<Arc<dyn Handler>>) -> Self {
        Self {
            handlers: handlers.into(),
        }
    }

    /// Fresh chain positioned at the first handler.
    #[must_use]
    pub fn chain(&self) -> Chain {
        Chain {
            handlers: self.handlers.clone(),
            position: 0,
        }
    }

    /// Handler names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs `ctx` through a fresh chain.
    pub async fn invoke(&self, ctx: &mut CallContext) -> Response {
        self.chain().next(ctx).await
    }
}

impl fmt::Debug for ChainTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainTemplate")
            .field("handlers", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Per-call cursor over a [`ChainTemplate`].
///
/// `position` is the index of the handler the next [`Chain::next`] call runs.
/// A handler that re-runs the rest of the chain (retries) captures the
/// position before the first attempt and restores it with
/// [`Chain::reset_to`] before every later one.
pub struct Chain {
    handlers: Arc<[Arc<dyn Handler>]>,
    position: usize,
}

impl Chain {
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn reset_to(&mut self, position: usize) {
        self.position = position;
    }

    /// Runs the handler at the current position and advances past it.
    ///
    /// Past the last handler the chain resolves to an empty response.
    pub fn next<'a>(&'a mut self, ctx: &'a mut CallContext) -> HandlerFuture<'a> {
        let Some(handler) = self.handlers.get(self.position).cloned() else {
            return Box::pin(async { Response::default() });
        };
        self.position += 1;
        Box::pin(async move { handler.handle(self, ctx).await })
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.handlers.len())
            .field("position", &self.position)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
