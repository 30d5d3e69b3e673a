//! Load-balancing handler: endpoint selection, session affinity and the
//! nested retry loop.

pub mod endpoint;
pub mod handler;
pub mod retry;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use endpoint::EndpointSelector;
pub use handler::{LoadBalanceHandler, LOADBALANCE_HANDLER};
pub use retry::{RetryOrchestrator, RetryPolicy};
pub use session::session_token;
