//! Waypoint router: a handler chain for outbound calls whose load-balancing
//! step selects an endpoint per call and retries the rest of the chain,
//! switching instances between rounds.

pub mod backoff;
pub mod balancer;
pub mod chain;
pub mod config;
pub mod invoker;
pub mod selection;
pub mod strategy;
pub mod telemetry;
pub mod transport;

pub use balancer::{EndpointSelector, LoadBalanceHandler, RetryOrchestrator, RetryPolicy};
pub use chain::{Chain, ChainTemplate, Handler, HandlerRegistry};
pub use config::{RouterConfig, SharedConfig};
pub use invoker::{Invoker, InvokerBuilder};
pub use strategy::StrategyRegistry;
