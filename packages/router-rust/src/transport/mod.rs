//! Transport side of the chain: the terminal handler and the tower stack
//! it calls into.
//!
//! - [`router`]: dispatch by resolved protocol
//! - [`timeout`]: per-call deadline and cancellation
//! - [`metrics`]: per-attempt span, counters and duration histogram
//! - [`pipeline`]: composes the layers around the router
//! - [`handler`]: adapts the pipeline into a chain handler

pub mod handler;
pub mod metrics;
pub mod pipeline;
pub mod router;
pub mod timeout;

pub use handler::{TransportHandler, TRANSPORT_HANDLER};
pub use metrics::MetricsLayer;
pub use pipeline::build_transport_pipeline;
pub use router::{ProtocolRouter, TransportService};
pub use timeout::TimeoutLayer;
