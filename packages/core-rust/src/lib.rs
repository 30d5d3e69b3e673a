//! `Waypoint` core: call context, service instances, responses, errors and the
//! contracts of the router's collaborators.

pub mod args;
pub mod context;
pub mod error;
pub mod instance;
pub mod response;
pub mod selection;
pub mod traits;

pub use args::{CallArgs, CookieJar, HttpRequestArgs, RpcArgs};
pub use context::CallContext;
pub use error::{InvocationError, SelectionError};
pub use instance::ServiceInstance;
pub use response::Response;
pub use selection::{PickRequest, SelectionCriteria};
pub use traits::{
    BackoffPolicy, ConfigProvider, InstanceRegistry, SelectionContext, SelectionEngine, Strategy,
    StrategyFactory,
};

/// Cookie / metadata key carrying the sticky-session token.
pub const LB_SESSION_ID: &str = "lb-session-id";
