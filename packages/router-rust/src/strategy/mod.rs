//! Selection strategies and the name -> factory registry.
//!
//! - [`registry`]: process-wide strategy lookup by name
//! - [`builtin`]: round robin, random and session stickiness

pub mod builtin;
pub mod registry;

pub use builtin::{
    RandomStrategy, RoundRobinStrategy, SessionBinding, SessionStickinessStrategy, SessionStore,
    DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_TTL,
};
pub use registry::StrategyRegistry;

pub const STRATEGY_ROUND_ROBIN: &str = "RoundRobin";
pub const STRATEGY_RANDOM: &str = "Random";
pub const STRATEGY_SESSION_STICKINESS: &str = "SessionStickiness";
