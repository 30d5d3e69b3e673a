//! Default selection engine and the collaborators it combines.
//!
//! - [`registry`]: in-memory instance registry
//! - [`filter`]: named instance filters applied before the strategy
//! - [`engine`]: builds per-attempt selection contexts

pub mod engine;
pub mod filter;
pub mod registry;

pub use engine::{DefaultSelection, DefaultSelectionEngine};
pub use filter::{FilterCriteria, FilterRegistry, InstanceFilter, FILTER_PROTOCOL, FILTER_TAGS};
pub use registry::StaticInstanceRegistry;
