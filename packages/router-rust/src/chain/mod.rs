//! Handler chain: the ordered processing steps a call passes through.

pub mod handler;
pub mod registry;

pub use handler::{Chain, ChainTemplate, Handler, HandlerFuture};
pub use registry::{ChainError, HandlerFactory, HandlerRegistry};
