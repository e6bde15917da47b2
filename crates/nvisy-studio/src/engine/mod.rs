//! Node compilation and single-node execution.
//!
//! - [`NodeCompiler`]: turns a node into an executable module
//! - [`Engine`]: runs one node and streams its lifecycle events
//! - [`StudioService`]: dispatches client commands to the engine
//! - [`EngineConfig`]: configuration options

mod compiler;
mod config;
mod executor;
mod service;

pub use compiler::NodeCompiler;
pub use config::{
    DEFAULT_ENVIRONMENT, DEFAULT_MAX_CONCURRENT_EXECUTIONS, DEFAULT_PLATFORM, EngineConfig,
    EngineConfigBuilder, EngineConfigBuilderError,
};
pub use executor::Engine;
pub use service::StudioService;
