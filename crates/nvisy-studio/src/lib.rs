#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod definition;
pub mod engine;
mod error;
pub mod event;
pub mod module;
pub mod provider;
pub mod report;
pub mod trace;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;

#[doc(hidden)]
pub mod prelude;

pub use error::{Error, Result};

/// Tracing target for studio operations.
pub const TRACING_TARGET: &str = "nvisy_studio";
