//! courier-core
//!
//! Reliable delivery of session recordings and lifecycle events.
//!
//! # Modules
//! - **domain**: ids, connection context, events, destinations, artifacts
//! - **config**: TOML settings
//! - **resolve**: bucket/key and webhook endpoint resolution
//! - **compress**: gzip/zip stage for finished recordings
//! - **queue**: the in-memory delivery queue with bounded backoff
//! - **sinks**: object storage and webhook clients
//! - **ports** / **impls**: seams (clock, store provider, lifecycle) and their implementations
//! - **app**: builder and pipeline orchestrator

pub mod app;
pub mod compress;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod redact;
pub mod resolve;
pub mod sinks;

#[cfg(test)]
mod testing;

pub use app::{Pipeline, PipelineBuilder, PipelineStatus, SessionPaths};
pub use config::Settings;
pub use error::{CourierError, ErrorKind};
pub use ports::{LifecycleEvent, LifecycleHandler};
