//! App - wiring and orchestration.
//!
//! - PipelineBuilder: validates settings and wires both queues
//! - Pipeline: lifecycle events in, uploads and notifications out
//! - PipelineStatus: what is pending, delivered, abandoned

pub mod builder;
pub mod pipeline;
pub mod status;

pub use self::builder::PipelineBuilder;
pub use self::pipeline::{Pipeline, SessionPaths};
pub use self::status::PipelineStatus;
