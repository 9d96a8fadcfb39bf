//! Batch processing

pub mod orchestrator;

pub use orchestrator::{run, PipelineResult};
