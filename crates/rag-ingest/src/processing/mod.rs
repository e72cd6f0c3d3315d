//! Run orchestration and progress reporting

mod pipeline;
mod report;

pub use pipeline::{IngestionPipeline, PipelineOptions};
pub use report::{Decision, ObjectFailure, ObjectOutcome, ObjectState, RunReport};
