//! # Event Handlers
//!
//! Long-running tasks of a session node: one pipeline per input topic and
//! the housekeeping sweep.

pub mod housekeeping;
pub mod pipeline;

pub use housekeeping::{Housekeeper, SweepReport};
pub use pipeline::{
    BatchHandler, MapperHandler, PipelineError, SessionHandler, SharedAssignment, TopicPipeline,
};
