//! Domain module for the Flow Mapper
//!
//! - state: routing record per session key
//! - record_factory: destinations, error wrapping, cleanup records
//! - processor: one pure step per mapper event

pub mod processor;
pub mod record_factory;
pub mod state;

pub use processor::{process_mapper_event, MapperContext, MapperOutcome, StateChange};
pub use record_factory::{create_cleanup_record, forward_error, forward_event, send_back_error};
pub use state::{FlowMapperState, FlowMapperStatus};
