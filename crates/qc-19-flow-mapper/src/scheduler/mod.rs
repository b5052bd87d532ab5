//! Cleanup scheduling for CLOSING mapper states.

pub mod listener;
pub mod task_state;

pub use listener::CleanupRebalanceListener;
pub use task_state::{ScheduledTaskState, TaskPhase};
