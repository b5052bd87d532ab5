//! # qc-19-flow-mapper
//!
//! Flow Mapper: routes session events between the local flow engine and the
//! counterparty transport, and cleans up routing state once a session ends.
//!
//! ## Overview
//!
//! - **Record Factory**: destination of a forwarded event, error wrapping, cleanup records
//! - **Mapper Processor**: one pure step per `FlowMapperEvent`
//! - **Scheduled Cleanup**: one timer per CLOSING state, reconciled on rebalance
//!
//! ## Architecture
//!
//! ```text
//!                        [flow.mapper.event] (keyed by local session id)
//!                                  │
//!                                  ▼
//!   ┌────────────────────── FlowMapperService ──────────────────────┐
//!   │  store.get → process_mapper_event → store.put → publish       │
//!   │                                          │                    │
//!   │                              on_post_commit                   │
//!   │                                          ▼                    │
//!   │                        ScheduledTaskState (timers)            │
//!   └───────────────┬──────────────────────────┬────────────────────┘
//!                   ▼                          ▼
//!            [flow.event]                 [p2p.out]
//! ```
//!
//! ## Mapper State Lifecycle
//!
//! ```text
//! (none) ──Init──→ [OPEN] ──ScheduleCleanup──→ [CLOSING] ──timer: ExecuteCleanup──→ (tombstone)
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod scheduler;
pub mod service;

pub use config::FlowMapperConfig;
pub use domain::{
    create_cleanup_record, forward_error, forward_event, process_mapper_event, send_back_error,
    FlowMapperState, FlowMapperStatus, MapperContext, MapperOutcome, StateChange,
};
pub use error::{FlowMapperError, FlowMapperResult};
pub use ports::{FlowMapperApi, FlowMapperStateStore};
pub use scheduler::{CleanupRebalanceListener, ScheduledTaskState, TaskPhase};
pub use service::FlowMapperService;
