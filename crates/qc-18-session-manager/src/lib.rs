//! # qc-18-session-manager
//!
//! Session Manager: gives two flows an ordered, deduplicated, exactly-once
//! message stream on top of an at-least-once, possibly reordering log.
//!
//! ## Overview
//!
//! This subsystem provides:
//! - **Dedup/Reorder Engine**: pure sequencing decision per incoming event
//! - **Event Processors**: one handler per event kind and direction
//! - **Outbox**: sent-but-unacknowledged events, retired by Acks, resent on a window
//! - **Session Timeout**: silent sessions are moved to ERROR
//!
//! ## Architecture
//!
//! ```text
//! Flow Engine ──send──→ SessionManager ──FlowMapperEvent──→ Flow Mapper (19) ──→ p2p.out
//!      ↑                     │  ↑
//!      └──── deliver() ──────┘  └──── FlowEvent (inbound) ──── Flow Mapper (19)
//! ```
//!
//! ## Session Lifecycle
//!
//! ```text
//! [CREATED] ──Init acked──→ [CONFIRMED] ──Close sent/received──→ [CLOSING] ──both Closes done──→ [CLOSED]
//!     │                          │                                   │
//!     └──────────────────────────┴───────────── error ───────────────┴──→ [ERROR]
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use qc_18_session_manager::{SessionManagerConfig, SessionManagerService, SessionRecord};
//! use qc_18_session_manager::ports::inbound::SessionManagerApi;
//!
//! let service = SessionManagerService::new(
//!     SessionManagerConfig::from_env(),
//!     store,
//!     log,
//!     flow_engine,
//!     clock,
//! );
//!
//! let published = service
//!     .on_next(vec![SessionRecord::outbound(flow_id, SessionEvent::data(key, now, payload))])
//!     .await?;
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
pub mod key_lock;
pub mod metrics;
pub mod ports;
pub mod service;

pub use config::SessionManagerConfig;
pub use domain::{
    next_deliverable, FlowDelivery, ProcessorContext, ProcessorOutcome, ReceiveEventsState,
    SendEventsState, SequencingState, SessionState, SessionStatus,
};
pub use error::{SessionManagerError, SessionManagerResult};
pub use ports::inbound::{SessionManagerApi, SessionRecord};
pub use ports::outbound::{FlowEngine, SessionStateStore};
pub use service::SessionManagerService;
