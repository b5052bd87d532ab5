//! # Node Runtime Library
//!
//! Wiring of a session node: the container that owns the log, the state
//! stores and both services, the adapters that implement their outbound
//! ports, and the long-running handlers. The entry point is `main.rs`.
//!
//! ## Choreography
//!
//! ```text
//! local flow ──submit──→ SessionManager(18) ──→ [flow.mapper.event] ──→ FlowMapper(19)
//!                                                                          │
//!                 ┌──────────────────── [flow.event] ←──── inbound ────────┤
//!                 ↓                                                        │
//!          SessionManager(18) ──deliver──→ FlowInbox          outbound ───→ [p2p.out]
//! ```

// Additional allows to match CI configuration
#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod container;
pub mod handlers;
pub mod runtime;

pub use container::{NodeConfig, SessionContainer};
pub use runtime::NodeRuntime;
