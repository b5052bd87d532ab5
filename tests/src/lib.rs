//! # Quantum-Chain Session Test Suite
//!
//! Cross-crate choreography between two nodes, each running a session
//! manager (qc-18) and a flow mapper (qc-19) over its own in-memory log.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs                 # Two-node network with a controllable transport
//!     ├── session_choreography.rs    # Open, exchange, reorder, resend, stray events
//!     └── cleanup_choreography.rs    # Close, scheduled cleanup, rebalance safety
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qc-tests
//! cargo test -p qc-tests integration::cleanup_choreography
//! ```

pub mod integration;
