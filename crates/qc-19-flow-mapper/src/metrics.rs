//! # Flow Mapper Metrics
//!
//! Enable with the `metrics` feature.
//!
//! - `mapper_events_forwarded_total` - Session events routed to a flow or the transport
//! - `mapper_stray_events_total` - Events with no usable mapper state
//! - `mapper_cleanups_published_total` - Cleanup records published by timers
//! - `mapper_timers_armed_total` / `mapper_timers_cancelled_total`

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, IntCounter};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref EVENTS_FORWARDED: IntCounter = register_int_counter!(
        "mapper_events_forwarded_total",
        "Total number of session events routed by the flow mapper"
    )
    .expect("Failed to create EVENTS_FORWARDED metric");

    pub static ref STRAY_EVENTS: IntCounter = register_int_counter!(
        "mapper_stray_events_total",
        "Total number of events with no usable mapper state"
    )
    .expect("Failed to create STRAY_EVENTS metric");

    pub static ref CLEANUPS_PUBLISHED: IntCounter = register_int_counter!(
        "mapper_cleanups_published_total",
        "Total number of cleanup records published"
    )
    .expect("Failed to create CLEANUPS_PUBLISHED metric");

    pub static ref TIMERS_ARMED: IntCounter = register_int_counter!(
        "mapper_timers_armed_total",
        "Total number of cleanup timers armed"
    )
    .expect("Failed to create TIMERS_ARMED metric");

    pub static ref TIMERS_CANCELLED: IntCounter = register_int_counter!(
        "mapper_timers_cancelled_total",
        "Total number of cleanup timers cancelled before firing"
    )
    .expect("Failed to create TIMERS_CANCELLED metric");
}

#[cfg(feature = "metrics")]
pub fn record_events_forwarded(count: u64) {
    EVENTS_FORWARDED.inc_by(count);
}

#[cfg(feature = "metrics")]
pub fn record_stray_event() {
    STRAY_EVENTS.inc();
}

#[cfg(feature = "metrics")]
pub fn record_cleanup_published() {
    CLEANUPS_PUBLISHED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_timer_armed() {
    TIMERS_ARMED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_timer_cancelled() {
    TIMERS_CANCELLED.inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_events_forwarded(_count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_stray_event() {}

#[cfg(not(feature = "metrics"))]
pub fn record_cleanup_published() {}

#[cfg(not(feature = "metrics"))]
pub fn record_timer_armed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_timer_cancelled() {}
