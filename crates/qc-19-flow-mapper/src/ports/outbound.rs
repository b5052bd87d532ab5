//! Driven Ports (SPI - Outbound)

use crate::domain::FlowMapperState;
use shared_bus::KeyedStateStore;

/// Keyed store of mapper states.
pub trait FlowMapperStateStore: KeyedStateStore<FlowMapperState> {}

impl<T> FlowMapperStateStore for T where T: KeyedStateStore<FlowMapperState> + ?Sized {}
