//! Ports module for the Flow Mapper

pub mod inbound;
pub mod outbound;

pub use inbound::FlowMapperApi;
pub use outbound::FlowMapperStateStore;
