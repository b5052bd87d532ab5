//! Integration tests spanning the session manager and the flow mapper.

#[cfg(test)]
pub(crate) mod harness;

#[cfg(test)]
mod cleanup_choreography;

#[cfg(test)]
mod session_choreography;
