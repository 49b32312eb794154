//! Adapters implementing the domain ports.

pub mod directory;
#[cfg(feature = "http-transport")]
pub mod http;
pub mod in_memory;
pub mod json_decoder;
