//! Domain types and the ports the finder consumes.
//!
//! Nothing in here performs I/O: transports, decoders and inventories are
//! injected through the traits in [`ports`].

pub mod app;
pub mod app_store;
pub mod fingerprint;
pub mod manifest;
pub mod method;
pub mod ports;
