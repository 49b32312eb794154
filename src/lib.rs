//! Decides which installed payment apps may handle a merchant's requested
//! payment methods.
//!
//! The crate follows a ports-and-adapters layout: [`domain`] holds the types
//! and port traits, [`application`] the resolution logic, [`infrastructure`]
//! the transports and decoders, and [`interfaces`] the JSON formats used by
//! the CLI.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
