//! External data formats for the command-line entry point.

pub mod json;
