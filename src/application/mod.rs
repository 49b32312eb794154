//! Application layer orchestrating payment app resolution.
//!
//! [`finder::PaymentAppFinder`] is the entry point. It screens the installed
//! apps, drives the [`pipeline::ManifestPipeline`] for every URL method the
//! query depends on, and hands the settled manifests to the [`matcher`].

pub mod cancel;
pub mod finder;
pub mod matcher;
pub mod pipeline;
