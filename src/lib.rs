//! lexmerge library crate — re-exports for integration tests and embedding.
//!
//! The primary interface is the `lexmerge` binary. This lib.rs exposes the
//! tree model, the merge engine, the document orchestrator, and the fold
//! protocol so integration tests (and other tools) can drive them directly
//! without going through the CLI.

pub mod config;
pub mod document;
pub mod failpoints;
pub mod fold;
pub mod interfaces;
pub mod merge;
pub mod model;
pub mod telemetry;
pub mod xml;
