//! The three-way tree merge and its supporting cast.
//!
//! - **matcher**: per-tag identity rules pairing elements across revisions.
//! - **strategy**: the tag-to-matcher registry consulted during the walk.
//! - **conflict**: structured conflict variants and the sink they report to.
//! - **engine**: the recursive attribute/element/text merge itself.
//!
//! # Determinism guarantee
//!
//! The same three input trees and registry always produce the same merged
//! tree and the same conflict sequence: children are walked in document
//! order, attribute names in stored order, and every tie resolves to the
//! local side. Nothing consults clocks, hashes, or iteration order of
//! unordered containers.

pub mod conflict;
pub mod engine;
pub mod matcher;
pub mod strategy;

pub use conflict::{CollectSink, Conflict, ConflictSink, DiscardSink, LogSink};
pub use engine::{MergeError, merge_trees};
pub use matcher::Matcher;
pub use strategy::{ElementStrategy, StrategyRegistry};
