//! lexmerge data model — arena document trees and identifier types.

pub mod tree;
pub mod types;
