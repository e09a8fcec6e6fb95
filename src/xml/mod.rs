//! Reading and writing the lexicon XML dialect.

pub mod read;
pub mod write;

pub use read::{ParseError, parse_document};
pub use write::{write_document, write_node};
