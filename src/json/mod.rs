//! Streaming JSON parser, value tree, and structure analyzer.

pub mod parser;
pub mod structure;
pub mod tree;

pub use parser::{JsonHandler, JsonParser};
pub use tree::JsonValue;
