//! tabula - structured-document mapping engine
//!
//! Parses XML and JSON streams and loads mapped values into a tabular
//! spreadsheet model through a narrow sink interface:
//!
//! - zero-copy, namespace-aware streaming tokenizers ([`sax`], [`json`])
//! - path-indexed map trees binding input positions to cells and ranges
//!   ([`map`])
//! - map-driven walkers committing values as the parse advances
//!   ([`mapper`])
//! - a round-trip writer that re-emits the source XML with updated cell
//!   values, preserving untouched bytes exactly ([`mapper::xml`])

pub mod core;
pub mod error;
pub mod json;
pub mod map;
pub mod mapper;
pub mod ns;
pub mod pool;
pub mod sax;
pub mod spreadsheet;

pub use error::{error_excerpt, Error, Result};
pub use json::JsonValue;
pub use mapper::{JsonMapper, XmlMapper};
pub use ns::{NsContext, NsId, NsRepository};
pub use pool::StringPool;
pub use spreadsheet::Document;
