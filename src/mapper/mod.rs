//! Top-level mapping engines: map definition in, content stream in,
//! spreadsheet sink out (and, for XML, the source stream back out).

pub mod json;
pub mod xml;

pub use json::JsonMapper;
pub use xml::XmlMapper;
