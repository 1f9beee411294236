//! Error types shared across the crate.
//!
//! Parse errors carry the byte offset at which they were detected so the
//! CLI tools can show the offending spot in the input.

use thiserror::Error;

/// Main error type for tabula operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed XML input
    #[error("malformed XML at offset {offset}: {msg}")]
    MalformedXml { msg: String, offset: usize },

    /// Structural XML error (e.g. a bad numeric character reference)
    #[error("XML structure error at offset {offset}: {msg}")]
    XmlStructure { msg: String, offset: usize },

    /// JSON parse error
    #[error("JSON parse error at offset {offset}: {msg}")]
    JsonParse { msg: String, offset: usize },

    /// Map definition is structurally invalid
    #[error("invalid map definition: {0}")]
    MapDefinition(String),

    /// A map path references a prefix with no registered namespace alias
    #[error("unresolved namespace prefix '{prefix}' in path '{path}'")]
    UnresolvedPrefix { prefix: String, path: String },

    /// A map path could not be parsed
    #[error("invalid link path '{0}'")]
    BadPath(String),

    /// A range's row-group node is not an ancestor of all of its fields
    #[error("row group '{0}' does not enclose every field of its range")]
    BadRangeShape(String),

    /// Two links were installed on the same path
    #[error("duplicate link on path '{0}'")]
    DuplicateLink(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn malformed_xml(msg: impl Into<String>, offset: usize) -> Self {
        Error::MalformedXml { msg: msg.into(), offset }
    }

    pub(crate) fn xml_structure(msg: impl Into<String>, offset: usize) -> Self {
        Error::XmlStructure { msg: msg.into(), offset }
    }

    pub(crate) fn json_parse(msg: impl Into<String>, offset: usize) -> Self {
        Error::JsonParse { msg: msg.into(), offset }
    }

    /// Byte offset associated with this error, if it is a parse error.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::MalformedXml { offset, .. }
            | Error::XmlStructure { offset, .. }
            | Error::JsonParse { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

/// Result type for tabula operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Render a one-line excerpt of `input` around `offset`, with a caret
/// marker underneath. Used by the CLI tools when reporting parse errors.
pub fn error_excerpt(input: &[u8], offset: usize) -> String {
    let offset = offset.min(input.len());
    let line_start = input[..offset]
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    let line_end = input[offset..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| offset + p)
        .unwrap_or(input.len());

    // Clamp very long lines to a window around the offset.
    let window = 76;
    let (start, end) = if line_end - line_start <= window {
        (line_start, line_end)
    } else {
        let half = window / 2;
        let start = offset.saturating_sub(half).max(line_start);
        (start, (start + window).min(line_end))
    };

    let line = String::from_utf8_lossy(&input[start..end]);
    let caret_pos = offset - start;
    let mut out = String::with_capacity(line.len() * 2 + 2);
    out.push_str(&line);
    out.push('\n');
    for _ in 0..caret_pos {
        out.push(' ');
    }
    out.push('^');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_marks_offset() {
        let input = b"line one\nbad <token here\nline three";
        let excerpt = error_excerpt(input, 13);
        let mut lines = excerpt.lines();
        assert_eq!(lines.next(), Some("bad <token here"));
        assert_eq!(lines.next(), Some("    ^"));
    }

    #[test]
    fn test_excerpt_clamps_to_input() {
        let excerpt = error_excerpt(b"ab", 100);
        assert!(excerpt.ends_with('^'));
    }

    #[test]
    fn test_offset_accessor() {
        let err = Error::malformed_xml("x", 42);
        assert_eq!(err.offset(), Some(42));
        assert_eq!(Error::BadPath("p".into()).offset(), None);
    }
}
