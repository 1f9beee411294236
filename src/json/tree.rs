//! Small JSON value tree built on the event parser.
//!
//! Map-definition files load through this tree, and the converter CLI
//! modes re-serialize it. Object key order is preserved.

use super::parser::{JsonHandler, JsonParser};
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::fmt::Write as _;

/// A parsed JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<JsonValue>),
    Object(Vec<(String, JsonValue)>),
}

impl JsonValue {
    /// Parse a complete document.
    pub fn parse(input: &[u8]) -> Result<JsonValue> {
        let mut builder = TreeBuilder::default();
        JsonParser::new(input, &mut builder).parse()?;
        builder
            .root
            .ok_or_else(|| Error::json_parse("empty document", 0))
    }

    /// Member lookup on an object.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        match self {
            JsonValue::Object(members) => {
                members.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsonValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsonValue]> {
        match self {
            JsonValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Re-serialize with four-space indentation.
    pub fn dump_json(&self) -> String {
        let mut out = String::new();
        self.dump_value(&mut out, 0);
        out
    }

    fn dump_value(&self, out: &mut String, level: usize) {
        match self {
            JsonValue::Null => out.push_str("null"),
            JsonValue::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            JsonValue::Number(v) => {
                let _ = write!(out, "{v}");
            }
            JsonValue::String(s) => dump_string_json(out, s),
            JsonValue::Array(items) => {
                out.push_str("[\n");
                for (i, item) in items.iter().enumerate() {
                    indent(out, level + 1);
                    item.dump_value(out, level + 1);
                    if i + 1 < items.len() {
                        out.push(',');
                    }
                    out.push('\n');
                }
                indent(out, level);
                out.push(']');
            }
            JsonValue::Object(members) => {
                out.push_str("{\n");
                for (i, (key, value)) in members.iter().enumerate() {
                    indent(out, level + 1);
                    dump_string_json(out, key);
                    out.push_str(": ");
                    value.dump_value(out, level + 1);
                    if i + 1 < members.len() {
                        out.push(',');
                    }
                    out.push('\n');
                }
                indent(out, level);
                out.push('}');
            }
        }
    }

    /// Convert to the XML rendition used by the converter: objects become
    /// `<object><item name="...">`, arrays `<array><item>`, scalars
    /// self-closing value elements.
    pub fn dump_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\"?>\n");
        self.dump_value_xml(&mut out);
        out.push('\n');
        out
    }

    fn dump_value_xml(&self, out: &mut String) {
        match self {
            JsonValue::Null => out.push_str("<null/>"),
            JsonValue::Bool(true) => out.push_str("<true/>"),
            JsonValue::Bool(false) => out.push_str("<false/>"),
            JsonValue::Number(v) => {
                let _ = write!(out, "<number value=\"{v}\"/>");
            }
            JsonValue::String(s) => {
                out.push_str("<string value=\"");
                dump_string_xml(out, s);
                out.push_str("\"/>");
            }
            JsonValue::Array(items) => {
                out.push_str("<array>");
                for item in items {
                    out.push_str("<item>");
                    item.dump_value_xml(out);
                    out.push_str("</item>");
                }
                out.push_str("</array>");
            }
            JsonValue::Object(members) => {
                out.push_str("<object>");
                for (key, value) in members {
                    out.push_str("<item name=\"");
                    dump_string_xml(out, key);
                    out.push_str("\">");
                    value.dump_value_xml(out);
                    out.push_str("</item>");
                }
                out.push_str("</object>");
            }
        }
    }

    /// Flat line-per-leaf dump: `$.path = value`.
    pub fn dump_check(&self) -> String {
        let mut out = String::new();
        self.dump_check_value(&mut out, "$");
        out
    }

    fn dump_check_value(&self, out: &mut String, path: &str) {
        match self {
            JsonValue::Null => {
                let _ = writeln!(out, "{path} = null");
            }
            JsonValue::Bool(b) => {
                let _ = writeln!(out, "{path} = {b}");
            }
            JsonValue::Number(v) => {
                let _ = writeln!(out, "{path} = {v}");
            }
            JsonValue::String(s) => {
                let _ = writeln!(out, "{path} = {s}");
            }
            JsonValue::Array(items) => {
                if items.is_empty() {
                    let _ = writeln!(out, "{path} = []");
                }
                for (i, item) in items.iter().enumerate() {
                    item.dump_check_value(out, &format!("{path}[{i}]"));
                }
            }
            JsonValue::Object(members) => {
                if members.is_empty() {
                    let _ = writeln!(out, "{path} = {{}}");
                }
                for (key, value) in members {
                    value.dump_check_value(out, &format!("{path}.{key}"));
                }
            }
        }
    }
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("    ");
    }
}

fn dump_string_json(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn dump_string_xml(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
}

/// Event handler assembling the value tree.
#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Slot>,
    root: Option<JsonValue>,
}

enum Slot {
    Array(Vec<JsonValue>),
    Object(Vec<(String, JsonValue)>, Option<String>),
}

impl TreeBuilder {
    fn attach(&mut self, value: JsonValue) {
        match self.stack.last_mut() {
            None => self.root = Some(value),
            Some(Slot::Array(items)) => items.push(value),
            Some(Slot::Object(members, key)) => {
                members.push((key.take().unwrap_or_default(), value));
            }
        }
    }
}

impl<'a> JsonHandler<'a> for TreeBuilder {
    fn begin_array(&mut self) {
        self.stack.push(Slot::Array(Vec::new()));
    }

    fn end_array(&mut self) {
        if let Some(Slot::Array(items)) = self.stack.pop() {
            self.attach(JsonValue::Array(items));
        }
    }

    fn begin_object(&mut self) {
        self.stack.push(Slot::Object(Vec::new(), None));
    }

    fn object_key(&mut self, key: Cow<'a, [u8]>) {
        if let Some(Slot::Object(_, pending)) = self.stack.last_mut() {
            *pending = Some(String::from_utf8_lossy(&key).into_owned());
        }
    }

    fn end_object(&mut self) {
        if let Some(Slot::Object(members, _)) = self.stack.pop() {
            self.attach(JsonValue::Object(members));
        }
    }

    fn boolean(&mut self, value: bool) {
        self.attach(JsonValue::Bool(value));
    }

    fn null(&mut self) {
        self.attach(JsonValue::Null);
    }

    fn string(&mut self, value: Cow<'a, [u8]>) {
        self.attach(JsonValue::String(String::from_utf8_lossy(&value).into_owned()));
    }

    fn number(&mut self, value: f64) {
        self.attach(JsonValue::Number(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_key_order() {
        let doc = JsonValue::parse(br#"{"z":1,"a":2}"#).unwrap();
        match &doc {
            JsonValue::Object(members) => {
                assert_eq!(members[0].0, "z");
                assert_eq!(members[1].0, "a");
            }
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_get_and_accessors() {
        let doc = JsonValue::parse(br#"{"a":{"b":42},"c":[1,2]}"#).unwrap();
        assert_eq!(doc.get("a").and_then(|a| a.get("b")).and_then(JsonValue::as_f64), Some(42.0));
        assert_eq!(doc.get("c").and_then(JsonValue::as_array).map(<[_]>::len), Some(2));
    }

    #[test]
    fn test_dump_json_roundtrip() {
        let doc = JsonValue::parse(br#"{"a":[1,true,null,"x\ny"]}"#).unwrap();
        let dumped = doc.dump_json();
        let reparsed = JsonValue::parse(dumped.as_bytes()).unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn test_dump_xml_shapes() {
        let doc = JsonValue::parse(br#"{"a":[1,"x<y"]}"#).unwrap();
        let xml = doc.dump_xml();
        assert!(xml.starts_with("<?xml version=\"1.0\"?>\n"));
        assert!(xml.contains("<object><item name=\"a\"><array>"));
        assert!(xml.contains("<number value=\"1\"/>"));
        assert!(xml.contains("<string value=\"x&lt;y\"/>"));
    }

    #[test]
    fn test_dump_check_paths() {
        let doc = JsonValue::parse(br#"{"rows":[{"k":"x"},{"k":"y"}]}"#).unwrap();
        let flat = doc.dump_check();
        assert!(flat.contains("$.rows[0].k = x"));
        assert!(flat.contains("$.rows[1].k = y"));
    }
}
