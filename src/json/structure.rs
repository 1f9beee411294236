//! Repetitive-structure analysis of a JSON document.
//!
//! Collapses array positions into `[]` so repeated shapes fold together,
//! then reports each distinct leaf path with its occurrence count. Backs
//! the mapping tool's `structure` mode, whose output is a starting point
//! for writing a map definition by hand.

use super::tree::JsonValue;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Distinct leaf paths of a document with occurrence counts.
#[derive(Debug, Default)]
pub struct StructureTree {
    leaves: BTreeMap<String, usize>,
}

impl StructureTree {
    /// Analyze a parsed document.
    pub fn analyze(doc: &JsonValue) -> Self {
        let mut tree = StructureTree::default();
        tree.walk(doc, "$");
        tree
    }

    fn walk(&mut self, value: &JsonValue, path: &str) {
        match value {
            JsonValue::Array(items) => {
                if items.is_empty() {
                    self.record(format!("{path}[]"));
                }
                for item in items {
                    self.walk(item, &format!("{path}[]"));
                }
            }
            JsonValue::Object(members) => {
                if members.is_empty() {
                    self.record(format!("{path}{{}}"));
                }
                for (key, member) in members {
                    self.walk(member, &format!("{path}['{key}']"));
                }
            }
            _ => self.record(path.to_string()),
        }
    }

    fn record(&mut self, path: String) {
        *self.leaves.entry(path).or_insert(0) += 1;
    }

    /// One line per distinct path: `path (count: N)`.
    pub fn dump_compact(&self) -> String {
        let mut out = String::new();
        for (path, count) in &self.leaves {
            let _ = writeln!(out, "{path} (count: {count})");
        }
        out
    }

    /// Paths that repeat, candidates for range field links.
    pub fn repeating_paths(&self) -> impl Iterator<Item = (&str, usize)> {
        self.leaves
            .iter()
            .filter(|(_, &count)| count > 1)
            .map(|(path, &count)| (path.as_str(), count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_rows_collapse() {
        let doc = JsonValue::parse(br#"{"rows":[{"k":"x","v":1},{"k":"y","v":2}]}"#).unwrap();
        let tree = StructureTree::analyze(&doc);
        let dump = tree.dump_compact();
        assert!(dump.contains("$['rows'][]['k'] (count: 2)"));
        assert!(dump.contains("$['rows'][]['v'] (count: 2)"));
    }

    #[test]
    fn test_single_leaf() {
        let doc = JsonValue::parse(br#"{"a":{"b":42}}"#).unwrap();
        let tree = StructureTree::analyze(&doc);
        assert_eq!(tree.dump_compact(), "$['a']['b'] (count: 1)\n");
    }

    #[test]
    fn test_repeating_paths_filter() {
        let doc = JsonValue::parse(br#"{"a":1,"rows":[{"k":1},{"k":2}]}"#).unwrap();
        let tree = StructureTree::analyze(&doc);
        let repeating: Vec<_> = tree.repeating_paths().collect();
        assert_eq!(repeating, vec![("$['rows'][]['k']", 2)]);
    }
}
