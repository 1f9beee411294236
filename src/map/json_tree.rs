//! Path-indexed map tree for JSON content.
//!
//! Steps are object keys; arrays are transparent. When the input walks
//! into an array, each element re-enters the node the array matched, so a
//! path `/rows/k` reaches key `k` of every element of the `rows` array. A
//! row group marked on `/rows` therefore advances once per array element.

use crate::error::{Error, Result};
use crate::map::{CellPos, ColT, FieldRef, Link, NodeId, RangeId, RangeReference, RowT};
use crate::pool::{StrId, StringPool};

/// One node of the JSON map tree.
#[derive(Debug)]
pub struct JsonNode {
    /// Object key this node is reached by; 0 for the root.
    pub name: StrId,
    pub parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub link: Option<Link>,
    pub row_group: Option<RangeId>,
}

impl JsonNode {
    fn new(name: StrId, parent: Option<NodeId>) -> Self {
        JsonNode { name, parent, children: Vec::new(), link: None, row_group: None }
    }
}

/// Kind of input construct being pushed onto the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputNode {
    Array,
    Object,
    Value,
}

const ROOT: NodeId = 0;

/// Map tree for JSON content streams.
#[derive(Debug)]
pub struct JsonMapTree {
    pool: StringPool,
    nodes: Vec<JsonNode>,
    ranges: Vec<RangeReference>,
    cur_range: Option<RangeId>,
    cur_row_groups: Vec<NodeId>,
}

impl Default for JsonMapTree {
    fn default() -> Self {
        JsonMapTree::new()
    }
}

impl JsonMapTree {
    pub fn new() -> Self {
        JsonMapTree {
            pool: StringPool::new(),
            nodes: vec![JsonNode::new(0, None)],
            ranges: Vec::new(),
            cur_range: None,
            cur_row_groups: Vec::new(),
        }
    }

    /// Install a single-cell link at `path`.
    pub fn set_cell_link(&mut self, path: &str, sheet: &str, row: RowT, col: ColT) -> Result<()> {
        let pos = self.cell_pos(sheet, row, col);
        let node = self.linked_node(path)?;
        if self.nodes[node].link.is_some() {
            return Err(Error::DuplicateLink(path.to_string()));
        }
        self.nodes[node].link = Some(Link::Cell(pos));
        Ok(())
    }

    /// Open a new range at the given origin.
    pub fn start_range(&mut self, sheet: &str, row: RowT, col: ColT) -> Result<()> {
        if self.cur_range.is_some() {
            return Err(Error::MapDefinition(
                "a range is already being defined".to_string(),
            ));
        }
        let pos = self.cell_pos(sheet, row, col);
        self.cur_range = Some(self.ranges.len());
        self.ranges.push(RangeReference::new(pos));
        Ok(())
    }

    /// Append a field to the open range; fields become columns in call
    /// order.
    pub fn append_field_link(&mut self, path: &str) -> Result<()> {
        let range = self.open_range()?;
        let node = self.linked_node(path)?;
        if self.nodes[node].link.is_some() {
            return Err(Error::DuplicateLink(path.to_string()));
        }
        let column = self.ranges[range].field_nodes.len() as ColT;
        self.nodes[node].link = Some(Link::RangeField { range, column });

        let range_ref = &mut self.ranges[range];
        range_ref.field_nodes.push(FieldRef::Content(node));
        range_ref.imported.push(false);
        range_ref.labels.push(0);
        Ok(())
    }

    /// Mark the node whose close advances the open range's row cursor.
    pub fn set_range_row_group(&mut self, path: &str) -> Result<()> {
        let range = self.open_range()?;
        let node = self.linked_node(path)?;
        self.nodes[node].row_group = Some(range);
        self.cur_row_groups.push(node);
        Ok(())
    }

    /// Validate and close the open range.
    pub fn commit_range(&mut self) -> Result<()> {
        let range = self.open_range()?;
        self.cur_range = None;
        let row_groups = std::mem::take(&mut self.cur_row_groups);

        if self.ranges[range].field_nodes.is_empty() {
            return Err(Error::MapDefinition("range has no fields".to_string()));
        }

        for &rg in &row_groups {
            for i in 0..self.ranges[range].field_nodes.len() {
                let field_node = self.ranges[range].field_nodes[i].node();
                if !self.is_ancestor_or_self(rg, field_node) {
                    return Err(Error::BadRangeShape(self.node_path(rg)));
                }
            }
        }
        Ok(())
    }

    /// Start a walker positioned above the document root.
    pub fn walker(&self) -> JsonTreeWalker {
        JsonTreeWalker {
            stack: Vec::new(),
            containers: Vec::new(),
            pending_key: None,
        }
    }

    pub fn node(&self, id: NodeId) -> &JsonNode {
        &self.nodes[id]
    }

    pub fn range(&self, id: RangeId) -> &RangeReference {
        &self.ranges[id]
    }

    pub fn range_mut(&mut self, id: RangeId) -> &mut RangeReference {
        &mut self.ranges[id]
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn str(&self, id: StrId) -> &str {
        self.pool.get_str(id)
    }

    /// Child lookup by raw key bytes, used by the walker.
    pub fn find_child(&self, parent: NodeId, key: &[u8]) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.pool.get(self.nodes[c].name) == key)
    }

    fn cell_pos(&mut self, sheet: &str, row: RowT, col: ColT) -> CellPos {
        CellPos { sheet: self.pool.intern(sheet.as_bytes()), row, col }
    }

    fn open_range(&self) -> Result<RangeId> {
        self.cur_range
            .ok_or_else(|| Error::MapDefinition("no range is being defined".to_string()))
    }

    /// Resolve a path of object keys, creating nodes as needed.
    fn linked_node(&mut self, path: &str) -> Result<NodeId> {
        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| Error::BadPath(path.to_string()))?;
        if rest.is_empty() {
            return Err(Error::BadPath(path.to_string()));
        }

        let mut cursor = ROOT;
        for raw in rest.split('/') {
            if raw.is_empty() {
                return Err(Error::BadPath(path.to_string()));
            }
            let key = self.pool.intern(raw.as_bytes());
            cursor = match self.find_child_by_id(cursor, key) {
                Some(child) => child,
                None => {
                    let id = self.nodes.len();
                    self.nodes.push(JsonNode::new(key, Some(cursor)));
                    self.nodes[cursor].children.push(id);
                    id
                }
            };
        }
        Ok(cursor)
    }

    fn find_child_by_id(&self, parent: NodeId, key: StrId) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].name == key)
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes[node].parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn node_path(&self, node: NodeId) -> String {
        let mut names = Vec::new();
        let mut cursor = Some(node);
        while let Some(n) = cursor {
            if self.nodes[n].parent.is_some() {
                names.push(self.pool.get_str(self.nodes[n].name));
            }
            cursor = self.nodes[n].parent;
        }
        let mut out = String::new();
        for name in names.iter().rev() {
            out.push('/');
            out.push_str(name);
        }
        out
    }
}

/// Cursor over the JSON map tree, mirroring the nesting of the input.
///
/// Array pushes are transparent: the matched node stays put so the
/// array's elements re-enter the same subtree.
#[derive(Debug)]
pub struct JsonTreeWalker {
    stack: Vec<Option<NodeId>>,
    containers: Vec<InputNode>,
    pending_key: Option<Vec<u8>>,
}

impl JsonTreeWalker {
    /// Record the key of the next value inside the current object.
    pub fn set_object_key(&mut self, key: &[u8]) {
        self.pending_key = Some(key.to_vec());
    }

    /// Descend on an input construct; returns the matched node, if any.
    pub fn push_node(&mut self, tree: &JsonMapTree, kind: InputNode) -> Option<NodeId> {
        let target = if self.stack.is_empty() {
            Some(ROOT)
        } else {
            match self.containers.last() {
                Some(InputNode::Object) => {
                    let key = self.pending_key.take();
                    match (self.stack.last().copied().flatten(), key) {
                        (Some(n), Some(k)) => tree.find_child(n, &k),
                        _ => None,
                    }
                }
                Some(InputNode::Array) => self.stack.last().copied().flatten(),
                _ => None,
            }
        };
        self.stack.push(target);
        self.containers.push(kind);
        target
    }

    /// Ascend on close; returns the node being left.
    pub fn pop_node(&mut self) -> Option<NodeId> {
        self.containers.pop();
        self.stack.pop().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_link() {
        let mut tree = JsonMapTree::new();
        tree.set_cell_link("/a/b", "S", 0, 0).unwrap();
        let a = tree.find_child(ROOT, b"a").unwrap();
        let b = tree.find_child(a, b"b").unwrap();
        assert!(matches!(tree.node(b).link, Some(Link::Cell(_))));
    }

    #[test]
    fn test_duplicate_link_rejected() {
        let mut tree = JsonMapTree::new();
        tree.set_cell_link("/a", "S", 0, 0).unwrap();
        assert!(matches!(
            tree.set_cell_link("/a", "S", 1, 1),
            Err(Error::DuplicateLink(_))
        ));
    }

    #[test]
    fn test_row_group_shape_validation() {
        let mut tree = JsonMapTree::new();
        tree.start_range("S", 0, 0).unwrap();
        tree.append_field_link("/rows/k").unwrap();
        tree.set_range_row_group("/other").unwrap();
        assert!(matches!(tree.commit_range(), Err(Error::BadRangeShape(_))));
    }

    #[test]
    fn test_walker_transparent_arrays() {
        let mut tree = JsonMapTree::new();
        tree.start_range("S", 0, 0).unwrap();
        tree.append_field_link("/rows/k").unwrap();
        tree.set_range_row_group("/rows").unwrap();
        tree.commit_range().unwrap();

        let rows = tree.find_child(ROOT, b"rows").unwrap();
        let k = tree.find_child(rows, b"k").unwrap();

        let mut walker = tree.walker();
        // {"rows":[{"k":...}]}
        assert_eq!(walker.push_node(&tree, InputNode::Object), Some(ROOT));
        walker.set_object_key(b"rows");
        assert_eq!(walker.push_node(&tree, InputNode::Array), Some(rows));
        // Array element re-enters the rows node.
        assert_eq!(walker.push_node(&tree, InputNode::Object), Some(rows));
        walker.set_object_key(b"k");
        assert_eq!(walker.push_node(&tree, InputNode::Value), Some(k));
        assert_eq!(walker.pop_node(), Some(k));
        assert_eq!(walker.pop_node(), Some(rows));
        assert_eq!(walker.pop_node(), Some(rows));
        assert_eq!(walker.pop_node(), Some(ROOT));
    }

    #[test]
    fn test_walker_sinks_unmapped_keys() {
        let mut tree = JsonMapTree::new();
        tree.set_cell_link("/a", "S", 0, 0).unwrap();

        let mut walker = tree.walker();
        walker.push_node(&tree, InputNode::Object);
        walker.set_object_key(b"zz");
        assert_eq!(walker.push_node(&tree, InputNode::Object), None);
        walker.set_object_key(b"a");
        // Inside a sunk subtree nothing matches, even a mapped name.
        assert_eq!(walker.push_node(&tree, InputNode::Value), None);
    }
}
