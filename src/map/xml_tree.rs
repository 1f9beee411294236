//! Path-indexed map tree for XML content.
//!
//! Interior nodes are keyed by qualified element names; attribute links
//! hang off their element in a separate list. Leaves carry link
//! descriptors. The tree owns its nodes and range descriptors; a walker
//! tracks the current position while a content stream is parsed.

use crate::error::{Error, Result};
use crate::map::path::{parse_path, Step};
use crate::map::{CellPos, ColT, FieldRef, Link, NodeId, RangeId, RangeReference, RowT, StreamPos};
use crate::ns::{NsId, NsRepository};
use crate::pool::{StrId, StringPool};
use std::collections::HashMap;

/// A linked attribute hanging off an element node.
#[derive(Debug)]
pub struct AttributeLink {
    pub ns: NsId,
    pub name: StrId,
    pub link: Link,
    /// Namespace alias observed for this attribute in the content stream.
    pub alias: StrId,
    /// Byte range of the raw attribute value in the element's recorded
    /// open tag, filled during the content parse. The writer substitutes
    /// this span in place, so unlinked attributes survive verbatim.
    pub value_span: Option<(usize, usize)>,
}

/// One element node of the map tree.
#[derive(Debug)]
pub struct Element {
    pub ns: NsId,
    pub name: StrId,
    pub parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub attributes: Vec<AttributeLink>,
    /// Content link of the element itself, if any.
    pub link: Option<Link>,
    /// Set on the element whose child subtree is re-emitted per row by the
    /// round-trip writer.
    pub range_parent: Option<RangeId>,
    /// Set on the element whose close advances the range's row cursor.
    pub row_group: Option<RangeId>,
    /// Tag positions recorded during the content parse.
    pub stream_pos: StreamPos,
    /// Namespace alias observed for this element in the content stream.
    pub alias: StrId,
}

impl Element {
    fn new(ns: NsId, name: StrId, parent: Option<NodeId>) -> Self {
        Element {
            ns,
            name,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
            link: None,
            range_parent: None,
            row_group: None,
            stream_pos: StreamPos::default(),
            alias: 0,
        }
    }

    /// An element that is not linked itself but carries linked attributes.
    pub fn unlinked_attribute_anchor(&self) -> bool {
        self.link.is_none() && !self.attributes.is_empty()
    }
}

/// Resolved target of a link path.
enum Target {
    Element(NodeId),
    Attribute { node: NodeId, ns: NsId, name: StrId },
}

/// Map tree for XML content streams.
#[derive(Debug)]
pub struct XmlMapTree {
    pool: StringPool,
    aliases: HashMap<String, NsId>,
    default_ns: NsId,
    nodes: Vec<Element>,
    root: Option<NodeId>,
    ranges: Vec<RangeReference>,
    cur_range: Option<RangeId>,
    cur_row_groups: Vec<NodeId>,
}

impl XmlMapTree {
    pub fn new() -> Self {
        XmlMapTree {
            pool: StringPool::new(),
            aliases: HashMap::new(),
            default_ns: NsId::NONE,
            nodes: Vec::new(),
            root: None,
            ranges: Vec::new(),
            cur_range: None,
            cur_row_groups: Vec::new(),
        }
    }

    /// Register a prefix the map paths use. With `default` set, paths with
    /// no prefix also resolve to this namespace.
    pub fn set_namespace_alias(
        &mut self,
        repo: &mut NsRepository,
        alias: &str,
        uri: &str,
        default: bool,
    ) {
        let ns = repo.intern(uri);
        self.aliases.insert(alias.to_string(), ns);
        if default || alias.is_empty() {
            self.default_ns = ns;
        }
    }

    /// Install a single-cell link at `path`.
    pub fn set_cell_link(&mut self, path: &str, sheet: &str, row: RowT, col: ColT) -> Result<()> {
        let pos = self.cell_pos(sheet, row, col);
        match self.linked_target(path)? {
            Target::Element(node) => {
                if self.nodes[node].link.is_some() {
                    return Err(Error::DuplicateLink(path.to_string()));
                }
                self.nodes[node].link = Some(Link::Cell(pos));
            }
            Target::Attribute { node, ns, name } => {
                self.install_attribute(path, node, ns, name, Link::Cell(pos))?;
            }
        }
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
    /// order. `label` overrides the header caption derived from the name.
    pub fn append_field_link(&mut self, path: &str, label: Option<&str>) -> Result<()> {
        let range = self.open_range()?;
        let column = self.ranges[range].field_nodes.len() as ColT;
        let link = Link::RangeField { range, column };

        let field = match self.linked_target(path)? {
            Target::Element(node) => {
                if self.nodes[node].link.is_some() {
                    return Err(Error::DuplicateLink(path.to_string()));
                }
                self.nodes[node].link = Some(link);
                FieldRef::Content(node)
            }
            Target::Attribute { node, ns, name } => {
                let index = self.install_attribute(path, node, ns, name, link)?;
                FieldRef::Attribute(node, index)
            }
        };

        let label = label.map(|s| self.pool.intern(s.as_bytes())).unwrap_or(0);
        let range_ref = &mut self.ranges[range];
        range_ref.field_nodes.push(field);
        range_ref.imported.push(false);
        range_ref.labels.push(label);
        Ok(())
    }

    /// Mark the element whose close advances the open range's row cursor.
    pub fn set_range_row_group(&mut self, path: &str) -> Result<()> {
        let range = self.open_range()?;
        match self.linked_target(path)? {
            Target::Element(node) => {
                self.nodes[node].row_group = Some(range);
                self.cur_row_groups.push(node);
                Ok(())
            }
            Target::Attribute { .. } => Err(Error::BadPath(path.to_string())),
        }
    }

    /// Validate and close the open range.
    pub fn commit_range(&mut self) -> Result<()> {
        let range = self.open_range()?;
        self.cur_range = None;
        let row_groups = std::mem::take(&mut self.cur_row_groups);

        if self.ranges[range].field_nodes.is_empty() {
            return Err(Error::MapDefinition("range has no fields".to_string()));
        }

        // Every row group must enclose every field of its range.
        for &rg in &row_groups {
            for i in 0..self.ranges[range].field_nodes.len() {
                let field_node = self.ranges[range].field_nodes[i].node();
                if !self.is_ancestor_or_self(rg, field_node) {
                    return Err(Error::BadRangeShape(self.node_path(rg)));
                }
            }
        }

        // The writer re-emits the subtree under the range's anchor: the
        // outermost row group, or the common ancestor of all fields.
        let anchor = row_groups
            .iter()
            .copied()
            .min_by_key(|&n| self.depth(n))
            .map_or_else(|| self.common_ancestor(range), Ok)?;
        let parent = self.nodes[anchor]
            .parent
            .ok_or_else(|| Error::BadRangeShape(self.node_path(anchor)))?;
        self.nodes[parent].range_parent = Some(range);
        Ok(())
    }

    /// Start a walker positioned above the root.
    pub fn walker(&self) -> TreeWalker {
        TreeWalker { stack: Vec::new() }
    }

    pub fn node(&self, id: NodeId) -> &Element {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Element {
        &mut self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
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

    pub fn bytes(&self, id: StrId) -> &[u8] {
        self.pool.get(id)
    }

    pub fn intern(&mut self, s: &[u8]) -> StrId {
        self.pool.intern(s)
    }

    fn cell_pos(&mut self, sheet: &str, row: RowT, col: ColT) -> CellPos {
        CellPos { sheet: self.pool.intern(sheet.as_bytes()), row, col }
    }

    fn open_range(&self) -> Result<RangeId> {
        self.cur_range
            .ok_or_else(|| Error::MapDefinition("no range is being defined".to_string()))
    }

    fn install_attribute(
        &mut self,
        path: &str,
        node: NodeId,
        ns: NsId,
        name: StrId,
        link: Link,
    ) -> Result<usize> {
        let elem = &mut self.nodes[node];
        if elem.attributes.iter().any(|a| a.ns == ns && a.name == name) {
            return Err(Error::DuplicateLink(path.to_string()));
        }
        elem.attributes.push(AttributeLink { ns, name, link, alias: 0, value_span: None });
        Ok(elem.attributes.len() - 1)
    }

    /// Resolve a path, creating interior nodes as needed.
    fn linked_target(&mut self, path: &str) -> Result<Target> {
        let steps = parse_path(path)?;
        let mut cursor: Option<NodeId> = None;

        for (i, step) in steps.iter().enumerate() {
            if step.attribute {
                let node = cursor.ok_or_else(|| Error::BadPath(path.to_string()))?;
                let ns = self.resolve_attr_prefix(step, path)?;
                let name = self.pool.intern(step.name.as_bytes());
                return Ok(Target::Attribute { node, ns, name });
            }

            let ns = self.resolve_elem_prefix(step, path)?;
            let name = self.pool.intern(step.name.as_bytes());

            cursor = Some(match cursor {
                None => {
                    // First step names the document root; all paths must
                    // agree on it.
                    match self.root {
                        None => {
                            let id = self.push_node(ns, name, None);
                            self.root = Some(id);
                            id
                        }
                        Some(root) => {
                            let elem = &self.nodes[root];
                            if elem.ns != ns || elem.name != name {
                                return Err(Error::BadPath(path.to_string()));
                            }
                            root
                        }
                    }
                }
                Some(parent) => match self.find_child_by_id(parent, ns, name) {
                    Some(child) => child,
                    None => self.push_node(ns, name, Some(parent)),
                },
            });

            if i == steps.len() - 1 {
                return Ok(Target::Element(cursor.unwrap_or_default()));
            }
        }
        Err(Error::BadPath(path.to_string()))
    }

    fn resolve_elem_prefix(&self, step: &Step<'_>, path: &str) -> Result<NsId> {
        if step.prefix.is_empty() {
            return Ok(self.default_ns);
        }
        self.aliases.get(step.prefix).copied().ok_or_else(|| Error::UnresolvedPrefix {
            prefix: step.prefix.to_string(),
            path: path.to_string(),
        })
    }

    /// Unprefixed attributes live in no namespace; the default namespace
    /// does not apply to them.
    fn resolve_attr_prefix(&self, step: &Step<'_>, path: &str) -> Result<NsId> {
        if step.prefix.is_empty() {
            return Ok(NsId::NONE);
        }
        self.aliases.get(step.prefix).copied().ok_or_else(|| Error::UnresolvedPrefix {
            prefix: step.prefix.to_string(),
            path: path.to_string(),
        })
    }

    fn push_node(&mut self, ns: NsId, name: StrId, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Element::new(ns, name, parent));
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    fn find_child_by_id(&self, parent: NodeId, ns: NsId, name: StrId) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].ns == ns && self.nodes[c].name == name)
    }

    /// Child lookup by raw name bytes, used by the walker.
    pub fn find_child(&self, parent: NodeId, ns: NsId, name: &[u8]) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].ns == ns && self.pool.get(self.nodes[c].name) == name)
    }

    /// Root match by raw name bytes, used by the walker.
    pub fn match_root(&self, ns: NsId, name: &[u8]) -> Option<NodeId> {
        self.root.filter(|&r| {
            let elem = &self.nodes[r];
            elem.ns == ns && self.pool.get(elem.name) == name
        })
    }

    fn depth(&self, mut node: NodeId) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.nodes[node].parent {
            node = parent;
            depth += 1;
        }
        depth
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

    fn common_ancestor(&self, range: RangeId) -> Result<NodeId> {
        let mut nodes = self.ranges[range].field_nodes.iter().map(FieldRef::node);
        let first = nodes
            .next()
            .ok_or_else(|| Error::MapDefinition("range has no fields".to_string()))?;
        Ok(nodes.fold(first, |lca, node| self.lca(lca, node)))
    }

    fn lca(&self, mut a: NodeId, mut b: NodeId) -> NodeId {
        let (mut da, mut db) = (self.depth(a), self.depth(b));
        while da > db {
            a = self.nodes[a].parent.unwrap_or(a);
            da -= 1;
        }
        while db > da {
            b = self.nodes[b].parent.unwrap_or(b);
            db -= 1;
        }
        while a != b {
            match (self.nodes[a].parent, self.nodes[b].parent) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => break,
            }
        }
        a
    }

    /// Slash path of local names down to `node`, for error messages.
    fn node_path(&self, node: NodeId) -> String {
        let mut names = Vec::new();
        let mut cursor = Some(node);
        while let Some(n) = cursor {
            names.push(self.pool.get_str(self.nodes[n].name));
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

/// Cursor over the map tree, mirroring the open-element depth of the
/// input. Unmapped subtrees push sink entries that absorb events until
/// their matching pop.
#[derive(Debug)]
pub struct TreeWalker {
    stack: Vec<Option<NodeId>>,
}

impl TreeWalker {
    /// Descend on an element open; returns the matched node, if any.
    pub fn push_element(&mut self, tree: &XmlMapTree, ns: NsId, name: &[u8]) -> Option<NodeId> {
        let target = if self.stack.is_empty() {
            tree.match_root(ns, name)
        } else {
            self.stack
                .last()
                .copied()
                .flatten()
                .and_then(|n| tree.find_child(n, ns, name))
        };
        self.stack.push(target);
        target
    }

    /// Ascend on an element close; returns the node that becomes current.
    pub fn pop_element(&mut self) -> Option<NodeId> {
        self.stack.pop();
        self.stack.last().copied().flatten()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_default_ns() -> (NsRepository, XmlMapTree) {
        let repo = NsRepository::new();
        let tree = XmlMapTree::new();
        (repo, tree)
    }

    #[test]
    fn test_cell_link_creates_path() {
        let (_repo, mut tree) = tree_with_default_ns();
        tree.set_cell_link("/a/b", "S", 1, 2).unwrap();
        let root = tree.match_root(NsId::NONE, b"a").unwrap();
        let b = tree.find_child(root, NsId::NONE, b"b").unwrap();
        assert!(matches!(tree.node(b).link, Some(Link::Cell(_))));
    }

    #[test]
    fn test_duplicate_cell_link_rejected() {
        let (_repo, mut tree) = tree_with_default_ns();
        tree.set_cell_link("/a/b", "S", 0, 0).unwrap();
        assert!(matches!(
            tree.set_cell_link("/a/b", "S", 1, 1),
            Err(Error::DuplicateLink(_))
        ));
    }

    #[test]
    fn test_mismatched_root_rejected() {
        let (_repo, mut tree) = tree_with_default_ns();
        tree.set_cell_link("/a/b", "S", 0, 0).unwrap();
        assert!(matches!(
            tree.set_cell_link("/other/b", "S", 1, 1),
            Err(Error::BadPath(_))
        ));
    }

    #[test]
    fn test_unresolved_prefix() {
        let (_repo, mut tree) = tree_with_default_ns();
        assert!(matches!(
            tree.set_cell_link("/x:a", "S", 0, 0),
            Err(Error::UnresolvedPrefix { .. })
        ));
    }

    #[test]
    fn test_prefix_resolution() {
        let (mut repo, mut tree) = tree_with_default_ns();
        tree.set_namespace_alias(&mut repo, "p", "urn:p", false);
        tree.set_cell_link("/p:a/p:b", "S", 0, 0).unwrap();
        let p = repo.intern("urn:p");
        assert!(tree.match_root(p, b"a").is_some());
    }

    #[test]
    fn test_default_namespace_applies_to_elements_only() {
        let (mut repo, mut tree) = tree_with_default_ns();
        tree.set_namespace_alias(&mut repo, "d", "urn:d", true);
        tree.start_range("S", 0, 0).unwrap();
        tree.append_field_link("/r/it/@n", None).unwrap();
        let d = repo.intern("urn:d");
        let root = tree.match_root(d, b"r").unwrap();
        let it = tree.find_child(root, d, b"it").unwrap();
        assert_eq!(tree.node(it).attributes[0].ns, NsId::NONE);
    }

    #[test]
    fn test_range_fields_and_row_group() {
        let (_repo, mut tree) = tree_with_default_ns();
        tree.start_range("S", 0, 0).unwrap();
        tree.append_field_link("/items/item/name", None).unwrap();
        tree.append_field_link("/items/item/price", None).unwrap();
        tree.set_range_row_group("/items/item").unwrap();
        tree.commit_range().unwrap();

        assert_eq!(tree.range(0).field_nodes.len(), 2);
        let root = tree.match_root(NsId::NONE, b"items").unwrap();
        let item = tree.find_child(root, NsId::NONE, b"item").unwrap();
        assert_eq!(tree.node(item).row_group, Some(0));
        // The writer's re-emission anchor is the row group's parent.
        assert_eq!(tree.node(root).range_parent, Some(0));
    }

    #[test]
    fn test_row_group_must_enclose_fields() {
        let (_repo, mut tree) = tree_with_default_ns();
        tree.start_range("S", 0, 0).unwrap();
        tree.append_field_link("/r/a/x", None).unwrap();
        tree.set_range_row_group("/r/b").unwrap();
        assert!(matches!(tree.commit_range(), Err(Error::BadRangeShape(_))));
    }

    #[test]
    fn test_field_outside_open_range_rejected() {
        let (_repo, mut tree) = tree_with_default_ns();
        assert!(matches!(
            tree.append_field_link("/a/b", None),
            Err(Error::MapDefinition(_))
        ));
    }

    #[test]
    fn test_walker_descends_and_sinks() {
        let (_repo, mut tree) = tree_with_default_ns();
        tree.set_cell_link("/a/b", "S", 0, 0).unwrap();

        let mut walker = tree.walker();
        let a = walker.push_element(&tree, NsId::NONE, b"a");
        assert!(a.is_some());
        // Unmapped child sinks; its own children stay sunk.
        assert!(walker.push_element(&tree, NsId::NONE, b"zz").is_none());
        assert!(walker.push_element(&tree, NsId::NONE, b"b").is_none());
        walker.pop_element();
        walker.pop_element();
        let b = walker.push_element(&tree, NsId::NONE, b"b");
        assert!(b.is_some());
    }
}
