//! JSON mapping engine: stream mapped values into a spreadsheet sink.
//!
//! Values commit with their JSON types: strings through the shared-string
//! table, numbers and booleans directly, nulls not at all. Row groups
//! advance the range cursor between array elements with the same one-step
//! delay as the XML walker.

use crate::error::{Error, Result};
use crate::json::parser::{JsonHandler, JsonParser};
use crate::json::JsonValue;
use crate::map::json_tree::{InputNode, JsonMapTree, JsonTreeWalker};
use crate::map::{CellPos, ColT, Link, NodeId, RangeId, RowT};
use crate::spreadsheet::ImportFactory;
use log::debug;
use std::borrow::Cow;

/// Maps JSON content streams into a spreadsheet sink.
#[derive(Default)]
pub struct JsonMapper {
    tree: JsonMapTree,
    sheet_count: usize,
}

impl JsonMapper {
    pub fn new() -> Self {
        JsonMapper { tree: JsonMapTree::new(), sheet_count: 0 }
    }

    pub fn set_cell_link(&mut self, path: &str, sheet: &str, row: RowT, col: ColT) -> Result<()> {
        self.tree.set_cell_link(path, sheet, row, col)
    }

    pub fn start_range(&mut self, sheet: &str, row: RowT, col: ColT) -> Result<()> {
        self.tree.start_range(sheet, row, col)
    }

    pub fn append_field_link(&mut self, path: &str) -> Result<()> {
        self.tree.append_field_link(path)
    }

    pub fn set_range_row_group(&mut self, path: &str) -> Result<()> {
        self.tree.set_range_row_group(path)
    }

    pub fn commit_range(&mut self) -> Result<()> {
        self.tree.commit_range()
    }

    pub fn append_sheet(&mut self, factory: &mut dyn ImportFactory, name: &str) {
        if name.is_empty() {
            return;
        }
        factory.append_sheet(self.sheet_count, name);
        self.sheet_count += 1;
    }

    /// Load a JSON map definition: required `sheets`, optional `cells` and
    /// `ranges`. Unknown top-level keys are ignored.
    pub fn read_map_definition(
        &mut self,
        map: &[u8],
        factory: &mut dyn ImportFactory,
    ) -> Result<()> {
        let doc = JsonValue::parse(map)?;

        let sheets = doc
            .get("sheets")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| {
                Error::MapDefinition("map definition must contain a 'sheets' array".to_string())
            })?;
        for sheet in sheets {
            let name = sheet.as_str().ok_or_else(|| {
                Error::MapDefinition("sheet names must be strings".to_string())
            })?;
            self.append_sheet(factory, name);
        }

        if let Some(cells) = doc.get("cells").and_then(JsonValue::as_array) {
            for cell in cells {
                let path = member_str(cell, "path")?;
                let sheet = member_str(cell, "sheet")?;
                let row = member_coord(cell, "row")?;
                let col = member_coord(cell, "column")?;
                self.set_cell_link(path, sheet, row, col)?;
            }
        }

        if let Some(ranges) = doc.get("ranges").and_then(JsonValue::as_array) {
            for range in ranges {
                let sheet = member_str(range, "sheet")?;
                let row = member_coord(range, "row")?;
                let col = member_coord(range, "column")?;
                self.start_range(sheet, row, col)?;

                let fields = range
                    .get("fields")
                    .and_then(JsonValue::as_array)
                    .ok_or_else(|| {
                        Error::MapDefinition("range needs a 'fields' array".to_string())
                    })?;
                for field in fields {
                    self.append_field_link(member_str(field, "path")?)?;
                }

                if let Some(groups) = range.get("row-groups").and_then(JsonValue::as_array) {
                    for group in groups {
                        self.set_range_row_group(member_str(group, "path")?)?;
                    }
                }
                self.commit_range()?;
            }
        }
        Ok(())
    }

    /// Parse a content stream and commit linked values into the sink.
    pub fn read_stream(&mut self, content: &[u8], factory: &mut dyn ImportFactory) -> Result<()> {
        for rid in 0..self.tree.range_count() {
            let range = self.tree.range_mut(rid);
            range.row_size = 0;
            range.reset_imported();
        }

        let walker = self.tree.walker();
        let mut handler = JsonContentHandler {
            tree: &mut self.tree,
            factory,
            walker,
            current: None,
            pending_increment: None,
        };
        JsonParser::new(content, &mut handler).parse()
    }
}

/// A scalar about to be committed.
enum Scalar<'v> {
    Str(&'v [u8]),
    Num(f64),
    Bool(bool),
    Null,
}

/// JSON event handler that feeds the sink during a content parse.
struct JsonContentHandler<'x> {
    tree: &'x mut JsonMapTree,
    factory: &'x mut dyn ImportFactory,
    walker: JsonTreeWalker,
    current: Option<NodeId>,
    pending_increment: Option<RangeId>,
}

impl<'x> JsonContentHandler<'x> {
    fn push(&mut self, kind: InputNode) {
        self.current = self.walker.push_node(self.tree, kind);
        if let Some(node) = self.current {
            if let Some(rg) = self.tree.node(node).row_group {
                // The last closing node was a row-group boundary; advance
                // the row position now that a sibling is opening.
                if self.pending_increment == Some(rg) {
                    self.tree.range_mut(rg).row_size += 1;
                    self.pending_increment = None;
                }
            }

            if kind != InputNode::Value && self.tree.node(node).link.is_some() {
                debug!("discarding container input arriving at a scalar-linked node");
            }
        }
    }

    fn pop(&mut self) {
        if let Some(node) = self.walker.pop_node() {
            if let Some(rg) = self.tree.node(node).row_group {
                self.pending_increment = Some(rg);
            }
        }
        self.current = None;
    }

    fn commit(&mut self, value: Scalar<'_>) {
        let Some(node) = self.current else {
            return;
        };
        let pos = match self.tree.node(node).link {
            Some(Link::Cell(pos)) => pos,
            Some(Link::RangeField { range, column }) => {
                let range_ref = self.tree.range_mut(range);
                if let Some(flag) = range_ref.imported.get_mut(column as usize) {
                    *flag = true;
                }
                CellPos {
                    sheet: range_ref.pos.sheet,
                    row: range_ref.pos.row + range_ref.row_size,
                    col: range_ref.pos.col + column,
                }
            }
            None => return,
        };

        let sheet_name = self.tree.str(pos.sheet);
        match value {
            Scalar::Str(s) => {
                let sid = self.factory.add_shared_string(s);
                if let Some(sheet) = self.factory.get_sheet(sheet_name) {
                    sheet.set_string(pos.row, pos.col, sid);
                }
            }
            Scalar::Num(v) => {
                if let Some(sheet) = self.factory.get_sheet(sheet_name) {
                    sheet.set_value(pos.row, pos.col, v);
                }
            }
            Scalar::Bool(b) => {
                if let Some(sheet) = self.factory.get_sheet(sheet_name) {
                    sheet.set_bool(pos.row, pos.col, b);
                }
            }
            Scalar::Null => {}
        }
    }

    fn scalar(&mut self, value: Scalar<'_>) {
        self.push(InputNode::Value);
        self.commit(value);
        self.pop();
    }
}

impl<'a, 'x> JsonHandler<'a> for JsonContentHandler<'x> {
    fn begin_array(&mut self) {
        self.push(InputNode::Array);
    }

    fn end_array(&mut self) {
        self.pop();
    }

    fn begin_object(&mut self) {
        self.push(InputNode::Object);
    }

    fn object_key(&mut self, key: Cow<'a, [u8]>) {
        self.walker.set_object_key(&key);
    }

    fn end_object(&mut self) {
        self.pop();
    }

    fn boolean(&mut self, value: bool) {
        self.scalar(Scalar::Bool(value));
    }

    fn null(&mut self) {
        self.scalar(Scalar::Null);
    }

    fn string(&mut self, value: Cow<'a, [u8]>) {
        self.scalar(Scalar::Str(&value));
    }

    fn number(&mut self, value: f64) {
        self.scalar(Scalar::Num(value));
    }
}

fn member_str<'v>(value: &'v JsonValue, key: &str) -> Result<&'v str> {
    value
        .get(key)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::MapDefinition(format!("'{key}' must be a string")))
}

fn member_coord(value: &JsonValue, key: &str) -> Result<RowT> {
    let v = value
        .get(key)
        .and_then(JsonValue::as_f64)
        .ok_or_else(|| Error::MapDefinition(format!("'{key}' must be a number")))?;
    if v < 0.0 {
        return Err(Error::MapDefinition(format!("'{key}' must not be negative")));
    }
    Ok(v as RowT)
}
