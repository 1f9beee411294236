//! XML mapping engine: stream mapped values into a spreadsheet sink, and
//! write the source back with updated values.
//!
//! The import pass walks the map tree alongside the SAX events, committing
//! linked values as elements close and recording the byte positions of
//! linked elements. The export pass replays the input buffer, rewriting
//! only the recorded spans; every byte outside them is copied verbatim.

use crate::error::{Error, Result};
use crate::json::JsonValue;
use crate::map::xml_tree::{TreeWalker, XmlMapTree};
use crate::map::{CellPos, ColT, FieldRef, Link, NodeId, RangeId, RowT, StreamPos};
use crate::ns::{NsId, NsRepository};
use crate::sax::{SaxAttribute, SaxElement, SaxHandler, SaxParser};
use crate::spreadsheet::{ExportFactory, ExportSheet, ImportFactory};
use std::borrow::Cow;
use std::io::{self, Write};

/// Column placeholder written when a row completes with fields missing.
const DEFAULT_FILL: &str = "---";

/// Maps XML content streams into a spreadsheet sink and back.
pub struct XmlMapper<'r> {
    repo: &'r mut NsRepository,
    tree: XmlMapTree,
    sheet_count: usize,
    link_positions: Vec<NodeId>,
    fill_value: String,
}

impl<'r> XmlMapper<'r> {
    pub fn new(repo: &'r mut NsRepository) -> Self {
        XmlMapper {
            repo,
            tree: XmlMapTree::new(),
            sheet_count: 0,
            link_positions: Vec::new(),
            fill_value: DEFAULT_FILL.to_string(),
        }
    }

    /// Register a namespace alias used by map paths.
    pub fn set_namespace_alias(&mut self, alias: &str, uri: &str, default: bool) {
        self.tree.set_namespace_alias(self.repo, alias, uri, default);
    }

    /// Placeholder written into columns a completed row never received.
    pub fn set_fill_value(&mut self, value: &str) {
        self.fill_value = value.to_string();
    }

    pub fn set_cell_link(&mut self, path: &str, sheet: &str, row: RowT, col: ColT) -> Result<()> {
        self.tree.set_cell_link(path, sheet, row, col)
    }

    pub fn start_range(&mut self, sheet: &str, row: RowT, col: ColT) -> Result<()> {
        self.tree.start_range(sheet, row, col)
    }

    pub fn append_field_link(&mut self, path: &str, label: Option<&str>) -> Result<()> {
        self.tree.append_field_link(path, label)
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

    /// Load a JSON map definition (§ map format): `sheets`, `cells`,
    /// `ranges`, plus the XML-only `namespaces` object of alias→URI pairs
    /// (an empty alias sets the default namespace). Unknown top-level keys
    /// are ignored.
    pub fn read_map_definition(
        &mut self,
        map: &[u8],
        factory: &mut dyn ImportFactory,
    ) -> Result<()> {
        let doc = JsonValue::parse(map)?;

        if let Some(JsonValue::Object(members)) = doc.get("namespaces") {
            for (alias, uri) in members {
                let uri = uri.as_str().ok_or_else(|| {
                    Error::MapDefinition("namespace URI must be a string".to_string())
                })?;
                self.set_namespace_alias(alias, uri, alias.is_empty());
            }
        }

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
                let (path, sheet, row, col) = cell_link_fields(cell)?;
                self.set_cell_link(path, sheet, row, col)?;
            }
        }

        if let Some(ranges) = doc.get("ranges").and_then(JsonValue::as_array) {
            for range in ranges {
                let (sheet, row, col) = range_origin_fields(range)?;
                self.start_range(sheet, row, col)?;
                for field in range_member_array(range, "fields")? {
                    let path = member_path(field)?;
                    let label = field.get("label").and_then(JsonValue::as_str);
                    self.append_field_link(path, label)?;
                }
                if let Some(groups) = range.get("row-groups").and_then(JsonValue::as_array) {
                    for group in groups {
                        self.set_range_row_group(member_path(group)?)?;
                    }
                }
                self.commit_range()?;
            }
        }
        Ok(())
    }

    /// Parse a content stream and commit linked values into the sink.
    pub fn read_stream(&mut self, content: &[u8], factory: &mut dyn ImportFactory) -> Result<()> {
        if content.is_empty() {
            return Ok(());
        }
        self.link_positions.clear();

        // Seed each range: header captions on the origin row, data rows
        // starting one below.
        for rid in 0..self.tree.range_count() {
            {
                let range = self.tree.range_mut(rid);
                range.row_size = 1;
                range.reset_imported();
            }
            self.write_range_headers(rid, factory);
        }

        let walker = self.tree.walker();
        let mut handler = XmlDataHandler {
            tree: &mut self.tree,
            factory,
            walker,
            scopes: Vec::new(),
            attrs: Vec::new(),
            cur_chars: None,
            current: None,
            pending_increment: None,
            in_range_ref: false,
            link_positions: Vec::new(),
            fill_value: &self.fill_value,
        };
        SaxParser::new(content, self.repo, &mut handler).parse()?;
        handler.postprocess();
        self.link_positions = handler.link_positions;
        Ok(())
    }

    fn write_range_headers(&mut self, rid: RangeId, factory: &mut dyn ImportFactory) {
        let range = self.tree.range(rid);
        let origin = range.pos;
        let mut captions = Vec::with_capacity(range.field_nodes.len());
        for (i, field) in range.field_nodes.iter().enumerate() {
            if range.labels[i] != 0 {
                captions.push(self.tree.str(range.labels[i]).to_string());
                continue;
            }
            let (ns, name) = match *field {
                FieldRef::Content(node) => {
                    let elem = self.tree.node(node);
                    (elem.ns, elem.name)
                }
                FieldRef::Attribute(node, ai) => {
                    let attr = &self.tree.node(node).attributes[ai];
                    (attr.ns, attr.name)
                }
            };
            if ns == NsId::NONE {
                captions.push(self.tree.str(name).to_string());
            } else {
                captions.push(format!("{}:{}", self.repo.short_name(ns), self.tree.str(name)));
            }
        }

        let Some(sheet) = factory.get_sheet(self.tree.str(origin.sheet)) else {
            return;
        };
        for (i, caption) in captions.iter().enumerate() {
            if !caption.is_empty() {
                sheet.set_auto(origin.row, origin.col + i as ColT, caption);
            }
        }
    }

    /// Rewrite the source stream with current sink values.
    ///
    /// Recorded linked spans are rewritten; all other bytes are copied
    /// bit-for-bit, comments and whitespace included.
    pub fn write(
        &self,
        content: &[u8],
        factory: &dyn ExportFactory,
        out: &mut dyn io::Write,
    ) -> Result<()> {
        if content.is_empty() || self.link_positions.is_empty() {
            return Ok(());
        }

        let mut links = self.link_positions.clone();
        links.sort_by_key(|&n| self.tree.node(n).stream_pos.open_begin);

        let mut begin = 0usize;
        for &node in &links {
            let elem = self.tree.node(node);
            let sp = elem.stream_pos;
            // Recorded spans never nest; anything out of order would slice
            // backwards, so skip it.
            if !sp.is_set() || sp.open_begin < begin {
                continue;
            }

            if let Some(Link::Cell(pos)) = elem.link {
                let Some(sheet) = factory.get_sheet(self.tree.str(pos.sheet)) else {
                    continue;
                };
                out.write_all(&content[begin..sp.open_begin])?;
                self.rewrite_open_tag(out, content, node, factory, sp.self_closing())?;
                sheet.write_string(out, pos.row, pos.col)?;
                if sp.self_closing() {
                    self.write_close_tag(out, node)?;
                } else {
                    out.write_all(&content[sp.close_begin..sp.close_end])?;
                }
                begin = sp.close_end;
            } else if let Some(rid) = elem.range_parent {
                let range = self.tree.range(rid);
                let Some(sheet) = factory.get_sheet(self.tree.str(range.pos.sheet)) else {
                    continue;
                };
                out.write_all(&content[begin..sp.open_begin])?;
                self.rewrite_open_tag(out, content, node, factory, sp.self_closing())?;
                self.write_range_rows(out, node, rid, &*sheet)?;
                if sp.self_closing() {
                    self.write_close_tag(out, node)?;
                } else {
                    out.write_all(&content[sp.close_begin..sp.close_end])?;
                }
                begin = sp.close_end;
            } else if elem.unlinked_attribute_anchor() {
                out.write_all(&content[begin..sp.open_begin])?;
                self.rewrite_open_tag(out, content, node, factory, false)?;
                begin = sp.open_end;
            } else {
                return Err(Error::Other(
                    "recorded element carries no link".to_string(),
                ));
            }
        }

        out.write_all(&content[begin..])?;
        Ok(())
    }

    /// Copy the recorded open tag, substituting only the value spans of
    /// cell-linked attributes. Unlinked attributes, whitespace, and quote
    /// style survive untouched. With `open_up` the trailing `/>` becomes
    /// `>` so text content can follow.
    fn rewrite_open_tag(
        &self,
        out: &mut dyn io::Write,
        content: &[u8],
        node: NodeId,
        factory: &dyn ExportFactory,
        open_up: bool,
    ) -> Result<()> {
        let elem = self.tree.node(node);
        let sp = elem.stream_pos;

        let mut subs: Vec<((usize, usize), CellPos)> = elem
            .attributes
            .iter()
            .filter_map(|a| match (a.value_span, a.link) {
                (Some(span), Link::Cell(pos)) => Some((span, pos)),
                _ => None,
            })
            .collect();
        subs.sort_by_key(|(span, _)| span.0);

        let end = if open_up { sp.open_end - 2 } else { sp.open_end };
        let mut cursor = sp.open_begin;
        for (span, pos) in subs {
            out.write_all(&content[cursor..span.0])?;
            match factory.get_sheet(self.tree.str(pos.sheet)) {
                Some(sheet) => sheet.write_string(out, pos.row, pos.col)?,
                // Missing sheet: keep the original value bytes.
                None => out.write_all(&content[span.0..span.1])?,
            }
            cursor = span.1;
        }
        out.write_all(&content[cursor..end])?;
        if open_up {
            out.write_all(b">")?;
        }
        Ok(())
    }

    /// Emit the repeated child subtree of a range parent once per row,
    /// with field values read back from the sink. Data rows sit one past
    /// the origin row, skipping the header row written on import.
    fn write_range_rows(
        &self,
        out: &mut dyn io::Write,
        parent: NodeId,
        rid: RangeId,
        sheet: &dyn ExportSheet,
    ) -> Result<()> {
        let Some(&root) = self.tree.children(parent).first() else {
            return Ok(());
        };
        let rows = self.tree.range(rid).row_size;
        for row in 0..rows {
            self.write_row_subtree(out, root, rid, row, sheet)?;
        }
        Ok(())
    }

    fn write_row_subtree(
        &self,
        out: &mut dyn io::Write,
        node: NodeId,
        rid: RangeId,
        row: RowT,
        sheet: &dyn ExportSheet,
    ) -> Result<()> {
        let elem = self.tree.node(node);
        let children = self.tree.children(node);
        let is_field = matches!(elem.link, Some(Link::RangeField { .. }));
        let self_close = children.is_empty() && !is_field;

        self.write_synth_open(out, node, rid, row, sheet, self_close)?;
        if self_close {
            return Ok(());
        }

        for &child in children {
            self.write_row_subtree(out, child, rid, row, sheet)?;
        }

        if let Some(Link::RangeField { range, column }) = elem.link {
            if range == rid {
                let origin = self.tree.range(rid).pos;
                sheet.write_string(out, origin.row + 1 + row, origin.col + column)?;
            }
        }
        self.write_close_tag(out, node)?;
        Ok(())
    }

    fn write_synth_open(
        &self,
        out: &mut dyn io::Write,
        node: NodeId,
        rid: RangeId,
        row: RowT,
        sheet: &dyn ExportSheet,
        self_close: bool,
    ) -> Result<()> {
        write!(out, "<")?;
        self.write_qname(out, node)?;
        for attr in &self.tree.node(node).attributes {
            if let Link::RangeField { range, column } = attr.link {
                if range != rid {
                    continue;
                }
                write!(out, " ")?;
                if attr.alias != 0 {
                    write!(out, "{}:", self.tree.str(attr.alias))?;
                }
                write!(out, "{}=\"", self.tree.str(attr.name))?;
                let origin = self.tree.range(rid).pos;
                sheet.write_string(out, origin.row + 1 + row, origin.col + column)?;
                write!(out, "\"")?;
            }
        }
        if self_close {
            write!(out, "/")?;
        }
        write!(out, ">")?;
        Ok(())
    }

    fn write_close_tag(&self, out: &mut dyn io::Write, node: NodeId) -> Result<()> {
        write!(out, "</")?;
        self.write_qname(out, node)?;
        write!(out, ">")?;
        Ok(())
    }

    fn write_qname(&self, out: &mut dyn io::Write, node: NodeId) -> Result<()> {
        let elem = self.tree.node(node);
        if elem.alias != 0 {
            write!(out, "{}:", self.tree.str(elem.alias))?;
        }
        write!(out, "{}", self.tree.str(elem.name))?;
        Ok(())
    }
}

fn cell_link_fields(cell: &JsonValue) -> Result<(&str, &str, RowT, ColT)> {
    let path = member_path(cell)?;
    let sheet = cell
        .get("sheet")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::MapDefinition("cell link needs a 'sheet'".to_string()))?;
    let row = member_coord(cell, "row")?;
    let col = member_coord(cell, "column")?;
    Ok((path, sheet, row, col))
}

fn range_origin_fields(range: &JsonValue) -> Result<(&str, RowT, ColT)> {
    let sheet = range
        .get("sheet")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::MapDefinition("range needs a 'sheet'".to_string()))?;
    let row = member_coord(range, "row")?;
    let col = member_coord(range, "column")?;
    Ok((sheet, row, col))
}

fn range_member_array<'v>(range: &'v JsonValue, key: &str) -> Result<&'v [JsonValue]> {
    range
        .get(key)
        .and_then(JsonValue::as_array)
        .ok_or_else(|| Error::MapDefinition(format!("range needs a '{key}' array")))
}

fn member_path(value: &JsonValue) -> Result<&str> {
    value
        .get("path")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::MapDefinition("link needs a 'path'".to_string()))
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

/// SAX handler that feeds the sink during a content parse.
struct XmlDataHandler<'a, 'x> {
    tree: &'x mut XmlMapTree,
    factory: &'x mut dyn ImportFactory,
    walker: TreeWalker,
    /// Open-tag positions of the open elements, innermost last.
    scopes: Vec<(usize, usize)>,
    attrs: Vec<SaxAttribute<'a>>,
    cur_chars: Option<Cow<'a, [u8]>>,
    current: Option<NodeId>,
    pending_increment: Option<RangeId>,
    in_range_ref: bool,
    link_positions: Vec<NodeId>,
    fill_value: &'x str,
}

impl<'a, 'x> XmlDataHandler<'a, 'x> {
    /// Flush the pending row-group boundary at end of stream.
    fn postprocess(&mut self) {
        if let Some(rid) = self.pending_increment.take() {
            fill_unprocessed(self.tree, self.factory, rid, self.fill_value);
        }
    }

    fn commit_attribute_links(&mut self, node: NodeId) {
        // Pair each linked attribute with its event, if present.
        let mut matched: Vec<(usize, usize)> = Vec::new();
        for (ai, la) in self.tree.node(node).attributes.iter().enumerate() {
            let found = self
                .attrs
                .iter()
                .position(|a| a.ns == la.ns && a.name == self.tree.bytes(la.name));
            if let Some(ei) = found {
                matched.push((ai, ei));
            }
        }

        for (ai, ei) in matched {
            let attr = &self.attrs[ei];
            let trimmed = crate::core::scanner::trim(&attr.value);
            let value = String::from_utf8_lossy(trimmed);
            match self.tree.node(node).attributes[ai].link {
                Link::Cell(pos) => {
                    set_cell(self.tree, self.factory, pos, &value);
                }
                Link::RangeField { range, column } => {
                    set_field(self.tree, self.factory, range, column, &value);
                }
            }

            // Record what the writer needs to re-emit this attribute.
            let alias = self.tree.intern(attr.alias);
            let span = attr.value_span;
            let link = &mut self.tree.node_mut(node).attributes[ai];
            link.alias = alias;
            link.value_span = Some(span);
        }
    }
}

impl<'a, 'x> SaxHandler<'a> for XmlDataHandler<'a, 'x> {
    fn start_element(&mut self, elem: &SaxElement<'a>) {
        self.scopes.push((elem.begin_pos, elem.end_pos));
        self.cur_chars = None;

        self.current = self.walker.push_element(self.tree, elem.ns, elem.name);
        if let Some(node) = self.current {
            // A row-group boundary closed just before this element opened;
            // complete the previous row now.
            if let Some(rg) = self.tree.node(node).row_group {
                if self.pending_increment == Some(rg) {
                    fill_unprocessed(self.tree, self.factory, rg, self.fill_value);
                    let range = self.tree.range_mut(rg);
                    range.reset_imported();
                    range.row_size += 1;
                    self.pending_increment = None;
                }
            }

            self.commit_attribute_links(node);

            if self.tree.node(node).range_parent.is_some() {
                self.in_range_ref = true;
            }
        }
        self.attrs.clear();
    }

    fn end_element(&mut self, elem: &SaxElement<'a>) {
        if let Some(node) = self.current {
            let link = self.tree.node(node).link;
            match link {
                Some(Link::Cell(pos)) => {
                    let value = chars_to_str(&self.cur_chars);
                    set_cell(self.tree, self.factory, pos, &value);
                }
                Some(Link::RangeField { range, column }) => {
                    let value = chars_to_str(&self.cur_chars);
                    set_field(self.tree, self.factory, range, column, &value);
                }
                None => {}
            }

            if let Some(rg) = self.tree.node(node).row_group {
                self.pending_increment = Some(rg);
            }

            // Record stream positions for everything the writer revisits:
            // single-cell elements, range parents, and attribute anchors
            // outside linked ranges.
            let elem_ref = self.tree.node(node);
            let record = matches!(link, Some(Link::Cell(_)))
                || elem_ref.range_parent.is_some()
                || (!self.in_range_ref && elem_ref.unlinked_attribute_anchor());
            if record {
                let (open_begin, open_end) = self.scopes.last().copied().unwrap_or((0, 0));
                let stream_pos = StreamPos {
                    open_begin,
                    open_end,
                    close_begin: elem.begin_pos,
                    close_end: elem.end_pos,
                };
                self.tree.node_mut(node).stream_pos = stream_pos;
                self.link_positions.push(node);
            }

            if self.tree.node(node).range_parent.is_some() {
                self.in_range_ref = false;
            }

            let alias = self.tree.intern(elem.alias);
            self.tree.node_mut(node).alias = alias;
        }

        self.scopes.pop();
        self.current = self.walker.pop_element();
    }

    fn attribute(&mut self, attr: &SaxAttribute<'a>) {
        self.attrs.push(attr.clone());
    }

    fn characters(&mut self, value: Cow<'a, [u8]>) {
        if self.current.is_some() {
            self.cur_chars = Some(trim_cow(value));
        }
    }
}

fn chars_to_str<'c>(chars: &'c Option<Cow<'_, [u8]>>) -> Cow<'c, str> {
    match chars {
        Some(value) => String::from_utf8_lossy(value),
        None => Cow::Borrowed(""),
    }
}

fn trim_cow(value: Cow<'_, [u8]>) -> Cow<'_, [u8]> {
    match value {
        Cow::Borrowed(bytes) => Cow::Borrowed(crate::core::scanner::trim(bytes)),
        Cow::Owned(bytes) => Cow::Owned(crate::core::scanner::trim(&bytes).to_vec()),
    }
}

fn set_cell(tree: &XmlMapTree, factory: &mut dyn ImportFactory, pos: CellPos, value: &str) {
    if let Some(sheet) = factory.get_sheet(tree.str(pos.sheet)) {
        sheet.set_auto(pos.row, pos.col, value);
    }
}

fn set_field(
    tree: &mut XmlMapTree,
    factory: &mut dyn ImportFactory,
    rid: RangeId,
    column: ColT,
    value: &str,
) {
    let range = tree.range_mut(rid);
    if let Some(flag) = range.imported.get_mut(column as usize) {
        *flag = true;
    }
    let origin = range.pos;
    let row = origin.row + range.row_size;
    if let Some(sheet) = factory.get_sheet(tree.str(origin.sheet)) {
        sheet.set_auto(row, origin.col + column, value);
    }
}

/// Fill columns the completing row never received with the placeholder.
fn fill_unprocessed(
    tree: &XmlMapTree,
    factory: &mut dyn ImportFactory,
    rid: RangeId,
    fill_value: &str,
) {
    let range = tree.range(rid);
    let Some(sheet) = factory.get_sheet(tree.str(range.pos.sheet)) else {
        return;
    };
    let row = range.pos.row + range.row_size;
    for (col, &done) in range.imported.iter().enumerate() {
        if !done {
            sheet.set_auto(row, range.pos.col + col as ColT, fill_value);
        }
    }
}
