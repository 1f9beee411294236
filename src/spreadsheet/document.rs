//! Minimal in-memory spreadsheet document.
//!
//! Backs the CLI tools and the integration tests. Sheets are sparse maps
//! from (row, col) to a scalar; strings are deduplicated through a shared
//! string table.

use super::{ExportFactory, ExportSheet, ImportFactory, ImportSheet};
use crate::core::entities::encode_text;
use crate::core::number::parse_numeric;
use crate::map::{ColT, RowT};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

/// A stored cell scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Shared-string table entry.
    Shared(usize),
    /// Plain string stored directly by `set_auto`.
    Text(String),
    Value(f64),
    Bool(bool),
}

#[derive(Debug, Default)]
struct SharedStrings {
    strings: Vec<String>,
    index: HashMap<String, usize>,
}

impl SharedStrings {
    fn add(&mut self, value: &str) -> usize {
        if let Some(&sid) = self.index.get(value) {
            return sid;
        }
        let sid = self.strings.len();
        self.strings.push(value.to_string());
        self.index.insert(value.to_string(), sid);
        sid
    }

    fn get(&self, sid: usize) -> &str {
        self.strings.get(sid).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Default)]
struct Sheet {
    name: String,
    cells: BTreeMap<(RowT, ColT), CellValue>,
}

/// In-memory document implementing both sink interfaces.
#[derive(Debug, Default)]
pub struct Document {
    sheets: Vec<Sheet>,
    shared: SharedStrings,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|s| s.name.as_str())
    }

    /// The stored scalar at a cell, if set.
    pub fn cell(&self, sheet: &str, row: RowT, col: ColT) -> Option<&CellValue> {
        self.sheets
            .iter()
            .find(|s| s.name == sheet)?
            .cells
            .get(&(row, col))
    }

    /// String rendering of a cell, empty if unset.
    pub fn cell_string(&self, sheet: &str, row: RowT, col: ColT) -> String {
        match self.cell(sheet, row, col) {
            None => String::new(),
            Some(CellValue::Shared(sid)) => self.shared.get(*sid).to_string(),
            Some(CellValue::Text(s)) => s.clone(),
            Some(CellValue::Value(v)) => format!("{v}"),
            Some(CellValue::Bool(b)) => format!("{b}"),
        }
    }

    /// Flat text dump of every sheet, one cell per line.
    pub fn dump_flat(&self, out: &mut dyn io::Write) -> io::Result<()> {
        for sheet in &self.sheets {
            writeln!(out, "sheet: {}", sheet.name)?;
            for (&(row, col), value) in &sheet.cells {
                let rendered = match value {
                    CellValue::Shared(sid) => self.shared.get(*sid).to_string(),
                    CellValue::Text(s) => s.clone(),
                    CellValue::Value(v) => format!("{v}"),
                    CellValue::Bool(b) => format!("{b}"),
                };
                writeln!(out, "  ({row}, {col}): {rendered}")?;
            }
        }
        Ok(())
    }

    /// CSV dump of one sheet over its occupied extent.
    pub fn dump_csv(&self, name: &str, out: &mut dyn io::Write) -> io::Result<()> {
        let Some(sheet) = self.sheets.iter().find(|s| s.name == name) else {
            return Ok(());
        };
        let max_row = sheet.cells.keys().map(|k| k.0).max().unwrap_or(0);
        let max_col = sheet.cells.keys().map(|k| k.1).max().unwrap_or(0);
        for row in 0..=max_row {
            for col in 0..=max_col {
                if col > 0 {
                    write!(out, ",")?;
                }
                let rendered = self.cell_string(name, row, col);
                if rendered.contains([',', '"', '\n']) {
                    write!(out, "\"{}\"", rendered.replace('"', "\"\""))?;
                } else {
                    write!(out, "{rendered}")?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

impl ImportSheet for Sheet {
    fn set_auto(&mut self, row: RowT, col: ColT, value: &str) {
        // Bare strings become numbers or booleans when they parse cleanly.
        let parsed = parse_numeric(value.as_bytes());
        let cell = if !value.is_empty()
            && parsed.consumed == value.len()
            && !parsed.value.is_nan()
        {
            CellValue::Value(parsed.value)
        } else {
            match value {
                "true" => CellValue::Bool(true),
                "false" => CellValue::Bool(false),
                _ => CellValue::Text(value.to_string()),
            }
        };
        self.cells.insert((row, col), cell);
    }

    fn set_string(&mut self, row: RowT, col: ColT, sid: usize) {
        self.cells.insert((row, col), CellValue::Shared(sid));
    }

    fn set_value(&mut self, row: RowT, col: ColT, value: f64) {
        self.cells.insert((row, col), CellValue::Value(value));
    }

    fn set_bool(&mut self, row: RowT, col: ColT, value: bool) {
        self.cells.insert((row, col), CellValue::Bool(value));
    }
}

impl ImportFactory for Document {
    fn get_sheet(&mut self, name: &str) -> Option<&mut dyn ImportSheet> {
        let pos = self.sheets.iter().position(|s| s.name == name)?;
        Some(&mut self.sheets[pos])
    }

    fn append_sheet(&mut self, index: usize, name: &str) {
        let sheet = Sheet { name: name.to_string(), cells: BTreeMap::new() };
        if index >= self.sheets.len() {
            self.sheets.push(sheet);
        } else {
            self.sheets.insert(index, sheet);
        }
    }

    fn add_shared_string(&mut self, value: &[u8]) -> usize {
        self.shared.add(&String::from_utf8_lossy(value))
    }
}

struct SheetView<'a> {
    sheet: &'a Sheet,
    shared: &'a SharedStrings,
}

impl ExportSheet for SheetView<'_> {
    fn write_string(&self, out: &mut dyn io::Write, row: RowT, col: ColT) -> io::Result<()> {
        let rendered = match self.sheet.cells.get(&(row, col)) {
            None => String::new(),
            Some(CellValue::Shared(sid)) => self.shared.get(*sid).to_string(),
            Some(CellValue::Text(s)) => s.clone(),
            Some(CellValue::Value(v)) => format!("{v}"),
            Some(CellValue::Bool(b)) => format!("{b}"),
        };
        out.write_all(encode_text(&rendered).as_bytes())
    }
}

impl ExportFactory for Document {
    fn get_sheet<'a>(&'a self, name: &str) -> Option<Box<dyn ExportSheet + 'a>> {
        let sheet = self.sheets.iter().find(|s| s.name == name)?;
        Some(Box::new(SheetView { sheet, shared: &self.shared }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_auto_detects_scalars() {
        let mut doc = Document::new();
        doc.append_sheet(0, "S");
        {
            let sheet = ImportFactory::get_sheet(&mut doc, "S").unwrap();
            sheet.set_auto(0, 0, "42");
            sheet.set_auto(0, 1, "true");
            sheet.set_auto(0, 2, "-1.5e2");
        }
        assert_eq!(doc.cell("S", 0, 0), Some(&CellValue::Value(42.0)));
        assert_eq!(doc.cell("S", 0, 1), Some(&CellValue::Bool(true)));
        assert_eq!(doc.cell("S", 0, 2), Some(&CellValue::Value(-150.0)));
    }

    #[test]
    fn test_shared_strings_deduplicate() {
        let mut doc = Document::new();
        let a = doc.add_shared_string(b"hello");
        let b = doc.add_shared_string(b"hello");
        let c = doc.add_shared_string(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_missing_sheet_is_none() {
        let mut doc = Document::new();
        assert!(ImportFactory::get_sheet(&mut doc, "nope").is_none());
    }

    #[test]
    fn test_export_escapes_xml() {
        let mut doc = Document::new();
        doc.append_sheet(0, "S");
        let sid = doc.add_shared_string(b"a<b&c");
        ImportFactory::get_sheet(&mut doc, "S")
            .unwrap()
            .set_string(0, 0, sid);

        let view = ExportFactory::get_sheet(&doc, "S").unwrap();
        let mut out = Vec::new();
        view.write_string(&mut out, 0, 0).unwrap();
        assert_eq!(out, b"a&lt;b&amp;c");
    }
}
