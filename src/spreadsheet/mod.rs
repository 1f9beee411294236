//! Sink interfaces the mapping engine writes into, plus a small in-memory
//! document implementing them.
//!
//! The engine only ever talks to these traits; any spreadsheet backend
//! supplying them can receive mapped data.

pub mod document;

pub use document::{CellValue, Document};

use crate::map::{ColT, RowT};
use std::io;

/// One sheet on the import side.
pub trait ImportSheet {
    /// Parse a bare string into the most appropriate scalar and store it.
    fn set_auto(&mut self, row: RowT, col: ColT, value: &str);
    /// Store a shared string by its id (see [`ImportFactory::add_shared_string`]).
    fn set_string(&mut self, row: RowT, col: ColT, sid: usize);
    fn set_value(&mut self, row: RowT, col: ColT, value: f64);
    fn set_bool(&mut self, row: RowT, col: ColT, value: bool);
}

/// Import side of the sink.
pub trait ImportFactory {
    /// Look up a sheet by name; None means "not wired up" and the caller
    /// skips the write.
    fn get_sheet(&mut self, name: &str) -> Option<&mut dyn ImportSheet>;
    /// Append a new sheet at the given position.
    fn append_sheet(&mut self, index: usize, name: &str);
    /// Intern a string into the shared-string table.
    fn add_shared_string(&mut self, value: &[u8]) -> usize;
    /// Called once all streams have been read.
    fn finalize(&mut self) {}
}

/// One sheet on the export side.
pub trait ExportSheet {
    /// Write the cell's string representation to `out`, escaped for the
    /// output format.
    fn write_string(&self, out: &mut dyn io::Write, row: RowT, col: ColT) -> io::Result<()>;
}

/// Export side of the sink.
pub trait ExportFactory {
    fn get_sheet<'a>(&'a self, name: &str) -> Option<Box<dyn ExportSheet + 'a>>;
}
