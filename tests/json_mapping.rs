//! End-to-end JSON mapping into the document model.

use tabula::spreadsheet::CellValue;
use tabula::{Document, Error, JsonMapper};

fn import(map_def: &str, content: &str) -> Document {
    let mut doc = Document::new();
    let mut mapper = JsonMapper::new();
    mapper
        .read_map_definition(map_def.as_bytes(), &mut doc)
        .unwrap();
    mapper.read_stream(content.as_bytes(), &mut doc).unwrap();
    doc
}

#[test]
fn single_cell_number() {
    let map = r#"{
      "sheets": ["S"],
      "cells": [ {"path": "/a/b", "sheet": "S", "row": 0, "column": 0} ]
    }"#;
    let doc = import(map, r#"{"a":{"b":42}}"#);
    assert_eq!(doc.cell("S", 0, 0), Some(&CellValue::Value(42.0)));
}

#[test]
fn range_with_row_group() {
    let map = r#"{
      "sheets": ["S"],
      "ranges": [
        {
          "sheet": "S", "row": 0, "column": 0,
          "fields": [ {"path": "/rows/k"}, {"path": "/rows/v"} ],
          "row-groups": [ {"path": "/rows"} ]
        }
      ]
    }"#;
    let doc = import(map, r#"{"rows":[{"k":"x","v":1},{"k":"y","v":2}]}"#);
    assert_eq!(doc.cell_string("S", 0, 0), "x");
    assert_eq!(doc.cell("S", 0, 1), Some(&CellValue::Value(1.0)));
    assert_eq!(doc.cell_string("S", 1, 0), "y");
    assert_eq!(doc.cell("S", 1, 1), Some(&CellValue::Value(2.0)));
    assert_eq!(doc.cell("S", 2, 0), None);
}

#[test]
fn scalar_types_commit_with_their_json_types() {
    let map = r#"{
      "sheets": ["S"],
      "cells": [
        {"path": "/s", "sheet": "S", "row": 0, "column": 0},
        {"path": "/n", "sheet": "S", "row": 0, "column": 1},
        {"path": "/b", "sheet": "S", "row": 0, "column": 2},
        {"path": "/z", "sheet": "S", "row": 0, "column": 3}
      ]
    }"#;
    let doc = import(map, r#"{"s":"hi","n":2.5,"b":true,"z":null}"#);
    assert_eq!(doc.cell_string("S", 0, 0), "hi");
    assert_eq!(doc.cell("S", 0, 1), Some(&CellValue::Value(2.5)));
    assert_eq!(doc.cell("S", 0, 2), Some(&CellValue::Bool(true)));
    // Nulls write nothing.
    assert_eq!(doc.cell("S", 0, 3), None);
}

#[test]
fn strings_deduplicate_through_shared_table() {
    let map = r#"{
      "sheets": ["S"],
      "ranges": [
        {
          "sheet": "S", "row": 0, "column": 0,
          "fields": [ {"path": "/rows/k"} ],
          "row-groups": [ {"path": "/rows"} ]
        }
      ]
    }"#;
    let doc = import(map, r#"{"rows":[{"k":"same"},{"k":"same"}]}"#);
    let a = doc.cell("S", 0, 0).cloned();
    let b = doc.cell("S", 1, 0).cloned();
    assert!(matches!(a, Some(CellValue::Shared(_))));
    assert_eq!(a, b);
}

#[test]
fn missing_sheet_is_skipped_silently() {
    let map = r#"{
      "sheets": ["Other"],
      "cells": [ {"path": "/a", "sheet": "Missing", "row": 0, "column": 0} ]
    }"#;
    let doc = import(map, r#"{"a":1}"#);
    assert_eq!(doc.cell("Missing", 0, 0), None);
}

#[test]
fn container_at_scalar_link_is_discarded() {
    let map = r#"{
      "sheets": ["S"],
      "ranges": [
        {
          "sheet": "S", "row": 0, "column": 0,
          "fields": [ {"path": "/rows/k"}, {"path": "/rows/v"} ],
          "row-groups": [ {"path": "/rows"} ]
        }
      ]
    }"#;
    // "k" arrives as an object in the second row; only that value is lost.
    let doc = import(map, r#"{"rows":[{"k":"x","v":1},{"k":{"oops":0},"v":2}]}"#);
    assert_eq!(doc.cell_string("S", 0, 0), "x");
    assert_eq!(doc.cell("S", 1, 0), None);
    assert_eq!(doc.cell("S", 1, 1), Some(&CellValue::Value(2.0)));
}

#[test]
fn unknown_top_level_keys_are_ignored() {
    let map = r#"{
      "sheets": ["S"],
      "cells": [ {"path": "/a", "sheet": "S", "row": 0, "column": 0} ],
      "comment": {"anything": [1, 2, 3]}
    }"#;
    let doc = import(map, r#"{"a":5}"#);
    assert_eq!(doc.cell("S", 0, 0), Some(&CellValue::Value(5.0)));
}

#[test]
fn map_without_sheets_is_rejected() {
    let mut doc = Document::new();
    let mut mapper = JsonMapper::new();
    let err = mapper
        .read_map_definition(br#"{"cells": []}"#, &mut doc)
        .unwrap_err();
    assert!(matches!(err, Error::MapDefinition(_)));
}

#[test]
fn duplicate_paths_are_rejected() {
    let map = r#"{
      "sheets": ["S"],
      "cells": [
        {"path": "/a", "sheet": "S", "row": 0, "column": 0},
        {"path": "/a", "sheet": "S", "row": 1, "column": 0}
      ]
    }"#;
    let mut doc = Document::new();
    let mut mapper = JsonMapper::new();
    let err = mapper
        .read_map_definition(map.as_bytes(), &mut doc)
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateLink(_)));
}

#[test]
fn parse_error_reports_offset() {
    let map = r#"{"sheets": ["S"], "cells": [ {"path": "/a", "sheet": "S", "row": 0, "column": 0} ]}"#;
    let mut doc = Document::new();
    let mut mapper = JsonMapper::new();
    mapper.read_map_definition(map.as_bytes(), &mut doc).unwrap();
    let err = mapper.read_stream(br#"{"a": 01}"#, &mut doc).unwrap_err();
    assert!(matches!(err, Error::JsonParse { offset: 6, .. }));
}

#[test]
fn nested_arrays_reuse_the_same_subtree() {
    // Arrays are transparent: each element of the outer array re-walks
    // the mapped subtree, so a doubly-nested list still lands values.
    let map = r#"{
      "sheets": ["S"],
      "ranges": [
        {
          "sheet": "S", "row": 0, "column": 0,
          "fields": [ {"path": "/groups/name"} ],
          "row-groups": [ {"path": "/groups"} ]
        }
      ]
    }"#;
    let doc = import(map, r#"{"groups":[[{"name":"a"}],[{"name":"b"}]]}"#);
    assert_eq!(doc.cell_string("S", 0, 0), "a");
    assert_eq!(doc.cell_string("S", 1, 0), "b");
}
