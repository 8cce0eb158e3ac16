//! Spreadsheet-grid layer for Attest.
//!
//! Works on an already-parsed grid of header row + data rows; file-format
//! quirks are the uploader's problem. Pure synchronous; no HTTP or database
//! dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use attest_sheet::{Sheet, auto_map_headers, extract_controls};
//!
//! let sheet = Sheet::new(
//!   vec!["통제코드".into(), "통제명".into()],
//!   vec![vec!["ITGC-001".into(), "시스템 접근 통제".into()]],
//! );
//! let mapping = auto_map_headers(sheet.headers());
//! let controls = extract_controls(&sheet, &mapping);
//! println!("{} controls", controls.len());
//! ```

mod extract;
pub mod mapping;

pub use extract::{extract_controls, split_by_category};
pub use mapping::{
  ControlField, HeaderMapping, auto_map_headers, find_category_column,
};

use serde::{Deserialize, Serialize};

// ─── Sheet ───────────────────────────────────────────────────────────────────

/// A parsed spreadsheet: one header row plus data rows, all cells already
/// coerced to strings by the reader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sheet {
  pub headers: Vec<String>,
  pub rows:    Vec<Vec<String>>,
}

impl Sheet {
  pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
    Self { headers, rows }
  }

  pub fn headers(&self) -> &[String] { &self.headers }

  /// Cell at (row, col); a missing cell reads as the empty string.
  pub fn cell(&self, row: usize, col: usize) -> &str {
    self
      .rows
      .get(row)
      .and_then(|r| r.get(col))
      .map(String::as_str)
      .unwrap_or("")
  }
}
