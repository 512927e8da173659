//! Read-only views of calculated cell values

use anyhow::{Context, Result};
use calamine::{Data, Range, Reader, Xlsx, open_workbook_from_rs};
use std::collections::HashMap;
use std::io::Cursor;

use super::workbook::{Workbook, format_number};
use crate::address::CellRef;

/// Source of the value a spreadsheet application would display in a cell
pub trait CalculatedValues {
    fn sheet_names(&self) -> Vec<String>;

    /// Text of a cell; `None` when the sheet does not exist, empty when the
    /// cell is blank
    fn cell_text(&self, sheet: &str, at: CellRef) -> Option<String>;
}

impl CalculatedValues for Workbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets().iter().map(|s| s.name().to_string()).collect()
    }

    fn cell_text(&self, sheet: &str, at: CellRef) -> Option<String> {
        let index = self.sheet_index(sheet)?;
        Some(self.value_text(index, at))
    }
}

/// Cached values read with calamine, which resolves formulas to the results
/// stored by the last application that saved the file
pub struct CalamineValues {
    names: Vec<String>,
    ranges: HashMap<String, Range<Data>>,
}

impl CalamineValues {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut excel: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes.to_vec()))
            .context("Failed to open workbook for value extraction")?;

        let names = excel.sheet_names();
        let mut ranges = HashMap::new();
        for name in &names {
            let range = excel
                .worksheet_range(name)
                .with_context(|| format!("Failed to read values of sheet '{}'", name))?;
            ranges.insert(name.clone(), range);
        }

        Ok(Self { names, ranges })
    }
}

impl CalculatedValues for CalamineValues {
    fn sheet_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn cell_text(&self, sheet: &str, at: CellRef) -> Option<String> {
        let range = self.ranges.get(sheet)?;
        let (col, row) = at.zero_based();
        Some(range.get_value((row, col)).map(data_text).unwrap_or_default())
    }
}

/// Text a spreadsheet application shows for a cached value. Errors use their
/// sheet spelling (`#N/A`, `#DIV/0!`).
fn data_text(data: &Data) -> String {
    match data {
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::String(s) => s.clone(),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => e.to_string(),
        Data::Empty => String::new(),
        Data::DateTime(dt) => format_number(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}
