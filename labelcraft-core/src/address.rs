//! Cell references and rectangular ranges in A1 notation

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Largest row number a worksheet can hold
pub const MAX_ROW: u32 = 1_048_576;
/// Largest column number a worksheet can hold (XFD)
pub const MAX_COL: u32 = 16_384;

/// Cell reference (e.g., A1, BF3), 1-based row and column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse an A1-style reference. `$` markers are accepted and ignored.
    ///
    /// Returns `None` for anything that is not letters followed by digits or that
    /// falls outside the worksheet limits.
    pub fn parse(cell_ref: &str) -> Option<Self> {
        let cell_ref = cell_ref.trim();
        let mut col = 0u32;
        let mut row = 0u32;
        let mut letters = 0;
        let mut digits = 0;

        for ch in cell_ref.chars() {
            match ch {
                '$' if digits == 0 => {}
                'A'..='Z' | 'a'..='z' if digits == 0 => {
                    letters += 1;
                    if letters > 3 {
                        return None;
                    }
                    col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
                }
                '0'..='9' if letters > 0 => {
                    digits += 1;
                    row = row.checked_mul(10)?.checked_add(ch as u32 - '0' as u32)?;
                }
                _ => return None,
            }
        }

        if letters == 0 || digits == 0 || row == 0 || row > MAX_ROW || col > MAX_COL {
            return None;
        }

        Some(Self { row, col })
    }

    /// Zero-based (col, row) pair as used by drawing anchors
    pub fn zero_based(&self) -> (u32, u32) {
        (self.col - 1, self.row - 1)
    }

    /// Convert to Excel-style reference (e.g., "A1")
    pub fn to_excel_ref(&self) -> String {
        format!("{}{}", col_to_letters(self.col), self.row)
    }
}

/// Convert a 1-based column number to letters (1 -> A, 28 -> AB)
pub fn col_to_letters(mut col: u32) -> String {
    let mut result = String::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        result.insert(0, (b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    result
}

impl PartialOrd for CellRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row.cmp(&other.row).then_with(|| self.col.cmp(&other.col))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_excel_ref())
    }
}

impl FromStr for CellRef {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellRef::parse(s).ok_or_else(|| AddressError(s.to_string()))
    }
}

/// A string that could not be parsed as a cell reference or range
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cell reference: {0:?}")]
pub struct AddressError(pub String);

/// Rectangular span of cells, inclusive on all sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub top: u32,
    pub left: u32,
    pub bottom: u32,
    pub right: u32,
}

impl CellRange {
    /// Build a range from two corners in any order
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            top: a.row.min(b.row),
            left: a.col.min(b.col),
            bottom: a.row.max(b.row),
            right: a.col.max(b.col),
        }
    }

    /// Parse "A1:B2" or a single "A1"
    pub fn parse(range: &str) -> Option<Self> {
        match range.split_once(':') {
            Some((start, end)) => Some(Self::new(CellRef::parse(start)?, CellRef::parse(end)?)),
            None => {
                let cell = CellRef::parse(range)?;
                Some(Self::new(cell, cell))
            }
        }
    }

    pub fn top_left(&self) -> CellRef {
        CellRef::new(self.top, self.left)
    }

    pub fn bottom_right(&self) -> CellRef {
        CellRef::new(self.bottom, self.right)
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        cell.row >= self.top && cell.row <= self.bottom && cell.col >= self.left && cell.col <= self.right
    }

    pub fn intersects(&self, other: &CellRange) -> bool {
        self.top <= other.bottom
            && other.top <= self.bottom
            && self.left <= other.right
            && other.left <= self.right
    }

    pub fn is_single_cell(&self) -> bool {
        self.top == self.bottom && self.left == self.right
    }

    /// Every cell of the range, row by row
    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.top..=self.bottom)
            .flat_map(move |row| (self.left..=self.right).map(move |col| CellRef::new(row, col)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.top_left())
        } else {
            write!(f, "{}:{}", self.top_left(), self.bottom_right())
        }
    }
}

/// Parse a space separated `sqref` list ("A1:A5 C3")
pub fn parse_sqref(sqref: &str) -> Vec<CellRange> {
    sqref.split_whitespace().filter_map(CellRange::parse).collect()
}
