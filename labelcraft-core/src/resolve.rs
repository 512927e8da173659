//! Redirect writes that land inside a merge region to its anchor cell

use crate::address::CellRef;
use crate::reader::Worksheet;

/// The cell a value for `at` must be written to: the top-left cell of the
/// first merge region covering `at`, or `at` itself.
pub fn resolve_writable_cell(sheet: &Worksheet, at: CellRef) -> CellRef {
    sheet
        .merge_regions_containing(at)
        .next()
        .map(|region| region.top_left())
        .unwrap_or(at)
}

/// String form of [`resolve_writable_cell`]. An address that cannot be parsed
/// is returned unchanged.
pub fn resolve_address(sheet: &Worksheet, address: &str) -> String {
    match CellRef::parse(address) {
        Some(at) => resolve_writable_cell(sheet, at).to_string(),
        None => address.to_string(),
    }
}
