//! Workbook data structures

use anyhow::{Result, bail};
use std::collections::BTreeMap;
use tracing::debug;

use super::styles::StyleSheet;
use crate::address::{CellRange, CellRef};
use crate::package::{ContentTypes, Package, Relationships, rel_type, rels_path_for, resolve_target};

/// Pseudo part name every in-memory worksheet resolves relative targets against.
/// Worksheets are always written to `xl/worksheets/`.
pub(crate) const SHEET_PART_BASE: &str = "xl/worksheets/sheet.xml";

/// Longest sheet name a spreadsheet application accepts
const MAX_SHEET_NAME_LEN: usize = 31;

/// Related part kinds that belong to exactly one worksheet
pub(crate) const SHEET_OWNED_PARTS: [&str; 4] = ["comments", "vmlDrawing", "drawing", "printerSettings"];

/// Represents a complete workbook
#[derive(Debug, Clone)]
pub struct Workbook {
    pub(crate) package: Package,
    pub(crate) content_types: ContentTypes,
    pub(crate) workbook_part: String,
    pub(crate) workbook_xml: String,
    pub(crate) workbook_rels: Relationships,
    pub(crate) sheets: Vec<Worksheet>,
    pub(crate) defined_names: Vec<DefinedName>,
    pub(crate) styles: StyleSheet,
    pub(crate) shared_strings: Vec<String>,
    /// Ask spreadsheet applications to recompute every formula when opening
    pub full_calc_on_load: bool,
}

impl Workbook {
    /// Get a sheet by name
    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    pub fn sheet_at(&self, index: usize) -> Option<&Worksheet> {
        self.sheets.get(index)
    }

    pub fn sheet_at_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.sheets.get_mut(index)
    }

    pub fn sheets(&self) -> &[Worksheet] {
        &self.sheets
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn styles(&self) -> &StyleSheet {
        &self.styles
    }

    pub fn shared_strings(&self) -> &[String] {
        &self.shared_strings
    }

    pub fn defined_names(&self) -> &[DefinedName] {
        &self.defined_names
    }

    /// One worksheet borrowed exclusively together with the shared style table
    pub fn sheet_and_styles_mut(&mut self, index: usize) -> Option<(&mut Worksheet, &mut StyleSheet)> {
        let sheet = self.sheets.get_mut(index)?;
        Some((sheet, &mut self.styles))
    }

    /// The cached (calculated) value of a cell rendered as text
    pub fn value_text(&self, sheet_index: usize, at: CellRef) -> String {
        self.sheets
            .get(sheet_index)
            .and_then(|sheet| sheet.cell(at))
            .map(|cell| cell.value.to_text(&self.shared_strings))
            .unwrap_or_default()
    }

    /// Append a worksheet. The name must be valid and unique (case-insensitive).
    pub fn add_sheet(&mut self, sheet: Worksheet) -> Result<usize> {
        self.check_new_sheet_name(&sheet.name)?;
        self.sheets.push(sheet);
        Ok(self.sheets.len() - 1)
    }

    /// Fails when `name` is invalid or already used (case-insensitive)
    pub fn check_new_sheet_name(&self, name: &str) -> Result<()> {
        validate_sheet_name(name)?;
        if self.sheets.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
            bail!("A sheet named '{}' already exists", name);
        }
        Ok(())
    }

    /// Remove a worksheet together with the parts only it owns. Sheet-local
    /// defined names of later sheets are re-indexed.
    pub fn remove_sheet(&mut self, index: usize) -> Result<Worksheet> {
        if index >= self.sheets.len() {
            bail!("Sheet index {} out of range", index);
        }
        let sheet = self.sheets.remove(index);

        self.defined_names.retain(|n| n.local_sheet_id != Some(index));
        for name in &mut self.defined_names {
            if let Some(id) = name.local_sheet_id.as_mut() {
                if *id > index {
                    *id -= 1;
                }
            }
        }

        for rel in sheet.relationships.iter().filter(|r| !r.is_external()) {
            if !SHEET_OWNED_PARTS.contains(&rel_type::short_name(&rel.rel_type)) {
                continue;
            }
            let part = resolve_target(SHEET_PART_BASE, &rel.target);
            debug!(part = %part, sheet = %sheet.name, "Dropping part of removed sheet");
            self.package.remove_part(&part);
            self.package.remove_part(&rels_path_for(&part));
            self.content_types.remove_override(&part);
        }

        Ok(sheet)
    }
}

/// Sheet names must be 1..=31 characters without `[ ] : * ? / \`
pub fn validate_sheet_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().count() > MAX_SHEET_NAME_LEN {
        bail!("Sheet name '{}' must be 1 to {} characters", name, MAX_SHEET_NAME_LEN);
    }
    if name.contains(['[', ']', ':', '*', '?', '/', '\\']) {
        bail!("Sheet name '{}' contains a forbidden character", name);
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        bail!("Sheet name '{}' cannot start or end with an apostrophe", name);
    }
    Ok(())
}

/// A workbook-level `<definedName>`
#[derive(Debug, Clone, PartialEq)]
pub struct DefinedName {
    pub name: String,
    /// Index of the sheet the name is scoped to
    pub local_sheet_id: Option<usize>,
    pub(crate) attrs: Vec<(String, String)>,
    pub formula: String,
}

impl DefinedName {
    /// Copy of this name scoped to another sheet, with references to `from`
    /// rewritten to `to`
    pub fn retarget(&self, from: &str, to: &str, local_sheet_id: usize) -> Self {
        Self {
            name: self.name.clone(),
            local_sheet_id: Some(local_sheet_id),
            attrs: self.attrs.clone(),
            formula: retarget_sheet_refs(&self.formula, from, to),
        }
    }
}

/// Rewrite `from!` and `'from'!` sheet prefixes in a formula to `'to'!`.
///
/// Unquoted names only match at the start of a token, so `XTemplate!A1` is
/// left alone when retargeting `Template`. String literals are copied as is.
fn retarget_sheet_refs(formula: &str, from: &str, to: &str) -> String {
    let to_prefix = format!("'{}'!", to.replace('\'', "''"));
    let bare = format!("{}!", from);
    let mut out = String::with_capacity(formula.len());
    let mut rest = formula;
    let mut prev: Option<char> = None;

    while let Some(c) = rest.chars().next() {
        if c == '\'' || c == '"' {
            let end = quoted_len(rest, c);
            let (token, tail) = rest.split_at(end);
            if c == '\'' && tail.starts_with('!') && token[1..token.len() - 1].replace("''", "'") == from {
                out.push_str(&to_prefix);
                rest = &tail[1..];
                prev = Some('!');
            } else {
                out.push_str(token);
                rest = tail;
                prev = token.chars().last();
            }
            continue;
        }

        let at_token_start = prev.is_none_or(|p| !(p.is_alphanumeric() || p == '_' || p == '.'));
        if at_token_start && rest.starts_with(&bare) {
            out.push_str(&to_prefix);
            rest = &rest[bare.len()..];
            prev = Some('!');
            continue;
        }

        out.push(c);
        rest = &rest[c.len_utf8()..];
        prev = Some(c);
    }
    out
}

/// Byte length of the quoted run at the start of `s`, quotes included.
/// A doubled quote is an escaped one. Unterminated runs take the rest of `s`.
fn quoted_len(s: &str, quote: char) -> usize {
    let mut chars = s.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            if chars.peek().is_some_and(|&(_, next)| next == quote) {
                chars.next();
                continue;
            }
            return i + c.len_utf8();
        }
    }
    s.len()
}

/// An element of the worksheet that is carried through untouched
#[derive(Debug, Clone, PartialEq)]
pub struct RawSection {
    /// Local element name (e.g. `sheetViews`)
    pub tag: String,
    pub xml: String,
}

/// Represents a worksheet
#[derive(Debug, Clone)]
pub struct Worksheet {
    pub(crate) name: String,
    /// `hidden` / `veryHidden`
    pub(crate) state: Option<String>,
    /// Source text of the `<worksheet ...>` start tag
    pub(crate) root_tag: String,
    pub(crate) columns: Vec<ColumnRange>,
    pub(crate) rows: BTreeMap<u32, Row>,
    pub(crate) merges: Vec<CellRange>,
    pub(crate) hyperlinks: Vec<Hyperlink>,
    pub(crate) validations: Vec<DataValidation>,
    pub(crate) sections: Vec<RawSection>,
    pub(crate) drawing_rel: Option<String>,
    pub(crate) relationships: Relationships,
    pub(crate) notes: BTreeMap<CellRef, String>,
    pub(crate) images: Vec<ImageAsset>,
}

impl Worksheet {
    /// An empty worksheet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: None,
            root_tag: DEFAULT_ROOT_TAG.to_string(),
            columns: Vec::new(),
            rows: BTreeMap::new(),
            merges: Vec::new(),
            hyperlinks: Vec::new(),
            validations: Vec::new(),
            sections: Vec::new(),
            drawing_rel: None,
            relationships: Relationships::default(),
            notes: BTreeMap::new(),
            images: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_hidden(&self) -> bool {
        self.state.is_some()
    }

    /// Get a cell at the given position
    pub fn cell(&self, at: CellRef) -> Option<&Cell> {
        self.rows.get(&at.row).and_then(|row| row.cells.get(&at.col))
    }

    /// Get a cell, creating the row and cell when missing
    pub fn cell_mut(&mut self, at: CellRef) -> &mut Cell {
        self.rows
            .entry(at.row)
            .or_default()
            .cells
            .entry(at.col)
            .or_default()
    }

    /// Write a literal value; any formula in the cell is dropped.
    ///
    /// The master cell of a shared formula is refused, since its dependents
    /// carry no formula text of their own.
    pub fn set_value(&mut self, at: CellRef, value: impl Into<CellValue>) -> Result<()> {
        let shared = self
            .cell(at)
            .and_then(|c| c.formula.as_ref())
            .is_some_and(Formula::is_shared_master);
        if shared {
            bail!("Cell {} of '{}' holds a shared formula used by other cells", at, self.name);
        }
        let cell = self.cell_mut(at);
        cell.formula = None;
        cell.value = value.into();
        Ok(())
    }

    pub fn row(&self, index: u32) -> Option<&Row> {
        self.rows.get(&index)
    }

    pub fn row_mut(&mut self, index: u32) -> &mut Row {
        self.rows.entry(index).or_default()
    }

    /// Rows in ascending order, including rows without cells
    pub fn rows(&self) -> impl Iterator<Item = (u32, &Row)> {
        self.rows.iter().map(|(idx, row)| (*idx, row))
    }

    pub fn columns(&self) -> &[ColumnRange] {
        &self.columns
    }

    /// Column metadata covering the given 1-based column
    pub fn column(&self, col: u32) -> Option<&ColumnRange> {
        self.columns.iter().find(|c| c.min <= col && col <= c.max)
    }

    /// Set the width of the column span `min..=max`. An exactly matching span
    /// is updated in place, otherwise a new span is added.
    pub fn set_column_width(&mut self, min: u32, max: u32, width: Option<f64>) {
        match self.columns.iter_mut().find(|c| c.min == min && c.max == max) {
            Some(column) => {
                column.width = width;
                column.custom_width = width.is_some();
            }
            None => {
                self.columns.push(ColumnRange {
                    min,
                    max,
                    width,
                    custom_width: width.is_some(),
                    ..ColumnRange::default()
                });
                self.columns.sort_by_key(|c| c.min);
            }
        }
    }

    pub fn merges(&self) -> &[CellRange] {
        &self.merges
    }

    /// Merge regions overlapping the given cell (at most one on a valid sheet)
    pub fn merge_regions_containing(&self, at: CellRef) -> impl Iterator<Item = &CellRange> {
        self.merges.iter().filter(move |m| m.contains(at))
    }

    /// Merge a rectangle. Every cell of the region is materialized; cells other
    /// than the top-left anchor take the anchor's style and lose their value and
    /// formula, which is how spreadsheet applications treat covered cells.
    pub fn merge_cells(&mut self, range: CellRange) -> Result<()> {
        if range.is_single_cell() {
            bail!("Cannot merge the single cell {}", range);
        }
        if let Some(existing) = self.merges.iter().find(|m| m.intersects(&range)) {
            bail!("Merge {} overlaps existing merge {}", range, existing);
        }

        let anchor = range.top_left();
        let anchor_style = self.cell_mut(anchor).style;
        for at in range.cells().filter(|at| *at != anchor) {
            let cell = self.cell_mut(at);
            cell.value = CellValue::Empty;
            cell.formula = None;
            cell.style = anchor_style;
        }

        self.merges.push(range);
        Ok(())
    }

    pub fn hyperlinks(&self) -> &[Hyperlink] {
        &self.hyperlinks
    }

    pub fn hyperlink_at(&self, at: CellRef) -> Option<&Hyperlink> {
        self.hyperlinks.iter().find(|h| h.range.contains(at))
    }

    pub fn validations(&self) -> &[DataValidation] {
        &self.validations
    }

    pub fn validation_at(&self, at: CellRef) -> Option<&DataValidation> {
        self.validations
            .iter()
            .find(|v| v.ranges.iter().any(|r| r.contains(at)))
    }

    /// Note (legacy comment) text attached to a cell
    pub fn note_at(&self, at: CellRef) -> Option<&str> {
        self.notes.get(&at).map(|s| s.as_str())
    }

    /// Source text of a carried-through element such as `sheetViews`
    pub fn section(&self, tag: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.tag == tag)
            .map(|s| s.xml.as_str())
    }

    /// Whether the sheet already carries a DrawingML part (shapes, pictures, charts)
    pub fn has_drawing(&self) -> bool {
        self.drawing_rel.is_some()
    }

    pub fn images(&self) -> &[ImageAsset] {
        &self.images
    }

    pub fn add_image(&mut self, image: ImageAsset) {
        self.images.push(image);
    }

    /// Clear `tabSelected` so several sheets are not opened as a group
    pub fn deselect_tab(&mut self) {
        for section in self.sections.iter_mut().filter(|s| s.tag == "sheetViews") {
            section.xml = section
                .xml
                .replace(r#"tabSelected="1""#, r#"tabSelected="0""#)
                .replace(r#"tabSelected="true""#, r#"tabSelected="0""#);
        }
    }
}

pub(crate) const DEFAULT_ROOT_TAG: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#;

/// Row metadata and the cells of the row keyed by 1-based column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub height: Option<f64>,
    pub custom_height: bool,
    pub hidden: bool,
    pub outline_level: u8,
    pub collapsed: bool,
    pub style: Option<u32>,
    pub(crate) extra: Vec<(String, String)>,
    pub(crate) cells: BTreeMap<u32, Cell>,
}

impl Row {
    pub fn cells(&self) -> impl Iterator<Item = (u32, &Cell)> {
        self.cells.iter().map(|(col, cell)| (*col, cell))
    }

    /// Copy of the row's metadata without its cells
    pub fn metadata(&self) -> Row {
        Row {
            height: self.height,
            custom_height: self.custom_height,
            hidden: self.hidden,
            outline_level: self.outline_level,
            collapsed: self.collapsed,
            style: self.style,
            extra: self.extra.clone(),
            cells: BTreeMap::new(),
        }
    }
}

/// A `<col>` span with its metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnRange {
    pub min: u32,
    pub max: u32,
    pub width: Option<f64>,
    pub custom_width: bool,
    pub hidden: bool,
    pub outline_level: u8,
    pub collapsed: bool,
    pub style: Option<u32>,
    pub(crate) extra: Vec<(String, String)>,
}

/// Represents a single cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    /// Index into the style sheet's cell formats
    pub style: u32,
    /// Literal value, or the cached result when a formula is present
    pub value: CellValue,
    pub formula: Option<Formula>,
    pub(crate) extra: Vec<(String, String)>,
}

/// A cell formula with its `<f>` attributes (shared / array bookkeeping)
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub text: String,
    pub(crate) attrs: Vec<(String, String)>,
}

impl Formula {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attrs: Vec::new(),
        }
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_shared_master(&self) -> bool {
        self.attr("t") == Some("shared") && self.attr("ref").is_some()
    }
}

/// Cell value types
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Bool(bool),
    Error(String),
    /// Index into the shared string table
    SharedString(u32),
    Text(String),
    /// `t="d"` ISO 8601 date
    IsoDate(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Text rendering of the value, resolving shared strings
    pub fn to_text(&self, shared_strings: &[String]) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Error(e) => e.clone(),
            CellValue::SharedString(idx) => shared_strings
                .get(*idx as usize)
                .cloned()
                .unwrap_or_default(),
            CellValue::Text(s) | CellValue::IsoDate(s) => s.clone(),
        }
    }
}

/// Shortest round-trip text of a number, without a trailing ".0"
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// A `<hyperlink>` element; the relationship id (if any) stays in `attrs`
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperlink {
    pub range: CellRange,
    pub(crate) attrs: Vec<(String, String)>,
}

impl Hyperlink {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key || k.rsplit(':').next() == Some(key))
            .map(|(_, v)| v.as_str())
    }

    /// Relationship id pointing at an external target
    pub fn rel_id(&self) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.ends_with(":id"))
            .map(|(_, v)| v.as_str())
    }
}

/// A `<dataValidation>` rule with the ranges it covers
#[derive(Debug, Clone, PartialEq)]
pub struct DataValidation {
    pub ranges: Vec<CellRange>,
    pub(crate) xml: String,
}

/// A raster image anchored at a cell, held in memory until serialization
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    pub anchor: CellRef,
    pub width_px: u32,
    pub height_px: u32,
    pub png: Vec<u8>,
    pub description: String,
}
