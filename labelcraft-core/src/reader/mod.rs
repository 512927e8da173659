//! xlsx reader building the editable workbook model

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

pub mod calculated;
pub mod styles;
pub mod workbook;
pub mod xml_parser;

pub use calculated::{CalculatedValues, CalamineValues};
pub use styles::{Border, BorderSide, Edge, StyleSheet};
pub use workbook::{
    Cell, CellValue, ColumnRange, DataValidation, DefinedName, Formula, Hyperlink, ImageAsset,
    Row, Workbook, Worksheet,
};

use crate::package::{
    CONTENT_TYPES_PART, ContentTypes, Package, ROOT_RELS_PART, Relationships, rel_type,
    rels_path_for, relative_target, resolve_target,
};
use workbook::SHEET_PART_BASE;

const OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

/// Read a workbook from a file path
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    let path = path.as_ref();
    let bytes =
        fs::read(path).with_context(|| format!("Failed to open workbook: {}", path.display()))?;
    read_workbook_bytes(&bytes)
        .with_context(|| format!("Failed to read workbook: {}", path.display()))
}

/// Read a workbook held in memory
pub fn read_workbook_bytes(bytes: &[u8]) -> Result<Workbook> {
    let mut package = Package::from_bytes(bytes)?;

    let content_types = ContentTypes::from_xml(&package.part_str(CONTENT_TYPES_PART)?)?;
    let root_rels = Relationships::from_xml(&package.part_str(ROOT_RELS_PART)?)?;
    let workbook_part = root_rels
        .find_by_type(OFFICE_DOCUMENT)
        .map(|rel| resolve_target("", &rel.target))
        .unwrap_or_else(|| "xl/workbook.xml".to_string());

    let workbook_xml = package
        .part_str(&workbook_part)
        .context("Package has no workbook part")?;
    let workbook_rels_part = rels_path_for(&workbook_part);
    let workbook_rels = if package.contains(&workbook_rels_part) {
        Relationships::from_xml(&package.part_str(&workbook_rels_part)?)?
    } else {
        Relationships::default()
    };

    let entries = xml_parser::parse_workbook_xml(&workbook_xml)?;

    let styles = match workbook_rels.find_by_type(rel_type::STYLES) {
        Some(rel) => StyleSheet::parse(&package.part_str(&resolve_target(&workbook_part, &rel.target))?)?,
        None => StyleSheet::default(),
    };
    let shared_strings = match workbook_rels.find_by_type(rel_type::SHARED_STRINGS) {
        Some(rel) => xml_parser::parse_shared_strings(
            &package.part_str(&resolve_target(&workbook_part, &rel.target))?,
        )?,
        None => Vec::new(),
    };

    let mut sheets = Vec::with_capacity(entries.sheets.len());
    for entry in &entries.sheets {
        let rel = workbook_rels
            .get(&entry.rel_id)
            .with_context(|| format!("Sheet '{}' points at a missing relationship", entry.name))?;
        let part = resolve_target(&workbook_part, &rel.target);
        let xml = package
            .part_str(&part)
            .with_context(|| format!("Sheet '{}' has no part {}", entry.name, part))?;

        let mut sheet = xml_parser::parse_worksheet(&entry.name, &xml)
            .with_context(|| format!("Failed to parse sheet '{}'", entry.name))?;
        sheet.state = entry.state.clone();

        let rels_part = rels_path_for(&part);
        if let Some(rels) = package.remove_part(&rels_part) {
            let mut rels = Relationships::from_xml(&String::from_utf8(rels)?)?;
            for rel in rels.iter_mut().filter(|r| !r.is_external()) {
                let target = resolve_target(&part, &rel.target);
                if rel.rel_type == rel_type::COMMENTS {
                    sheet.notes = xml_parser::parse_comments(&package.part_str(&target)?)?;
                }
                rel.target = relative_target(SHEET_PART_BASE, &target);
            }
            sheet.relationships = rels;
        }

        debug!(
            sheet = %entry.name,
            rows = sheet.rows.len(),
            merges = sheet.merges.len(),
            "Parsed worksheet"
        );
        sheets.push(sheet);
    }

    Ok(Workbook {
        package,
        content_types,
        workbook_part,
        workbook_xml,
        workbook_rels,
        sheets,
        defined_names: entries.defined_names,
        styles,
        shared_strings,
        full_calc_on_load: false,
    })
}
