//! Deep copy of a template worksheet into a new sheet of the same workbook

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::address::{CellRange, CellRef};
use crate::package::{Relationship, rel_type, rels_path_for, relative_target, resolve_target};
use crate::reader::styles::{Edge, StyleSheet};
use crate::reader::workbook::{SHEET_OWNED_PARTS, SHEET_PART_BASE, Workbook, Worksheet};

/// Related parts that carry workbook-unique names and cannot be duplicated
const UNCLONEABLE_PARTS: [&str; 2] = ["table", "pivotTable"];

/// Clone the sheet named `template_name` into a new sheet `new_name` and return
/// the index of the new sheet.
///
/// The copy proceeds in the order a spreadsheet application would build it:
/// sheet properties, columns, rows and cells, merges (restoring the outer
/// bottom and right borders after each merge), column widths once more, then
/// validations, related parts and sheet-local defined names.
pub fn clone_sheet(workbook: &mut Workbook, template_name: &str, new_name: &str) -> Result<usize> {
    let template_index = workbook
        .sheet_index(template_name)
        .with_context(|| format!("Template sheet '{}' does not exist", template_name))?;
    workbook.check_new_sheet_name(new_name)?;
    let template = workbook.sheets[template_index].clone();

    let mut sheet = Worksheet::new(new_name);

    sheet.root_tag = template.root_tag.clone();
    sheet.state = template.state.clone();
    sheet.sections = template
        .sections
        .iter()
        .filter(|section| section.tag != "tableParts")
        .cloned()
        .collect();
    sheet.drawing_rel = template.drawing_rel.clone();

    sheet.columns = template.columns.clone();

    for (row_idx, row) in template.rows() {
        let copy = sheet.row_mut(row_idx);
        *copy = row.metadata();
        for (col, cell) in row.cells() {
            copy.cells.insert(col, cell.clone());
        }
    }
    sheet.notes = template.notes.clone();
    sheet.hyperlinks = template.hyperlinks.clone();

    for region in template.merges() {
        sheet.merge_cells(*region)?;
        restore_outer_borders(&mut workbook.styles, &template, &mut sheet, region)?;
    }

    for column in template.columns() {
        sheet.set_column_width(column.min, column.max, column.width);
    }

    sheet.validations = template.validations.clone();
    copy_related_parts(workbook, &template, &mut sheet)?;

    let index = workbook.add_sheet(sheet)?;

    let local_names: Vec<_> = workbook
        .defined_names
        .iter()
        .filter(|name| name.local_sheet_id == Some(template_index))
        .map(|name| name.retarget(template_name, new_name, index))
        .collect();
    workbook.defined_names.extend(local_names);

    debug!(template = %template_name, sheet = %new_name, "Cloned sheet");
    Ok(index)
}

/// Merging gives every covered cell the anchor's format, which loses the
/// borders drawn on the outer bottom row and right column. Wherever the
/// template cell draws that edge, draw it again on the clone.
fn restore_outer_borders(
    styles: &mut StyleSheet,
    template: &Worksheet,
    sheet: &mut Worksheet,
    region: &CellRange,
) -> Result<()> {
    for col in region.left..=region.right {
        copy_edge(styles, template, sheet, CellRef::new(region.bottom, col), Edge::Bottom)?;
    }
    for row in region.top..=region.bottom {
        copy_edge(styles, template, sheet, CellRef::new(row, region.right), Edge::Right)?;
    }
    Ok(())
}

fn copy_edge(
    styles: &mut StyleSheet,
    template: &Worksheet,
    sheet: &mut Worksheet,
    at: CellRef,
    edge: Edge,
) -> Result<()> {
    let Some(wanted) = template
        .cell(at)
        .and_then(|cell| styles.border_for_xf(cell.style))
        .and_then(|border| border.side(edge))
        .cloned()
    else {
        return Ok(());
    };

    let cell = sheet.cell_mut(at);
    cell.style = styles.set_border_edge(cell.style, edge, &wanted)?;
    Ok(())
}

/// Stem and extension of a part file name: `xl/comments12.xml` -> (`xl`, `comments`, `xml`)
fn part_name_pattern(part: &str) -> (&str, &str, &str) {
    let (dir, file) = part.rsplit_once('/').unwrap_or(("", part));
    let (stem, ext) = file.rsplit_once('.').unwrap_or((file, ""));
    (dir, stem.trim_end_matches(|c: char| c.is_ascii_digit()), ext)
}

/// Give the clone its own copies of the parts owned by the template sheet,
/// registered under the same relationship ids
fn copy_related_parts(workbook: &mut Workbook, template: &Worksheet, sheet: &mut Worksheet) -> Result<()> {
    for rel in template.relationships.iter() {
        let kind = rel_type::short_name(&rel.rel_type);

        if rel.is_external() || !SHEET_OWNED_PARTS.contains(&kind) {
            if UNCLONEABLE_PARTS.contains(&kind) {
                warn!(sheet = %sheet.name(), part = %rel.target, "Tables and pivot tables are not copied to cloned sheets");
                continue;
            }
            sheet.relationships.insert(rel.clone());
            continue;
        }

        let source = resolve_target(SHEET_PART_BASE, &rel.target);
        let Some(bytes) = workbook.package.part(&source).map(|b| b.to_vec()) else {
            warn!(sheet = %sheet.name(), part = %source, "Related part is missing, dropping the relationship");
            continue;
        };

        let (dir, stem, ext) = part_name_pattern(&source);
        let target = workbook.package.next_part_name(dir, stem, ext);
        workbook.package.set_part(target.clone(), bytes);

        let source_rels = rels_path_for(&source);
        if let Some(rels) = workbook.package.part(&source_rels).map(|b| b.to_vec()) {
            if String::from_utf8_lossy(&rels).contains("/chart\"") {
                warn!(sheet = %sheet.name(), part = %source, "Charts in cloned drawings stay shared with the template");
            }
            workbook.package.set_part(rels_path_for(&target), rels);
        }
        if let Some(content_type) = workbook.content_types.override_for(&source).map(str::to_string) {
            workbook.content_types.set_override(&target, &content_type);
        }

        sheet.relationships.insert(Relationship {
            id: rel.id.clone(),
            rel_type: rel.rel_type.clone(),
            target: relative_target(SHEET_PART_BASE, &target),
            target_mode: None,
        });
    }
    Ok(())
}
