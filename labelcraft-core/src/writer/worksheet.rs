//! Worksheet part serialization

use std::fmt::Write as _;

use crate::address::{CellRange, CellRef};
use crate::reader::workbook::{Cell, CellValue, ColumnRange, Row, Worksheet};
use crate::xml_helpers::{escape, escape_text, render_attrs};

/// Child order of `<worksheet>`
const ELEMENT_ORDER: [&str; 38] = [
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
];

fn rank(tag: &str) -> usize {
    ELEMENT_ORDER
        .iter()
        .position(|t| *t == tag)
        .unwrap_or(ELEMENT_ORDER.len())
}

/// Serialize a worksheet. `drawing_rel` is the relationship id of the sheet's
/// drawing part, if it has one.
pub fn write_worksheet(sheet: &Worksheet, drawing_rel: Option<&str>) -> String {
    let mut pieces: Vec<(usize, String)> = sheet
        .sections
        .iter()
        .map(|section| (rank(&section.tag), section.xml.clone()))
        .collect();

    pieces.push((rank("dimension"), dimension_xml(sheet)));
    if !sheet.columns.is_empty() {
        pieces.push((rank("cols"), columns_xml(&sheet.columns)));
    }
    pieces.push((rank("sheetData"), sheet_data_xml(sheet)));
    if !sheet.merges.is_empty() {
        pieces.push((rank("mergeCells"), merges_xml(&sheet.merges)));
    }
    if !sheet.validations.is_empty() {
        let body: String = sheet.validations.iter().map(|v| v.xml.as_str()).collect();
        pieces.push((
            rank("dataValidations"),
            format!(
                "<dataValidations count=\"{}\">{}</dataValidations>",
                sheet.validations.len(),
                body
            ),
        ));
    }
    if !sheet.hyperlinks.is_empty() {
        let body: String = sheet
            .hyperlinks
            .iter()
            .map(|h| format!("<hyperlink{}/>", render_attrs(&h.attrs)))
            .collect();
        pieces.push((rank("hyperlinks"), format!("<hyperlinks>{}</hyperlinks>", body)));
    }
    if let Some(rel_id) = drawing_rel {
        pieces.push((rank("drawing"), format!("<drawing r:id=\"{}\"/>", escape(rel_id))));
    }

    // Stable: carried-through sections keep their source order within a rank
    pieces.sort_by_key(|(rank, _)| *rank);

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
    xml.push_str(&sheet.root_tag);
    for (_, piece) in pieces {
        xml.push_str(&piece);
    }
    xml.push_str("</worksheet>");
    xml
}

fn dimension_xml(sheet: &Worksheet) -> String {
    let mut used: Option<CellRange> = None;
    for (row_idx, row) in &sheet.rows {
        for col in row.cells.keys() {
            let at = CellRef::new(*row_idx, *col);
            used = Some(match used {
                Some(range) => CellRange::new(
                    CellRef::new(range.top.min(at.row), range.left.min(at.col)),
                    CellRef::new(range.bottom.max(at.row), range.right.max(at.col)),
                ),
                None => CellRange::new(at, at),
            });
        }
    }
    let reference = used
        .map(|range| range.to_string())
        .unwrap_or_else(|| "A1".to_string());
    format!("<dimension ref=\"{}\"/>", reference)
}

fn columns_xml(columns: &[ColumnRange]) -> String {
    let mut xml = String::from("<cols>");
    for col in columns {
        let _ = write!(xml, "<col min=\"{}\" max=\"{}\"", col.min, col.max);
        if let Some(width) = col.width {
            let _ = write!(xml, " width=\"{}\"", width);
        }
        if let Some(style) = col.style {
            let _ = write!(xml, " style=\"{}\"", style);
        }
        if col.hidden {
            xml.push_str(" hidden=\"1\"");
        }
        if col.custom_width {
            xml.push_str(" customWidth=\"1\"");
        }
        if col.outline_level > 0 {
            let _ = write!(xml, " outlineLevel=\"{}\"", col.outline_level);
        }
        if col.collapsed {
            xml.push_str(" collapsed=\"1\"");
        }
        xml.push_str(&render_attrs(&col.extra));
        xml.push_str("/>");
    }
    xml.push_str("</cols>");
    xml
}

fn merges_xml(merges: &[CellRange]) -> String {
    let mut xml = format!("<mergeCells count=\"{}\">", merges.len());
    for merge in merges {
        let _ = write!(xml, "<mergeCell ref=\"{}\"/>", merge);
    }
    xml.push_str("</mergeCells>");
    xml
}

fn row_has_metadata(row: &Row) -> bool {
    row.height.is_some()
        || row.hidden
        || row.outline_level > 0
        || row.collapsed
        || row.style.is_some()
        || !row.extra.is_empty()
}

fn sheet_data_xml(sheet: &Worksheet) -> String {
    let mut xml = String::from("<sheetData>");
    for (row_idx, row) in &sheet.rows {
        if row.cells.is_empty() && !row_has_metadata(row) {
            continue;
        }

        let _ = write!(xml, "<row r=\"{}\"", row_idx);
        if let Some(style) = row.style {
            let _ = write!(xml, " s=\"{}\" customFormat=\"1\"", style);
        }
        if let Some(height) = row.height {
            let _ = write!(xml, " ht=\"{}\"", height);
        }
        if row.custom_height {
            xml.push_str(" customHeight=\"1\"");
        }
        if row.hidden {
            xml.push_str(" hidden=\"1\"");
        }
        if row.outline_level > 0 {
            let _ = write!(xml, " outlineLevel=\"{}\"", row.outline_level);
        }
        if row.collapsed {
            xml.push_str(" collapsed=\"1\"");
        }
        xml.push_str(&render_attrs(&row.extra));

        if row.cells.is_empty() {
            xml.push_str("/>");
            continue;
        }
        xml.push('>');
        for (col, cell) in &row.cells {
            write_cell(&mut xml, CellRef::new(*row_idx, *col), cell);
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");
    xml
}

fn write_cell(xml: &mut String, at: CellRef, cell: &Cell) {
    let _ = write!(xml, "<c r=\"{}\"", at);
    if cell.style != 0 {
        let _ = write!(xml, " s=\"{}\"", cell.style);
    }

    let has_formula = cell.formula.is_some();
    let (cell_type, value) = match &cell.value {
        CellValue::Empty => (None, None),
        CellValue::Number(n) => (None, Some(n.to_string())),
        CellValue::Bool(b) => (Some("b"), Some(if *b { "1" } else { "0" }.to_string())),
        CellValue::Error(e) => (Some("e"), Some(e.clone())),
        CellValue::SharedString(idx) => (Some("s"), Some(idx.to_string())),
        CellValue::Text(s) if has_formula => (Some("str"), Some(s.clone())),
        CellValue::Text(_) => (Some("inlineStr"), None),
        CellValue::IsoDate(s) => (Some("d"), Some(s.clone())),
    };
    if let Some(t) = cell_type {
        let _ = write!(xml, " t=\"{}\"", t);
    }
    xml.push_str(&render_attrs(&cell.extra));

    let inline = match (&cell.value, has_formula) {
        (CellValue::Text(s), false) => Some(s),
        _ => None,
    };
    if !has_formula && value.is_none() && inline.is_none() {
        xml.push_str("/>");
        return;
    }
    xml.push('>');

    if let Some(formula) = &cell.formula {
        if formula.text.is_empty() {
            let _ = write!(xml, "<f{}/>", render_attrs(&formula.attrs));
        } else {
            let _ = write!(
                xml,
                "<f{}>{}</f>",
                render_attrs(&formula.attrs),
                escape_text(&formula.text)
            );
        }
    }
    if let Some(text) = inline {
        let _ = write!(xml, "<is><t xml:space=\"preserve\">{}</t></is>", escape_text(text));
    }
    if let Some(value) = value {
        let _ = write!(xml, "<v>{}</v>", escape_text(&value));
    }
    xml.push_str("</c>");
}
