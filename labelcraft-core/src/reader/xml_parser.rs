//! SpreadsheetML part parsers

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use tracing::warn;

use super::workbook::{
    Cell, CellValue, ColumnRange, DataValidation, DefinedName, Formula, Hyperlink, RawSection,
    Row, Worksheet,
};
use crate::address::{CellRange, CellRef, parse_sqref};
use crate::xml_helpers::{
    attr_bool, attr_f64, attr_string, attr_string_local, attr_u32, attrs_except, capture_element,
    capture_empty, read_element_text,
};

/// A `<sheet>` entry of workbook.xml
#[derive(Debug, Clone, PartialEq)]
pub struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    pub state: Option<String>,
    pub rel_id: String,
}

/// Sheets and defined names declared in workbook.xml
#[derive(Debug, Clone, Default)]
pub struct WorkbookEntries {
    pub sheets: Vec<SheetEntry>,
    pub defined_names: Vec<DefinedName>,
}

pub fn parse_workbook_xml(xml: &str) -> Result<WorkbookEntries> {
    let mut reader = Reader::from_str(xml);
    let mut entries = WorkbookEntries::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr_string(&e, b"name").context("<sheet> without a name")?;
                let rel_id = attr_string_local(&e, b"id")
                    .with_context(|| format!("Sheet '{}' has no relationship id", name))?;
                entries.sheets.push(SheetEntry {
                    sheet_id: attr_u32(&e, b"sheetId").unwrap_or(0),
                    state: attr_string(&e, b"state").filter(|s| s != "visible"),
                    name,
                    rel_id,
                });
            }
            Event::Start(e) if e.local_name().as_ref() == b"definedName" => {
                let formula = read_element_text(&mut reader, &e)?;
                entries.defined_names.push(defined_name(&e, formula)?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"definedName" => {
                entries.defined_names.push(defined_name(&e, String::new())?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

fn defined_name(e: &BytesStart, formula: String) -> Result<DefinedName> {
    Ok(DefinedName {
        name: attr_string(e, b"name").context("<definedName> without a name")?,
        local_sheet_id: attr_u32(e, b"localSheetId").map(|id| id as usize),
        attrs: attrs_except(e, &[b"name", b"localSheetId"]),
        formula,
    })
}

/// Shared string table; rich text runs are flattened and phonetic runs skipped
pub fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => {
                    current.push_str(&read_element_text(&mut reader, &e)?);
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

/// Cell notes from a legacy comments part, keyed by cell
pub fn parse_comments(xml: &str) -> Result<BTreeMap<CellRef, String>> {
    let mut reader = Reader::from_str(xml);
    let mut notes = BTreeMap::new();
    let mut current: Option<(CellRef, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"comment" => {
                current = attr_string(&e, b"ref")
                    .and_then(|r| CellRef::parse(&r))
                    .map(|at| (at, String::new()));
            }
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                let text = read_element_text(&mut reader, &e)?;
                if let Some((_, note)) = current.as_mut() {
                    note.push_str(&text);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"comment" => {
                if let Some((at, note)) = current.take() {
                    notes.insert(at, note);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(notes)
}

/// Parse a worksheet part into the editable model
pub fn parse_worksheet(name: &str, xml: &str) -> Result<Worksheet> {
    let mut sheet = Worksheet::new(name);
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;

    loop {
        let pos = reader.buffer_position() as u64;
        let event = reader.read_event()?;
        match event {
            Event::Start(e) if depth == 0 => {
                if e.name().as_ref() != b"worksheet" {
                    bail!(
                        "Sheet '{}' is not an unprefixed worksheet and is not supported",
                        name
                    );
                }
                sheet.root_tag = root_tag(&capture_empty(&reader, xml, pos)?);
                depth = 1;
            }
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match tag.as_str() {
                    "sheetData" => sheet.rows = parse_sheet_data(&mut reader)?,
                    "cols" => sheet.columns = parse_columns(&mut reader)?,
                    "mergeCells" => sheet.merges = parse_merges(&mut reader)?,
                    "hyperlinks" => sheet.hyperlinks = parse_hyperlinks(&mut reader)?,
                    "dataValidations" => {
                        sheet.validations = parse_validations(&mut reader, xml)?
                    }
                    "dimension" => {
                        capture_element(&mut reader, xml, &e, pos)?;
                    }
                    _ => {
                        let xml = capture_element(&mut reader, xml, &e, pos)?;
                        sheet.sections.push(RawSection { tag, xml });
                    }
                }
            }
            Event::Empty(e) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match tag.as_str() {
                    "drawing" => sheet.drawing_rel = attr_string_local(&e, b"id"),
                    "dimension" | "sheetData" | "cols" | "mergeCells" | "hyperlinks"
                    | "dataValidations" => {}
                    _ => {
                        let xml = capture_empty(&reader, xml, pos)?;
                        sheet.sections.push(RawSection { tag, xml });
                    }
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(sheet)
}

/// The worksheet start tag with the relationships namespace declared
fn root_tag(tag: &str) -> String {
    if tag.contains("xmlns:r=") {
        return tag.to_string();
    }
    let close = tag.rfind('>').unwrap_or(tag.len());
    format!(
        "{} xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\"{}",
        &tag[..close],
        &tag[close..]
    )
}

fn parse_columns(reader: &mut Reader<&[u8]>) -> Result<Vec<ColumnRange>> {
    let mut columns = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"col" => {
                let min = attr_u32(&e, b"min").unwrap_or(1);
                columns.push(ColumnRange {
                    min,
                    max: attr_u32(&e, b"max").unwrap_or(min),
                    width: attr_f64(&e, b"width"),
                    custom_width: attr_bool(&e, b"customWidth").unwrap_or(false),
                    hidden: attr_bool(&e, b"hidden").unwrap_or(false),
                    outline_level: attr_u32(&e, b"outlineLevel").unwrap_or(0) as u8,
                    collapsed: attr_bool(&e, b"collapsed").unwrap_or(false),
                    style: attr_u32(&e, b"style"),
                    extra: attrs_except(
                        &e,
                        &[
                            b"min",
                            b"max",
                            b"width",
                            b"customWidth",
                            b"hidden",
                            b"outlineLevel",
                            b"collapsed",
                            b"style",
                        ],
                    ),
                });
            }
            Event::End(e) if e.local_name().as_ref() == b"cols" => break,
            Event::Eof => bail!("Unterminated <cols>"),
            _ => {}
        }
    }
    Ok(columns)
}

fn parse_merges(reader: &mut Reader<&[u8]>) -> Result<Vec<CellRange>> {
    let mut merges = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"mergeCell" => {
                let reference = attr_string(&e, b"ref").unwrap_or_default();
                match CellRange::parse(&reference) {
                    Some(range) => merges.push(range),
                    None => warn!(reference = %reference, "Dropping malformed merge region"),
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"mergeCells" => break,
            Event::Eof => bail!("Unterminated <mergeCells>"),
            _ => {}
        }
    }
    Ok(merges)
}

fn parse_hyperlinks(reader: &mut Reader<&[u8]>) -> Result<Vec<Hyperlink>> {
    let mut links = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"hyperlink" => {
                if let Some(range) = attr_string(&e, b"ref").and_then(|r| CellRange::parse(&r)) {
                    links.push(Hyperlink {
                        range,
                        attrs: attrs_except(&e, &[]),
                    });
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"hyperlinks" => break,
            Event::Eof => bail!("Unterminated <hyperlinks>"),
            _ => {}
        }
    }
    Ok(links)
}

fn parse_validations(reader: &mut Reader<&[u8]>, xml: &str) -> Result<Vec<DataValidation>> {
    let mut validations = Vec::new();
    loop {
        let pos = reader.buffer_position() as u64;
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"dataValidation" => {
                let ranges = parse_sqref(&attr_string(&e, b"sqref").unwrap_or_default());
                let xml = capture_element(reader, xml, &e, pos)?;
                validations.push(DataValidation { ranges, xml });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"dataValidation" => {
                let ranges = parse_sqref(&attr_string(&e, b"sqref").unwrap_or_default());
                let xml = capture_empty(reader, xml, pos)?;
                validations.push(DataValidation { ranges, xml });
            }
            Event::End(e) if e.local_name().as_ref() == b"dataValidations" => break,
            Event::Eof => bail!("Unterminated <dataValidations>"),
            _ => {}
        }
    }
    Ok(validations)
}

fn parse_row_attrs(e: &BytesStart) -> Row {
    Row {
        height: attr_f64(e, b"ht"),
        custom_height: attr_bool(e, b"customHeight").unwrap_or(false),
        hidden: attr_bool(e, b"hidden").unwrap_or(false),
        outline_level: attr_u32(e, b"outlineLevel").unwrap_or(0) as u8,
        collapsed: attr_bool(e, b"collapsed").unwrap_or(false),
        style: attr_bool(e, b"customFormat")
            .filter(|custom| *custom)
            .and_then(|_| attr_u32(e, b"s")),
        extra: attrs_except(
            e,
            &[
                b"r",
                b"spans",
                b"ht",
                b"customHeight",
                b"hidden",
                b"outlineLevel",
                b"collapsed",
                b"s",
                b"customFormat",
            ],
        ),
        cells: BTreeMap::new(),
    }
}

fn parse_sheet_data(reader: &mut Reader<&[u8]>) -> Result<BTreeMap<u32, Row>> {
    let mut rows = BTreeMap::new();
    let mut row_idx = 0u32;
    let mut col_idx = 0u32;
    let mut current: Option<Row> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                row_idx = attr_u32(&e, b"r").unwrap_or(row_idx + 1);
                col_idx = 0;
                current = Some(parse_row_attrs(&e));
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                row_idx = attr_u32(&e, b"r").unwrap_or(row_idx + 1);
                rows.insert(row_idx, parse_row_attrs(&e));
            }
            Event::End(e) if e.local_name().as_ref() == b"row" => {
                if let Some(row) = current.take() {
                    rows.insert(row_idx, row);
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                col_idx = cell_column(&e, col_idx);
                let cell = parse_cell(reader, &e)?;
                if let Some(row) = current.as_mut() {
                    row.cells.insert(col_idx, cell);
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                col_idx = cell_column(&e, col_idx);
                let cell = Cell {
                    style: attr_u32(&e, b"s").unwrap_or(0),
                    value: CellValue::Empty,
                    formula: None,
                    extra: attrs_except(&e, &[b"r", b"s", b"t"]),
                };
                if let Some(row) = current.as_mut() {
                    row.cells.insert(col_idx, cell);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => break,
            Event::Eof => bail!("Unterminated <sheetData>"),
            _ => {}
        }
    }

    Ok(rows)
}

fn cell_column(e: &BytesStart, previous: u32) -> u32 {
    attr_string(e, b"r")
        .and_then(|r| CellRef::parse(&r))
        .map(|at| at.col)
        .unwrap_or(previous + 1)
}

fn parse_cell(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<Cell> {
    let cell_type = attr_string(start, b"t").unwrap_or_default();
    let mut raw_value: Option<String> = None;
    let mut inline_text: Option<String> = None;
    let mut formula = None;
    let mut in_inline = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => raw_value = Some(read_element_text(reader, &e)?),
                b"f" => {
                    let text = read_element_text(reader, &e)?;
                    formula = Some(Formula {
                        text,
                        attrs: attrs_except(&e, &[]),
                    });
                }
                b"is" => {
                    in_inline = true;
                    inline_text = Some(String::new());
                }
                b"t" if in_inline => {
                    let text = read_element_text(reader, &e)?;
                    if let Some(inline) = inline_text.as_mut() {
                        inline.push_str(&text);
                    }
                }
                b"rPh" => {
                    reader.read_to_end(e.name())?;
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                formula = Some(Formula {
                    text: String::new(),
                    attrs: attrs_except(&e, &[]),
                });
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"is" => in_inline = false,
                b"c" => break,
                _ => {}
            },
            Event::Eof => bail!("Unterminated <c>"),
            _ => {}
        }
    }

    let value = match cell_type.as_str() {
        "inlineStr" => inline_text.map(CellValue::Text).unwrap_or_default(),
        _ => match raw_value {
            None => CellValue::Empty,
            Some(raw) => match cell_type.as_str() {
                "s" => raw
                    .trim()
                    .parse()
                    .map(CellValue::SharedString)
                    .unwrap_or_default(),
                "b" => CellValue::Bool(raw.trim() == "1"),
                "e" => CellValue::Error(raw),
                "str" => CellValue::Text(raw),
                "d" => CellValue::IsoDate(raw),
                _ => raw
                    .trim()
                    .parse()
                    .map(CellValue::Number)
                    .unwrap_or(CellValue::Text(raw)),
            },
        },
    };

    Ok(Cell {
        style: attr_u32(start, b"s").unwrap_or(0),
        value,
        formula,
        extra: attrs_except(start, &[b"r", b"s", b"t"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetPr><pageSetUpPr fitToPage="1"/></sheetPr><dimension ref="A1:C5"/><sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews><sheetFormatPr defaultRowHeight="15"/><cols><col min="1" max="2" width="18.5" customWidth="1"/><col min="3" max="3" width="9" hidden="1"/></cols><sheetData><row r="1" spans="1:3" ht="24" customHeight="1"><c r="A1" s="1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>inline</t></is></c><c r="C1"><f>1+2</f><v>3</v></c></row><row r="3"><c r="B3" s="2"/><c r="C3" t="b"><v>1</v></c></row><row r="5" hidden="1"/></sheetData><mergeCells count="1"><mergeCell ref="B3:B5"/></mergeCells><dataValidations count="1"><dataValidation type="list" sqref="C3 C4"><formula1>"Y,N"</formula1></dataValidation></dataValidations><hyperlinks><hyperlink ref="A1" location="Sheet2!A1" display="jump"/></hyperlinks><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/><drawing r:id="rId1" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"/></worksheet>"#;

    #[test]
    fn test_parse_worksheet_grid() {
        let sheet = parse_worksheet("Template", SHEET).unwrap();

        let a1 = sheet.cell(CellRef::new(1, 1)).unwrap();
        assert_eq!(a1.value, CellValue::SharedString(0));
        assert_eq!(a1.style, 1);
        assert_eq!(
            sheet.cell(CellRef::new(1, 2)).unwrap().value,
            CellValue::Text("inline".into())
        );
        let c1 = sheet.cell(CellRef::new(1, 3)).unwrap();
        assert_eq!(c1.formula.as_ref().unwrap().text, "1+2");
        assert_eq!(c1.value, CellValue::Number(3.0));
        assert_eq!(sheet.cell(CellRef::new(3, 3)).unwrap().value, CellValue::Bool(true));

        let row1 = sheet.row(1).unwrap();
        assert_eq!(row1.height, Some(24.0));
        assert!(row1.custom_height);
        assert!(sheet.row(5).unwrap().hidden);
    }

    #[test]
    fn test_parse_worksheet_structure() {
        let sheet = parse_worksheet("Template", SHEET).unwrap();

        assert_eq!(sheet.columns().len(), 2);
        assert_eq!(sheet.column(2).unwrap().width, Some(18.5));
        assert!(sheet.column(3).unwrap().hidden);
        assert_eq!(sheet.merges()[0].to_string(), "B3:B5");
        assert!(sheet.validation_at(CellRef::new(4, 3)).is_some());
        assert_eq!(
            sheet.hyperlink_at(CellRef::new(1, 1)).unwrap().attr("location"),
            Some("Sheet2!A1")
        );
        assert_eq!(sheet.drawing_rel.as_deref(), Some("rId1"));
        assert!(sheet.section("sheetPr").unwrap().contains("fitToPage"));
        assert!(sheet.section("pageMargins").is_some());
        assert!(sheet.section("dimension").is_none());
        assert!(sheet.root_tag.contains("xmlns:r="));
    }

    #[test]
    fn test_malformed_merge_dropped() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/><mergeCells count="2"><mergeCell ref="A1:B2"/><mergeCell ref="ZZZZ1:A"/></mergeCells></worksheet>"#;
        let sheet = parse_worksheet("S", xml).unwrap();
        assert_eq!(sheet.merges().len(), 1);
    }

    #[test]
    fn test_chartsheet_rejected() {
        let xml = r#"<chartsheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><drawing r:id="rId1"/></chartsheet>"#;
        assert!(parse_worksheet("Chart1", xml).is_err());
    }

    #[test]
    fn test_parse_shared_strings_skips_phonetic() {
        let xml = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3"><si><t>ITEM CODE</t></si><si><r><t>rich </t></r><r><t>text</t></r><rPh sb="0" eb="1"><t>yomi</t></rPh></si><si/></sst>"#;
        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["ITEM CODE", "rich text", ""]);
    }

    #[test]
    fn test_parse_workbook_xml() {
        let xml = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Template" sheetId="1" r:id="rId1"/><sheet name="Lists" sheetId="2" state="hidden" r:id="rId2"/></sheets><definedNames><definedName name="_xlnm.Print_Area" localSheetId="0">Template!$A$1:$D$20</definedName><definedName name="Codes">Lists!$A:$A</definedName></definedNames></workbook>"#;
        let entries = parse_workbook_xml(xml).unwrap();
        assert_eq!(entries.sheets.len(), 2);
        assert_eq!(entries.sheets[1].state.as_deref(), Some("hidden"));
        assert_eq!(entries.sheets[0].rel_id, "rId1");
        assert_eq!(entries.defined_names[0].local_sheet_id, Some(0));
        assert_eq!(entries.defined_names[1].formula, "Lists!$A:$A");
    }

    #[test]
    fn test_parse_comments() {
        let xml = r#"<comments xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><authors><author>qa</author></authors><commentList><comment ref="B2" authorId="0"><text><r><t>check </t></r><r><t>lot</t></r></text></comment></commentList></comments>"#;
        let notes = parse_comments(xml).unwrap();
        assert_eq!(notes.get(&CellRef::new(2, 2)).map(|s| s.as_str()), Some("check lot"));
    }
}
