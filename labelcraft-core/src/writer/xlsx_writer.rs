//! XLSX writer serializing the editable workbook model

use anyhow::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use tracing::debug;

use super::drawing::attach_images;
use super::worksheet::write_worksheet;
use crate::package::{
    CONTENT_TYPES_PART, content_types, rel_type, rels_path_for, relative_target, resolve_target,
};
use crate::reader::workbook::{DefinedName, Workbook};
use crate::xml_helpers::escape;

/// Children of `<workbook>` that follow `<definedNames>`, in schema order
const AFTER_DEFINED_NAMES: [&str; 10] = [
    "calcPr",
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

struct SheetEntry {
    name: String,
    sheet_id: usize,
    state: Option<String>,
    rel_id: String,
}

/// Serialize a workbook to xlsx bytes
pub fn write_workbook_bytes(workbook: &Workbook) -> Result<Vec<u8>> {
    let mut package = workbook.package.clone();
    let mut types = workbook.content_types.clone();
    let mut workbook_rels = workbook.workbook_rels.clone();
    let workbook_part = workbook.workbook_part.as_str();

    // Worksheets are renumbered, so every original worksheet part goes
    for rel in workbook_rels.remove_type(rel_type::WORKSHEET) {
        let part = resolve_target(workbook_part, &rel.target);
        package.remove_part(&part);
        package.remove_part(&rels_path_for(&part));
        types.remove_override(&part);
    }
    // The calculation chain lists cells of the original sheets
    for rel in workbook_rels.remove_type(rel_type::CALC_CHAIN) {
        let part = resolve_target(workbook_part, &rel.target);
        debug!(part = %part, "Dropping calculation chain");
        package.remove_part(&part);
        types.remove_override(&part);
    }

    let mut entries = Vec::with_capacity(workbook.sheets.len());
    for (index, sheet) in workbook.sheets.iter().enumerate() {
        let part = package.next_part_name("xl/worksheets", "sheet", "xml");
        let mut sheet_rels = sheet.relationships.clone();
        let drawing_rel = attach_images(&mut package, &mut types, sheet, &mut sheet_rels)?;

        package.set_part(part.clone(), write_worksheet(sheet, drawing_rel.as_deref()));
        if !sheet_rels.is_empty() {
            package.set_part(rels_path_for(&part), sheet_rels.to_xml());
        }
        types.set_override(&part, content_types::WORKSHEET);

        let rel_id = workbook_rels.add(rel_type::WORKSHEET, relative_target(workbook_part, &part));
        entries.push(SheetEntry {
            name: sheet.name.clone(),
            sheet_id: index + 1,
            state: sheet.state.clone(),
            rel_id,
        });
    }

    if let Some(rel) = workbook_rels.find_by_type(rel_type::STYLES) {
        let part = resolve_target(workbook_part, &rel.target);
        package.set_part(part, workbook.styles.to_xml());
    }

    let workbook_xml = rewrite_workbook_xml(
        &workbook.workbook_xml,
        &entries,
        &workbook.defined_names,
        workbook.full_calc_on_load,
    )?;
    package.set_part(workbook_part.to_string(), workbook_xml);
    package.set_part(rels_path_for(workbook_part), workbook_rels.to_xml());
    package.set_part(CONTENT_TYPES_PART, types.to_xml());

    debug!(sheets = entries.len(), parts = package.part_names().count(), "Serialized workbook");
    package.to_bytes()
}

fn sheets_xml(entries: &[SheetEntry]) -> String {
    let mut xml = String::from("<sheets>");
    for entry in entries {
        let _ = write!(
            xml,
            "<sheet name=\"{}\" sheetId=\"{}\"",
            escape(&entry.name),
            entry.sheet_id
        );
        if let Some(state) = &entry.state {
            let _ = write!(xml, " state=\"{}\"", escape(state));
        }
        let _ = write!(xml, " r:id=\"{}\"/>", escape(&entry.rel_id));
    }
    xml.push_str("</sheets>");
    xml
}

fn defined_names_xml(names: &[DefinedName]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let mut xml = String::from("<definedNames>");
    for name in names {
        let _ = write!(xml, "<definedName name=\"{}\"", escape(&name.name));
        if let Some(id) = name.local_sheet_id {
            let _ = write!(xml, " localSheetId=\"{}\"", id);
        }
        xml.push_str(&crate::xml_helpers::render_attrs(&name.attrs));
        let _ = write!(xml, ">{}</definedName>", escape(&name.formula));
    }
    xml.push_str("</definedNames>");
    xml
}

/// Stream workbook.xml, replacing the sheet list and defined names, resetting
/// the active tab and requesting a full recalculation when asked to.
///
/// Missing sections are inserted before the first child known to follow them.
/// Children the schema does not list, such as `mc:AlternateContent` or
/// `xr:revisionPtr`, are copied through where they are.
fn rewrite_workbook_xml(
    xml: &str,
    entries: &[SheetEntry],
    names: &[DefinedName],
    full_calc_on_load: bool,
) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut depth = 0usize;
    let mut names_written = false;
    let mut calc_written = false;

    loop {
        let event = reader.read_event()?;

        if depth == 1 {
            if let Event::Start(e) | Event::Empty(e) = &event {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if !names_written && AFTER_DEFINED_NAMES.contains(&tag.as_str()) {
                    writer.get_mut().write_all(defined_names_xml(names).as_bytes())?;
                    names_written = true;
                }
                if full_calc_on_load && !calc_written && AFTER_DEFINED_NAMES[1..].contains(&tag.as_str()) {
                    writer.get_mut().write_all(b"<calcPr fullCalcOnLoad=\"1\"/>")?;
                    calc_written = true;
                }
            }
        }

        match event {
            Event::Start(e) if depth == 1 && e.local_name().as_ref() == b"sheets" => {
                reader.read_to_end(e.name())?;
                writer.get_mut().write_all(sheets_xml(entries).as_bytes())?;
            }
            Event::Empty(e) if depth == 1 && e.local_name().as_ref() == b"sheets" => {
                writer.get_mut().write_all(sheets_xml(entries).as_bytes())?;
            }
            Event::Start(e) if depth == 1 && e.local_name().as_ref() == b"definedNames" => {
                reader.read_to_end(e.name())?;
                if !names_written {
                    writer.get_mut().write_all(defined_names_xml(names).as_bytes())?;
                    names_written = true;
                }
            }
            Event::Empty(e) if depth == 1 && e.local_name().as_ref() == b"definedNames" => {
                if !names_written {
                    writer.get_mut().write_all(defined_names_xml(names).as_bytes())?;
                    names_written = true;
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"workbookView" => {
                depth += 1;
                writer.write_event(Event::Start(without_active_tab(&e)))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"workbookView" => {
                writer.write_event(Event::Empty(without_active_tab(&e)))?;
            }
            Event::Empty(e) if depth == 1 && e.local_name().as_ref() == b"calcPr" => {
                if !calc_written {
                    let e = if full_calc_on_load { with_full_calc(&e) } else { e.into_owned() };
                    writer.write_event(Event::Empty(e))?;
                    calc_written = true;
                }
            }
            Event::Start(e) if depth == 1 && e.local_name().as_ref() == b"calcPr" => {
                if calc_written {
                    reader.read_to_end(e.name())?;
                } else {
                    depth += 1;
                    let e = if full_calc_on_load { with_full_calc(&e) } else { e.into_owned() };
                    writer.write_event(Event::Start(e))?;
                    calc_written = true;
                }
            }
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if !names_written {
                        writer.get_mut().write_all(defined_names_xml(names).as_bytes())?;
                        names_written = true;
                    }
                    if full_calc_on_load && !calc_written {
                        writer.get_mut().write_all(b"<calcPr fullCalcOnLoad=\"1\"/>")?;
                        calc_written = true;
                    }
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
    }

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

fn without_active_tab(e: &BytesStart) -> BytesStart<'static> {
    let mut view = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if matches!(attr.key.as_ref(), b"activeTab" | b"firstSheet") {
            continue;
        }
        view.push_attribute(attr);
    }
    view
}

fn with_full_calc(e: &BytesStart) -> BytesStart<'static> {
    let mut calc = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"fullCalcOnLoad" {
            continue;
        }
        calc.push_attribute(attr);
    }
    calc.push_attribute(("fullCalcOnLoad", "1"));
    calc
}
