mod common;

use anyhow::Result;
use common::{MockSheet, MockWorkbook, template_sheet_xml};
use labelcraft_core::reader::Edge;
use labelcraft_core::{CellRange, CellRef, clone_sheet, read_workbook_bytes, write_workbook_bytes};

fn at(s: &str) -> CellRef {
    CellRef::parse(s).unwrap()
}

fn template_with_validation() -> MockWorkbook {
    let xml = template_sheet_xml().replace(
        "<pageMargins",
        r#"<dataValidations count="1"><dataValidation type="list" allowBlank="1" sqref="C3"><formula1>"OK,NG"</formula1></dataValidation></dataValidations><pageMargins"#,
    );
    let mut workbook = MockWorkbook::label_template();
    workbook.sheets[0] = MockSheet::new("Template", xml);
    workbook
}

#[test]
fn test_clone_copies_layout() -> Result<()> {
    let mut workbook = read_workbook_bytes(&template_with_validation().build()?)?;
    let index = clone_sheet(&mut workbook, "Template", "Template_1")?;
    assert_eq!(index, 1);

    let clone = workbook.sheet_at(index).unwrap();
    assert_eq!(clone.name(), "Template_1");
    assert_eq!(clone.column(2).and_then(|c| c.width), Some(24.5));
    assert_eq!(clone.column(4).and_then(|c| c.width), Some(12.0));
    assert_eq!(clone.row(1).and_then(|r| r.height), Some(30.0));
    assert_eq!(
        clone.merges(),
        &[CellRange::parse("B3:B5").unwrap(), CellRange::parse("D4:D5").unwrap()]
    );
    assert!(clone.validation_at(at("C3")).is_some());
    assert!(clone.validation_at(at("C4")).is_none());

    assert_eq!(workbook.value_text(index, at("B3")), "X");
    assert_eq!(workbook.value_text(index, at("C3")), "placeholder");
    assert_eq!(
        clone.cell(at("F6")).and_then(|c| c.formula.as_ref()).map(|f| f.text.as_str()),
        Some("1+1")
    );
    Ok(())
}

#[test]
fn test_clone_survives_serialization() -> Result<()> {
    let mut workbook = read_workbook_bytes(&template_with_validation().build()?)?;
    clone_sheet(&mut workbook, "Template", "Template_1")?;
    clone_sheet(&mut workbook, "Template", "Template_2")?;

    let reread = read_workbook_bytes(&write_workbook_bytes(&workbook)?)?;
    assert_eq!(reread.sheet_names(), vec!["Template", "Template_1", "Template_2"]);

    let clone = reread.sheet_at(2).unwrap();
    assert_eq!(clone.column(2).and_then(|c| c.width), Some(24.5));
    assert!(clone.validation_at(at("C3")).is_some());
    assert_eq!(reread.value_text(2, at("F6")), "2");

    // The template keeps its own borders
    let styles = reread.styles();
    let template = reread.sheet_at(0).unwrap();
    let b5 = template.cell(at("B5")).map(|c| c.style).unwrap_or_default();
    assert!(styles.border_for_xf(b5).and_then(|b| b.side(Edge::Bottom)).is_some());
    Ok(())
}

#[test]
fn test_merge_clears_covered_cells() -> Result<()> {
    let mut workbook = read_workbook_bytes(&MockWorkbook::label_template().build()?)?;
    let template = workbook.sheet_index("Template").unwrap();
    workbook
        .sheet_at_mut(template)
        .unwrap()
        .set_value(at("B4"), "covered")?;

    let index = clone_sheet(&mut workbook, "Template", "Template_1")?;
    assert_eq!(workbook.value_text(index, at("B3")), "X");
    assert_eq!(workbook.value_text(index, at("B4")), "");
    Ok(())
}

#[test]
fn test_sheet_local_names_are_retargeted() -> Result<()> {
    let mut workbook = read_workbook_bytes(&MockWorkbook::label_template().build()?)?;
    let index = clone_sheet(&mut workbook, "Template", "Template_1")?;

    let cloned: Vec<_> = workbook
        .defined_names()
        .iter()
        .filter(|n| n.local_sheet_id == Some(index))
        .collect();
    assert_eq!(cloned.len(), 1);
    assert_eq!(cloned[0].name, "_xlnm.Print_Area");
    assert_eq!(cloned[0].formula, "'Template_1'!$A$1:$F$6");
    Ok(())
}

#[test]
fn test_clone_name_rules() -> Result<()> {
    let mut workbook = read_workbook_bytes(&MockWorkbook::label_template().build()?)?;

    assert!(clone_sheet(&mut workbook, "Missing", "Template_1").is_err());
    assert!(clone_sheet(&mut workbook, "Template", "Template").is_err());
    assert!(clone_sheet(&mut workbook, "Template", "a/b").is_err());
    assert!(clone_sheet(&mut workbook, "Template", &"x".repeat(32)).is_err());
    assert_eq!(workbook.sheets().len(), 1);
    Ok(())
}

#[test]
fn test_clone_of_sheet_with_drawing_gets_its_own_part() -> Result<()> {
    let mut mock = MockWorkbook::label_template();
    mock.sheets[0].xml = template_sheet_xml().replace(
        "<pageMargins left=\"0.7\" right=\"0.7\" top=\"0.75\" bottom=\"0.75\" header=\"0.3\" footer=\"0.3\"/>",
        "<pageMargins left=\"0.7\" right=\"0.7\" top=\"0.75\" bottom=\"0.75\" header=\"0.3\" footer=\"0.3\"/><drawing r:id=\"rId1\"/>",
    );
    mock.sheets[0].rels = Some(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing1.xml"/></Relationships>"#
            .to_string(),
    );
    mock.parts.push((
        "xl/drawings/drawing1.xml".to_string(),
        Some("application/vnd.openxmlformats-officedocument.drawing+xml".to_string()),
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"></xdr:wsDr>"#
            .to_string(),
    ));

    let mut workbook = read_workbook_bytes(&mock.build()?)?;
    clone_sheet(&mut workbook, "Template", "Template_1")?;
    let bytes = write_workbook_bytes(&workbook)?;

    let parts = common::part_names(&bytes)?;
    assert!(parts.iter().any(|p| p == "xl/drawings/drawing1.xml"));
    assert!(parts.iter().any(|p| p == "xl/drawings/drawing2.xml"));

    let rels = common::read_part(&bytes, "xl/worksheets/_rels/sheet2.xml.rels")?;
    assert!(rels.contains("drawing2.xml"));
    Ok(())
}
