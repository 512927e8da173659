#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Border 1 draws a thin bottom edge, border 2 a medium right edge.
/// Cell format n uses border n.
pub const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>
<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
<borders count="3">
<border><left/><right/><top/><bottom/><diagonal/></border>
<border><left/><right/><top/><bottom style="thin"><color indexed="64"/></bottom><diagonal/></border>
<border><left/><right style="medium"><color indexed="64"/></right><top/><bottom/><diagonal/></border>
</borders>
<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
<cellXfs count="3">
<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
<xf numFmtId="0" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1"/>
<xf numFmtId="0" fontId="0" fillId="0" borderId="2" xfId="0" applyBorder="1"/>
</cellXfs>
<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>"#;

/// The label layout: B3:B5 merged with "X" in B3 and a bottom border on B5,
/// D4:D5 merged with a right border on D5, a placeholder in C3 and a formula
/// in F6.
pub fn template_sheet_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{MAIN_NS}" xmlns:r="{REL_NS}">
<sheetPr><tabColor rgb="FF00B050"/></sheetPr>
<dimension ref="A1:F6"/>
<sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews>
<sheetFormatPr defaultRowHeight="15"/>
<cols><col min="2" max="2" width="24.5" customWidth="1"/><col min="4" max="4" width="12" customWidth="1"/></cols>
<sheetData>
<row r="1" ht="30" customHeight="1"><c r="A1" t="inlineStr"><is><t>LABEL</t></is></c></row>
<row r="2"/>
<row r="3"><c r="B3" t="s"><v>0</v></c><c r="C3" t="inlineStr"><is><t>placeholder</t></is></c></row>
<row r="4"><c r="B4"/><c r="D4"/></row>
<row r="5"><c r="B5" s="1"/><c r="D5" s="2"/></row>
<row r="6"><c r="F6"><f>1+1</f><v>2</v></c></row>
</sheetData>
<mergeCells count="2"><mergeCell ref="B3:B5"/><mergeCell ref="D4:D5"/></mergeCells>
<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>
</worksheet>"#
    )
}

/// A sheet with the given `(cell, value)` pairs. Values starting with `=`
/// become formulas whose cached result is the text after `|`.
pub fn values_sheet_xml(cells: &[(&str, &str)]) -> String {
    let mut rows: std::collections::BTreeMap<u32, String> = Default::default();
    for (cell, value) in cells {
        let row: u32 = cell
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .expect("cell row");
        let xml = match value.strip_prefix('=') {
            Some(formula) => {
                let (formula, cached) = formula.split_once('|').unwrap_or((formula, ""));
                format!(r#"<c r="{cell}" t="str"><f>{formula}</f><v>{cached}</v></c>"#)
            }
            None => format!(r#"<c r="{cell}" t="inlineStr"><is><t>{value}</t></is></c>"#),
        };
        rows.entry(row).or_default().push_str(&xml);
    }

    let mut data = String::new();
    for (row, cells) in rows {
        data.push_str(&format!(r#"<row r="{row}">{cells}</row>"#));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheetData>{data}</sheetData></worksheet>"#
    )
}

pub struct MockSheet {
    pub name: String,
    pub xml: String,
    pub rels: Option<String>,
}

impl MockSheet {
    pub fn new(name: &str, xml: String) -> Self {
        Self {
            name: name.to_string(),
            xml,
            rels: None,
        }
    }
}

pub struct MockWorkbook {
    pub sheets: Vec<MockSheet>,
    pub defined_names: Vec<(String, Option<usize>, String)>,
    pub shared_strings: Vec<String>,
    /// Extra parts as (name, content type override, content)
    pub parts: Vec<(String, Option<String>, String)>,
}

impl MockWorkbook {
    pub fn new() -> Self {
        Self {
            sheets: Vec::new(),
            defined_names: Vec::new(),
            shared_strings: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// The label template with a print area scoped to it
    pub fn label_template() -> Self {
        let mut workbook = Self::new();
        workbook.sheets.push(MockSheet::new("Template", template_sheet_xml()));
        workbook.shared_strings.push("X".to_string());
        workbook
            .defined_names
            .push(("_xlnm.Print_Area".to_string(), Some(0), "Template!$A$1:$F$6".to_string()));
        workbook
    }

    pub fn build(&self) -> anyhow::Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        // 1. [Content_Types].xml
        zip.start_file("[Content_Types].xml", options)?;
        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
"#,
        );
        for (i, _) in self.sheets.iter().enumerate() {
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                i + 1
            ));
        }
        for (name, content_type, _) in &self.parts {
            if let Some(content_type) = content_type {
                content_types.push_str(&format!(
                    r#"<Override PartName="/{}" ContentType="{}"/>"#,
                    name, content_type
                ));
            }
        }
        content_types.push_str("</Types>");
        zip.write_all(content_types.as_bytes())?;

        // 2. _rels/.rels
        zip.start_file("_rels/.rels", options)?;
        zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#.as_bytes())?;

        // 3. xl/workbook.xml
        zip.start_file("xl/workbook.xml", options)?;
        let mut workbook_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}">
<bookViews><workbookView activeTab="0"/></bookViews>
<sheets>"#
        );
        for (i, sheet) in self.sheets.iter().enumerate() {
            workbook_xml.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                sheet.name,
                i + 1,
                i + 1
            ));
        }
        workbook_xml.push_str("</sheets>");
        if !self.defined_names.is_empty() {
            workbook_xml.push_str("<definedNames>");
            for (name, local, formula) in &self.defined_names {
                match local {
                    Some(id) => workbook_xml.push_str(&format!(
                        r#"<definedName name="{}" localSheetId="{}">{}</definedName>"#,
                        name, id, formula
                    )),
                    None => workbook_xml.push_str(&format!(
                        r#"<definedName name="{}">{}</definedName>"#,
                        name, formula
                    )),
                }
            }
            workbook_xml.push_str("</definedNames>");
        }
        workbook_xml.push_str(r#"<calcPr calcId="191029"/></workbook>"#);
        zip.write_all(workbook_xml.as_bytes())?;

        // 4. xl/_rels/workbook.xml.rels
        zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        let count = self.sheets.len();
        for i in 0..count {
            rels.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i + 1,
                i + 1
            ));
        }
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
            count + 1
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
            count + 2
        ));
        rels.push_str("</Relationships>");
        zip.write_all(rels.as_bytes())?;

        // 5. styles and shared strings
        zip.start_file("xl/styles.xml", options)?;
        zip.write_all(STYLES_XML.as_bytes())?;

        zip.start_file("xl/sharedStrings.xml", options)?;
        let mut sst = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="{MAIN_NS}" count="{0}" uniqueCount="{0}">"#,
            self.shared_strings.len()
        );
        for text in &self.shared_strings {
            sst.push_str(&format!("<si><t>{}</t></si>", text));
        }
        sst.push_str("</sst>");
        zip.write_all(sst.as_bytes())?;

        // 6. worksheets
        for (i, sheet) in self.sheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
            zip.write_all(sheet.xml.as_bytes())?;
            if let Some(rels) = &sheet.rels {
                zip.start_file(format!("xl/worksheets/_rels/sheet{}.xml.rels", i + 1), options)?;
                zip.write_all(rels.as_bytes())?;
            }
        }

        for (name, _, content) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(content.as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

/// Names of all parts in a package
pub fn part_names(bytes: &[u8]) -> anyhow::Result<Vec<String>> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Text of one part of a package
pub fn read_part(bytes: &[u8], name: &str) -> anyhow::Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut file = archive.by_name(name)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}
