mod common;

use anyhow::Result;
use common::{MockSheet, MockWorkbook, part_names, read_part, values_sheet_xml};
use labelcraft_core::{
    FieldMappingConfig, GenerateError, GeneratorConfig, extract_mapped_values, read_workbook_bytes,
    stamp_label_qr_codes,
};

const LABEL_MAPPING: &str = r#"{
    "globalRows": [
        {"id": "item", "itemDataCell": "B2", "itemQRCell": "C2", "itemDataLabel": "ITEM CODE"},
        {"id": "lot", "itemDataCell": "B3", "itemQRCell": "", "itemDataLabel": "LOT"}
    ],
    "systems": [
        {
            "id": "print",
            "name": "PRINT LABEL",
            "dataRows": [
                {"id": "r1", "itemDataCell": "BF15", "itemQRCell": "BH15", "type": "BOX"},
                {"id": "r2", "itemDataCell": "BF16", "itemQRCell": "BH16", "type": "BAG"},
                {"id": "r3", "itemDataCell": "BF17", "itemQRCell": "BH17", "type": "MATCHING"}
            ]
        },
        {
            "id": "box",
            "name": "BOXPACK",
            "isVisible": false,
            "dataRows": [
                {"id": "b1", "itemDataCell": "A1", "itemQRCell": "A2", "type": "BOX"}
            ]
        }
    ]
}"#;

fn mapping() -> FieldMappingConfig {
    FieldMappingConfig::from_json(LABEL_MAPPING).unwrap()
}

/// Two generated sheets as a spreadsheet application saves them after
/// recalculation: label rows hold formulas with cached results
fn recalculated_workbook() -> Result<Vec<u8>> {
    let mut workbook = MockWorkbook::new();
    workbook.sheets.push(MockSheet::new(
        "Template_1",
        values_sheet_xml(&[
            ("A1", "BOX-1"),
            ("B2", "ABC-001"),
            ("BF15", "=CONCATENATE(B2,B3)|ABC-001    LOT 7"),
            ("BF16", "=IF(ISBLANK(B4),B5,B4)|-"),
            ("BF17", "=B4|"),
        ]),
    ));
    workbook.sheets.push(MockSheet::new(
        "Template_2",
        values_sheet_xml(&[("BF15", "=B2|XYZ-9"), ("BF16", "=B3|LOT 8")]),
    ));
    Ok(workbook.build()?)
}

#[test]
fn test_stamp_places_label_qr_codes() -> Result<()> {
    let stamped = stamp_label_qr_codes(&recalculated_workbook()?, &mapping(), 2, &GeneratorConfig::default())?;

    let parts = part_names(&stamped)?;
    let media: Vec<_> = parts.iter().filter(|p| p.starts_with("xl/media/")).collect();
    // Sheet 1: BF15 only ("-" and blank are skipped). Sheet 2: BF15 and BF16.
    assert_eq!(media.len(), 3);

    let first = read_part(&stamped, "xl/drawings/drawing1.xml")?;
    assert!(first.contains(r#"descr="ABC-001 LOT 7""#));
    // BH15: zero-based column 59, row 14, anchored as configured
    assert!(first.contains("<xdr:col>59</xdr:col>"));
    assert!(first.contains("<xdr:row>14</xdr:row>"));
    assert!(first.contains(&format!(r#"cx="{}""#, 50 * 9525)));
    assert!(!first.contains(r#"descr="-""#));

    let second = read_part(&stamped, "xl/drawings/drawing2.xml")?;
    assert!(second.contains(r#"descr="XYZ-9""#));
    assert!(second.contains(r#"descr="LOT 8""#));

    // Cell content is left as it was
    let workbook = read_workbook_bytes(&stamped)?;
    assert_eq!(workbook.value_text(0, labelcraft_core::CellRef::parse("BF16").unwrap()), "-");
    Ok(())
}

#[test]
fn test_stamp_skips_missing_sheets() -> Result<()> {
    let stamped = stamp_label_qr_codes(&recalculated_workbook()?, &mapping(), 5, &GeneratorConfig::default())?;
    let workbook = read_workbook_bytes(&stamped)?;
    assert_eq!(workbook.sheet_names(), vec!["Template_1", "Template_2"]);

    let images = part_names(&stamped)?
        .into_iter()
        .filter(|p| p.starts_with("xl/media/"))
        .count();
    assert_eq!(images, 3);
    Ok(())
}

#[test]
fn test_stamp_requires_rows() {
    let err = stamp_label_qr_codes(&recalculated_workbook().unwrap(), &mapping(), 0, &GeneratorConfig::default())
        .unwrap_err();
    assert!(matches!(err, GenerateError::InvalidRequest(_)));
    assert_eq!(err.status_code(), 400);
}

#[test]
fn test_stamp_rejects_non_workbooks() {
    let err = stamp_label_qr_codes(b"not a zip", &mapping(), 1, &GeneratorConfig::default()).unwrap_err();
    assert_eq!(err.status_code(), 500);
}

#[test]
fn test_extract_reads_first_sheet() -> Result<()> {
    let labels = extract_mapped_values(&recalculated_workbook()?, &mapping())?;
    assert_eq!(labels.sheet, "Template_1");

    assert_eq!(labels.global_data.len(), 2);
    assert_eq!(labels.global_data[0].label.as_deref(), Some("ITEM CODE"));
    assert_eq!(labels.global_data[0].data.as_deref(), Some("ABC-001"));
    assert_eq!(labels.global_data[0].qr, None);
    // Unmapped QR cell
    assert_eq!(labels.global_data[1].qr, None);
    assert_eq!(labels.global_data[1].data, None);

    // Hidden systems are reported too
    assert_eq!(labels.systems_data.len(), 2);
    let print = &labels.systems_data[0];
    assert_eq!(print.system_name, "PRINT LABEL");
    assert_eq!(print.rows[0].data.as_deref(), Some("ABC-001    LOT 7"));
    assert_eq!(print.rows[1].data.as_deref(), Some("-"));
    assert_eq!(print.rows[2].data, None);
    assert_eq!(print.rows[2].kind.as_deref(), Some("MATCHING"));
    assert_eq!(labels.systems_data[1].rows[0].data.as_deref(), Some("BOX-1"));
    Ok(())
}

#[test]
fn test_extract_serializes_nulls() -> Result<()> {
    let labels = extract_mapped_values(&recalculated_workbook()?, &mapping())?;
    let json = serde_json::to_value(&labels)?;

    assert!(json["globalData"][0]["qr"].is_null());
    assert_eq!(json["systemsData"][0]["systemName"], "PRINT LABEL");
    assert_eq!(json["systemsData"][0]["rows"][0]["type"], "BOX");
    assert!(json["systemsData"][0]["rows"][2]["data"].is_null());
    Ok(())
}
