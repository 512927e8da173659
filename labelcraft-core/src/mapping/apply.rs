//! Writes mapped row values into a cloned sheet and plans the QR codes that go with them

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::roles::{FieldAction, FieldRole, GlobalField};
use super::{DataRow, FieldMappingConfig, SystemConfig, mapped_cell};
use crate::lookup::{EnrichmentLookup, EnrichmentRecord, lookup_item};
use crate::qr::QrRequest;
use crate::reader::{CalculatedValues, Worksheet};
use crate::resolve::resolve_writable_cell;

/// Source values rendered as this text get no label QR
const PLACEHOLDER: &str = "-";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Write the global rows of `config` for one data row.
///
/// Fields without a value for this row are left alone: no write and no QR, so
/// template placeholder text survives.
pub fn apply_global_fields(
    sheet: &mut Worksheet,
    row: &DataRow,
    config: &FieldMappingConfig,
    display_px: u32,
) -> Result<Vec<QrRequest>> {
    let mut requests = Vec::new();

    for field in &config.global_rows {
        let value = GlobalField::from_id(&field.id).value(row);
        if value.is_empty() {
            debug!(sheet = %sheet.name(), field = %field.id, "Skipping global field without a value");
            continue;
        }

        if let Some(at) = mapped_cell(&field.item_data_cell)? {
            let target = resolve_writable_cell(sheet, at);
            sheet.set_value(target, value)?;
        }

        if let Some(at) = mapped_cell(&field.item_qr_cell)? {
            let target = resolve_writable_cell(sheet, at);
            requests.push(QrRequest::new(target, value, display_px));
        }
    }

    Ok(requests)
}

/// Write the flat fields of a PROMOS SYSTEM section and plan its composite QR code
pub fn apply_promos_system(
    sheet: &mut Worksheet,
    row: &DataRow,
    system: &SystemConfig,
    lookup: &dyn EnrichmentLookup,
    display_px: u32,
) -> Result<Vec<QrRequest>> {
    let record = lookup_item(lookup, row.item_code())?;
    let mut qr_cell = None;

    for field in &system.fields {
        let Some(at) = mapped_cell(&field.cell)? else {
            continue;
        };

        match FieldRole::from_label(&field.label).action(row, record.as_ref()) {
            FieldAction::QrDestination => qr_cell = Some(resolve_writable_cell(sheet, at)),
            FieldAction::Write("") => {
                debug!(sheet = %sheet.name(), field = %field.label, "Skipping system field without a value");
            }
            FieldAction::Write(value) => {
                let target = resolve_writable_cell(sheet, at);
                sheet.set_value(target, value)?;
            }
            FieldAction::Ignore => {
                debug!(system = %system.name, field = %field.label, "Ignoring unrecognized field label");
            }
        }
    }

    Ok(qr_cell
        .map(|at| QrRequest::new(at, promos_payload(row, record.as_ref()), display_px))
        .into_iter()
        .collect())
}

/// Composite PROMOS payload. Missing values render as empty text.
pub fn promos_payload(row: &DataRow, record: Option<&EnrichmentRecord>) -> String {
    let item_aps = record.map(|r| r.item_aps()).unwrap_or_default();
    let product = record.map(|r| r.product()).unwrap_or_default();
    format!(
        "@1{}@2{}@3{}(E@02){}(E@05){}(E@06){}(E@07)Production Record(E@08){}(E@099)For Split",
        item_aps,
        row.external_lot(),
        row.order_no(),
        row.item_code(),
        row.external_lot(),
        row.qty(),
        product,
    )
}

/// Plan QR codes for the row pairs of a label system from calculated values.
///
/// QR codes are anchored at the configured QR cell as written. Pairs with a
/// blank or `-` source value are skipped.
pub fn plan_label_rows(
    system: &SystemConfig,
    sheet_name: &str,
    values: &dyn CalculatedValues,
    display_px: u32,
) -> Result<Vec<QrRequest>> {
    let mut requests = Vec::new();

    for pair in &system.data_rows {
        let (Some(data_cell), Some(qr_cell)) =
            (mapped_cell(&pair.item_data_cell)?, mapped_cell(&pair.item_qr_cell)?)
        else {
            continue;
        };

        let raw = values.cell_text(sheet_name, data_cell).unwrap_or_default();
        let value = normalize_whitespace(&raw);
        if value.is_empty() || value == PLACEHOLDER {
            debug!(sheet = %sheet_name, cell = %data_cell, "Skipping label row without a value");
            continue;
        }

        requests.push(QrRequest::new(qr_cell, value, display_px));
    }

    Ok(requests)
}

/// Collapse whitespace runs to one space and trim
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{CellRange, CellRef};
    use crate::lookup::{NoLookup, TableLookup};
    use crate::mapping::{DataField, SystemField};
    use crate::reader::CellValue;
    use std::collections::HashMap;

    fn at(s: &str) -> CellRef {
        CellRef::parse(s).unwrap()
    }

    fn row() -> DataRow {
        DataRow {
            order_no: Some("PO1".into()),
            item_code: Some("ABC-001".into()),
            external_lot: Some("LOT1".into()),
            qty: Some("12".into()),
            ..DataRow::default()
        }
    }

    fn global(id: &str, data: &str, qr: &str) -> DataField {
        DataField {
            id: id.into(),
            item_data_cell: data.into(),
            item_qr_cell: qr.into(),
            ..DataField::default()
        }
    }

    fn promos(fields: &[(&str, &str)]) -> SystemConfig {
        SystemConfig {
            id: "promos".into(),
            name: "PROMOS SYSTEM".into(),
            fields: fields
                .iter()
                .map(|(label, cell)| SystemField {
                    label: label.to_string(),
                    cell: cell.to_string(),
                })
                .collect(),
            data_rows: Vec::new(),
            is_visible: true,
        }
    }

    #[test]
    fn test_global_fields_write_and_request_qr() {
        let mut sheet = Worksheet::new("Template_1");
        sheet.merge_cells(CellRange::parse("C3:C4").unwrap()).unwrap();
        let config = FieldMappingConfig {
            global_rows: vec![global("item", "C4", "D3"), global("qty", "E3", "")],
            systems: Vec::new(),
        };

        let requests = apply_global_fields(&mut sheet, &row(), &config, 60).unwrap();

        assert_eq!(sheet.cell(at("C3")).unwrap().value, CellValue::Text("ABC-001".into()));
        assert_eq!(sheet.cell(at("E3")).unwrap().value, CellValue::Text("12".into()));
        assert_eq!(requests, vec![QrRequest::new(at("D3"), "ABC-001", 60)]);
    }

    #[test]
    fn test_empty_global_value_writes_nothing() {
        let mut sheet = Worksheet::new("Template_1");
        sheet.set_value(at("C3"), "placeholder").unwrap();
        let config = FieldMappingConfig {
            global_rows: vec![global("item", "C3", "D3"), global("unknown", "F3", "G3")],
            systems: Vec::new(),
        };
        let mut row = row();
        row.item_code = Some(String::new());

        let requests = apply_global_fields(&mut sheet, &row, &config, 60).unwrap();

        assert!(requests.is_empty());
        assert_eq!(sheet.cell(at("C3")).unwrap().value, CellValue::Text("placeholder".into()));
        assert!(sheet.cell(at("F3")).is_none());
    }

    #[test]
    fn test_promos_with_lookup_hit() {
        let mut table = TableLookup::default();
        table.insert(
            "ABC",
            EnrichmentRecord {
                item_aps: Some("APS-9".into()),
                product: Some("Widget".into()),
            },
        );
        let system = promos(&[
            ("ITEM CODE", "B2"),
            ("LOT", "B3"),
            ("ORDER NO.", "B4"),
            ("ITEM APS", "B5"),
            ("QR CODE", "D2"),
            ("REMARK", "B6"),
            ("LOT", ""),
        ]);
        let mut sheet = Worksheet::new("Template_1");

        let requests = apply_promos_system(&mut sheet, &row(), &system, &table, 60).unwrap();

        assert_eq!(sheet.cell(at("B2")).unwrap().value, CellValue::Text("ABC-001".into()));
        assert_eq!(sheet.cell(at("B4")).unwrap().value, CellValue::Text("PO1".into()));
        assert_eq!(sheet.cell(at("B5")).unwrap().value, CellValue::Text("APS-9".into()));
        assert!(sheet.cell(at("B6")).is_none());
        assert!(sheet.cell(at("D2")).is_none());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].anchor, at("D2"));
        assert_eq!(
            requests[0].payload,
            "@1APS-9@2LOT1@3PO1(E@02)ABC-001(E@05)LOT1(E@06)12(E@07)Production Record(E@08)Widget(E@099)For Split"
        );
    }

    #[test]
    fn test_promos_lookup_miss_renders_empty_segments() {
        let system = promos(&[("ITEM APS", "B5"), ("QR CODE", "D2")]);
        let mut sheet = Worksheet::new("Template_1");
        let mut row = row();
        row.qty = None;

        let requests = apply_promos_system(&mut sheet, &row, &system, &NoLookup, 60).unwrap();

        assert!(sheet.cell(at("B5")).is_none());
        let payload = &requests[0].payload;
        assert!(payload.starts_with("@1@2LOT1@3PO1(E@02)ABC-001"));
        assert!(payload.contains("(E@06)(E@07)"));
        assert!(payload.contains("(E@08)(E@099)For Split"));
        assert!(!payload.contains("null"));
    }

    #[test]
    fn test_promos_without_qr_field() {
        let system = promos(&[("LOT", "B3")]);
        let mut sheet = Worksheet::new("Template_1");
        let requests = apply_promos_system(&mut sheet, &row(), &system, &NoLookup, 60).unwrap();
        assert!(requests.is_empty());
    }

    struct Values(HashMap<(String, CellRef), String>);

    impl CalculatedValues for Values {
        fn sheet_names(&self) -> Vec<String> {
            vec!["Template_1".into()]
        }

        fn cell_text(&self, sheet: &str, at: CellRef) -> Option<String> {
            if sheet != "Template_1" {
                return None;
            }
            Some(self.0.get(&(sheet.to_string(), at)).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn test_label_rows_skip_placeholders() {
        let values = Values(HashMap::from([
            (("Template_1".to_string(), at("BF15")), "  BOX  12\n A ".to_string()),
            (("Template_1".to_string(), at("BF16")), " - ".to_string()),
            (("Template_1".to_string(), at("BF17")), "\t".to_string()),
        ]));
        let system = SystemConfig {
            id: "print".into(),
            name: "PRINT LABEL".into(),
            fields: Vec::new(),
            data_rows: vec![
                global("r1", "BF15", "BG15"),
                global("r2", "BF16", "BG16"),
                global("r3", "BF17", "BG17"),
                global("r4", "BF18", "BG18"),
                global("r5", "BF19", ""),
            ],
            is_visible: true,
        };

        let requests = plan_label_rows(&system, "Template_1", &values, 50).unwrap();
        assert_eq!(requests, vec![QrRequest::new(at("BG15"), "BOX 12 A", 50)]);

        let missing = plan_label_rows(&system, "Template_9", &values, 50).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \t b\n\nc  "), "a b c");
        assert_eq!(normalize_whitespace(" \u{a0} "), "");
    }
}
