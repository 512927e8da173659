//! Read the values currently sitting in mapped cells

use anyhow::{Context, Result};
use serde::Serialize;

use crate::mapping::{FieldMappingConfig, mapped_cell};
use crate::reader::{CalamineValues, CalculatedValues};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLabels {
    pub sheet: String,
    pub global_data: Vec<GlobalValue>,
    pub systems_data: Vec<SystemValues>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalValue {
    pub label: Option<String>,
    pub data: Option<String>,
    pub qr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemValues {
    pub system_name: String,
    pub rows: Vec<RowValues>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowValues {
    pub data: Option<String>,
    pub qr: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Values of every mapped cell on the first sheet of `bytes`. Blank or
/// unmapped cells come back as `None`.
pub fn extract_mapped_values(bytes: &[u8], mapping: &FieldMappingConfig) -> Result<ExtractedLabels> {
    let values = CalamineValues::from_bytes(bytes)?;
    let sheet = values
        .sheet_names()
        .into_iter()
        .next()
        .context("Workbook has no sheets")?;

    let read = |address: &str| -> Result<Option<String>> {
        let Some(at) = mapped_cell(address)? else {
            return Ok(None);
        };
        Ok(values.cell_text(&sheet, at).filter(|text| !text.is_empty()))
    };

    let mut global_data = Vec::with_capacity(mapping.global_rows.len());
    for row in &mapping.global_rows {
        global_data.push(GlobalValue {
            label: row.item_data_label.clone(),
            data: read(&row.item_data_cell)?,
            qr: read(&row.item_qr_cell)?,
        });
    }

    let mut systems_data = Vec::with_capacity(mapping.systems.len());
    for system in &mapping.systems {
        let mut rows = Vec::with_capacity(system.data_rows.len());
        for row in &system.data_rows {
            rows.push(RowValues {
                data: read(&row.item_data_cell)?,
                qr: read(&row.item_qr_cell)?,
                kind: row.kind.clone(),
            });
        }
        systems_data.push(SystemValues {
            system_name: system.name.clone(),
            rows,
        });
    }

    Ok(ExtractedLabels {
        sheet,
        global_data,
        systems_data,
    })
}
