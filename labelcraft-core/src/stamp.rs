//! QR codes for label rows of a generated workbook, read back after a
//! spreadsheet application has recalculated it

use anyhow::Context;
use tracing::{debug, info};

use crate::config::GeneratorConfig;
use crate::error::GenerateError;
use crate::generate::Stage;
use crate::mapping::{FieldMappingConfig, SystemRegistry};
use crate::qr::QrRequest;
use crate::reader::{CalamineValues, CalculatedValues, read_workbook_bytes};
use crate::writer::write_workbook_bytes;

/// Embed label QR codes into sheets `Template_1..=row_count` of `bytes`.
///
/// Values come from the formula results cached in the file, so the workbook
/// must have been saved by an application that calculated them. Sheets that do
/// not exist are skipped.
pub fn stamp_label_qr_codes(
    bytes: &[u8],
    mapping: &FieldMappingConfig,
    row_count: usize,
    config: &GeneratorConfig,
) -> Result<Vec<u8>, GenerateError> {
    if row_count == 0 {
        return Err(GenerateError::InvalidRequest("row count must be positive".to_string()));
    }
    mapping.validate().map_err(GenerateError::Config)?;

    let values = CalamineValues::from_bytes(bytes).map_err(|e| GenerateError::stage(Stage::Loaded, e))?;
    let mut workbook = read_workbook_bytes(bytes).map_err(|e| GenerateError::stage(Stage::Loaded, e))?;
    let systems = SystemRegistry::new();
    let display_px = config.qr.label_display_px;

    let mut planned: Vec<(usize, QrRequest)> = Vec::new();
    for i in 0..row_count {
        let name = config.template.clone_name(i);
        let Some(index) = workbook.sheet_index(&name) else {
            debug!(sheet = %name, "Sheet not in workbook, skipping");
            continue;
        };
        if !values.sheet_names().contains(&name) {
            debug!(sheet = %name, "Sheet has no calculated values, skipping");
            continue;
        }

        for system in mapping.visible_systems() {
            let Some(applier) = systems.get(&system.name) else {
                continue;
            };
            let requests = applier
                .stamp(system, &name, &values, display_px)
                .with_context(|| format!("Failed to plan '{}' labels on '{}'", system.name, name))
                .map_err(|e| GenerateError::stage(Stage::Populating, e))?;
            planned.extend(requests.into_iter().map(|request| (index, request)));
        }
    }

    let (indices, requests): (Vec<usize>, Vec<QrRequest>) = planned.into_iter().unzip();
    let images = config.renderer().render_all(&requests)?;
    let count = images.len();
    for (index, image) in indices.into_iter().zip(images) {
        if let Some(sheet) = workbook.sheet_at_mut(index) {
            sheet.add_image(image);
        }
    }

    let out = write_workbook_bytes(&workbook).map_err(|e| GenerateError::stage(Stage::Serializing, e))?;
    info!(images = count, "Label QR codes stamped");
    Ok(out)
}
