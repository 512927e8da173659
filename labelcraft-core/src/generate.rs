//! Batch generation: one populated clone of the template sheet per data row

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

use crate::clone::clone_sheet;
use crate::config::GeneratorConfig;
use crate::error::GenerateError;
use crate::lookup::{EnrichmentLookup, NoLookup, TableLookup};
use crate::mapping::registry::RowTarget;
use crate::mapping::{DataRow, FieldMappingConfig, SystemRegistry, apply_global_fields};
use crate::qr::{QrRenderer, QrRequest};
use crate::reader::Workbook;
use crate::storage::TemplateStore;
use crate::writer::write_workbook_bytes;

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Steps of one generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    Cloning,
    Populating,
    Serializing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loaded => "loaded",
            Stage::Cloning => "cloning",
            Stage::Populating => "populating",
            Stage::Serializing => "serializing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// `{"templateId": "...", "rows": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub template_id: String,
    #[serde(default)]
    pub rows: Vec<DataRow>,
}

impl GenerateRequest {
    pub fn from_json(json: &str) -> Result<Self, GenerateError> {
        let request: GenerateRequest =
            serde_json::from_str(json).map_err(|e| GenerateError::InvalidRequest(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), GenerateError> {
        if self.template_id.trim().is_empty() {
            return Err(GenerateError::InvalidRequest("missing template id".to_string()));
        }
        if self.rows.is_empty() {
            return Err(GenerateError::InvalidRequest("no rows to generate".to_string()));
        }
        Ok(())
    }
}

/// Serialized output of a run
#[derive(Debug, Clone)]
pub struct GeneratedWorkbook {
    /// `{templateId}_{unix millis}.xlsx`
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub sheet_count: usize,
    pub image_count: usize,
}

impl GeneratedWorkbook {
    pub fn content_type(&self) -> &'static str {
        XLSX_CONTENT_TYPE
    }
}

/// Owns everything shared across generation requests. Each request works on
/// its own workbook, so one generator may serve requests concurrently.
pub struct Generator {
    config: GeneratorConfig,
    store: TemplateStore,
    lookup: Box<dyn EnrichmentLookup>,
    systems: SystemRegistry,
    renderer: QrRenderer,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let lookup: Box<dyn EnrichmentLookup> = match &config.lookup.table {
            Some(path) => Box::new(TableLookup::from_file(path)?),
            None => Box::new(NoLookup),
        };

        Ok(Self {
            store: TemplateStore::from_config(&config.storage),
            renderer: config.renderer(),
            systems: SystemRegistry::new(),
            lookup,
            config,
        })
    }

    /// Replace the enrichment lookup
    pub fn with_lookup(mut self, lookup: impl EnrichmentLookup + 'static) -> Self {
        self.lookup = Box::new(lookup);
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Load the template and its mapping from storage and generate
    pub fn generate(&self, request: &GenerateRequest) -> Result<GeneratedWorkbook, GenerateError> {
        request.validate()?;
        let template_id = request.template_id.as_str();

        let result = self.store.load_template(template_id).and_then(|workbook| {
            let mapping = self.store.load_config(template_id)?;
            self.run(template_id, workbook, &mapping, &request.rows)
        });

        if let Err(err) = &result {
            error!(stage = %Stage::Failed, template = %template_id, error = %err, "Generation failed");
        }
        result
    }

    /// Generate from an already loaded template workbook and mapping
    pub fn generate_from(
        &self,
        template_id: &str,
        workbook: Workbook,
        mapping: &FieldMappingConfig,
        rows: &[DataRow],
    ) -> Result<GeneratedWorkbook, GenerateError> {
        let result = self.run(template_id, workbook, mapping, rows);
        if let Err(err) = &result {
            error!(stage = %Stage::Failed, template = %template_id, error = %err, "Generation failed");
        }
        result
    }

    fn run(
        &self,
        template_id: &str,
        mut workbook: Workbook,
        mapping: &FieldMappingConfig,
        rows: &[DataRow],
    ) -> Result<GeneratedWorkbook, GenerateError> {
        if rows.is_empty() {
            return Err(GenerateError::InvalidRequest("no rows to generate".to_string()));
        }
        mapping.validate().map_err(GenerateError::Config)?;
        self.check_systems(mapping)?;
        info!(stage = %Stage::Loaded, template = %template_id, rows = rows.len(), "Template loaded");

        info!(stage = %Stage::Cloning, template = %template_id, "Cloning template sheet");
        let clones = self.clone_template(&mut workbook, rows.len())?;

        info!(stage = %Stage::Populating, template = %template_id, "Writing row data");
        let planned = self
            .populate(&mut workbook, &clones, mapping, rows)
            .map_err(|e| GenerateError::stage(Stage::Populating, e))?;
        let image_count = self.embed(&mut workbook, planned)?;

        for index in 1..workbook.sheets().len() {
            if let Some(sheet) = workbook.sheet_at_mut(index) {
                sheet.deselect_tab();
            }
        }
        workbook.full_calc_on_load = self.config.output.full_calc_on_load;

        info!(stage = %Stage::Serializing, template = %template_id, "Serializing workbook");
        let bytes = write_workbook_bytes(&workbook).map_err(|e| GenerateError::stage(Stage::Serializing, e))?;

        let file_name = format!("{}_{}.xlsx", template_id, Utc::now().timestamp_millis());
        info!(
            stage = %Stage::Done,
            template = %template_id,
            file = %file_name,
            sheets = workbook.sheets().len(),
            images = image_count,
            bytes = bytes.len(),
            "Workbook generated"
        );

        Ok(GeneratedWorkbook {
            file_name,
            bytes,
            sheet_count: workbook.sheets().len(),
            image_count,
        })
    }

    fn check_systems(&self, mapping: &FieldMappingConfig) -> Result<(), GenerateError> {
        for system in mapping.visible_systems() {
            if self.systems.is_recognized(&system.name) {
                continue;
            }
            if !self.config.systems.lenient {
                return Err(GenerateError::UnknownSystem(system.name.clone()));
            }
            warn!(system = %system.name, "Skipping unrecognized system");
        }
        Ok(())
    }

    /// Clone the template once per row, then drop the template itself.
    /// Returns the clone names in row order.
    fn clone_template(&self, workbook: &mut Workbook, count: usize) -> Result<Vec<String>, GenerateError> {
        let template_name = self.config.template.sheet_name.as_str();
        let Some(template_index) = workbook.sheet_index(template_name) else {
            return Err(GenerateError::TemplateSheetMissing(template_name.to_string()));
        };

        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            let name = self.config.template.clone_name(i);
            clone_sheet(workbook, template_name, &name)
                .with_context(|| format!("Failed to clone '{}' into '{}'", template_name, name))
                .map_err(|e| GenerateError::stage(Stage::Cloning, e))?;
            names.push(name);
        }

        workbook
            .remove_sheet(template_index)
            .map_err(|e| GenerateError::stage(Stage::Cloning, e))?;
        Ok(names)
    }

    /// Write every row into its clone; returns the planned QR codes per sheet
    fn populate(
        &self,
        workbook: &mut Workbook,
        clones: &[String],
        mapping: &FieldMappingConfig,
        rows: &[DataRow],
    ) -> Result<Vec<(usize, QrRequest)>> {
        let display_px = self.config.qr.field_display_px;
        let mut planned = Vec::new();

        for (row, name) in rows.iter().zip(clones) {
            let index = workbook
                .sheet_index(name)
                .with_context(|| format!("Cloned sheet '{}' disappeared", name))?;
            let sheet = workbook
                .sheet_at_mut(index)
                .with_context(|| format!("Cloned sheet '{}' disappeared", name))?;

            let mut requests = apply_global_fields(sheet, row, mapping, display_px)
                .with_context(|| format!("Failed to write global rows on '{}'", name))?;

            for system in mapping.visible_systems() {
                let Some(applier) = self.systems.get(&system.name) else {
                    continue;
                };
                let mut target = RowTarget {
                    sheet: &mut *sheet,
                    row,
                    lookup: self.lookup.as_ref(),
                    display_px,
                };
                let placed = applier
                    .populate(system, &mut target)
                    .with_context(|| format!("Failed to apply '{}' on '{}'", system.name, name))?;
                requests.extend(placed);
            }

            planned.extend(requests.into_iter().map(|request| (index, request)));
        }

        Ok(planned)
    }

    /// Render all planned QR codes in parallel and attach them to their sheets
    fn embed(&self, workbook: &mut Workbook, planned: Vec<(usize, QrRequest)>) -> Result<usize, GenerateError> {
        let (indices, requests): (Vec<usize>, Vec<QrRequest>) = planned.into_iter().unzip();
        let images = self.renderer.render_all(&requests)?;
        let count = images.len();

        for (index, image) in indices.into_iter().zip(images) {
            if let Some(sheet) = workbook.sheet_at_mut(index) {
                sheet.add_image(image);
            }
        }
        Ok(count)
    }
}
