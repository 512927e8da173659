//! Generator configuration loaded from `labelcraft.toml`

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::qr::{ErrorCorrection, MAX_QR_PX, QrRenderer};
use crate::reader::workbook::validate_sheet_name;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "labelcraft.toml";

/// Smallest QR symbol (version 1) in modules
const MIN_QR_MODULES: u32 = 21;

/// Main generator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub template: TemplateConfig,
    #[serde(default)]
    pub qr: QrConfig,
    #[serde(default)]
    pub systems: SystemsConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl GeneratorConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: GeneratorConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot work
    pub fn validate(&self) -> Result<()> {
        validate_sheet_name(&self.template.sheet_name)
            .context("Configuration error: invalid template.sheet_name")?;
        validate_sheet_name(&self.template.clone_name(99_999))
            .context("Configuration error: invalid template.clone_prefix")?;

        let qr = &self.qr;
        let smallest = MIN_QR_MODULES + 2 * qr.margin;
        if qr.size_px < smallest {
            bail!(
                "Configuration error: qr.size_px {} cannot hold a {}-module code",
                qr.size_px,
                smallest
            );
        }
        if qr.size_px > MAX_QR_PX {
            bail!(
                "Configuration error: qr.size_px {} exceeds the {}px limit",
                qr.size_px,
                MAX_QR_PX
            );
        }
        if qr.field_display_px == 0 || qr.label_display_px == 0 {
            bail!("Configuration error: QR display sizes must be positive");
        }

        if let Some(table) = &self.lookup.table {
            if table.as_os_str().is_empty() {
                bail!("Configuration error: lookup.table is empty");
            }
        }

        Ok(())
    }

    pub fn renderer(&self) -> QrRenderer {
        QrRenderer {
            size_px: self.qr.size_px,
            margin: self.qr.margin,
            error_correction: self.qr.error_correction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory of `{templateId}.xlsx` files
    pub templates_dir: PathBuf,
    /// Directory of `{templateId}.json` field mappings
    pub configs_dir: PathBuf,
    /// Where the CLI writes generated workbooks
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("uploads/templates"),
            configs_dir: PathBuf::from("configs"),
            output_dir: PathBuf::from("uploads/generated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Sheet cloned once per data row and removed afterwards
    pub sheet_name: String,
    /// Clones are named `{clone_prefix}{n}`, n starting at 1
    pub clone_prefix: String,
}

impl TemplateConfig {
    pub fn clone_name(&self, index: usize) -> String {
        format!("{}{}", self.clone_prefix, index + 1)
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            sheet_name: "Template".to_string(),
            clone_prefix: "Template_".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    pub size_px: u32,
    pub margin: u32,
    pub error_correction: ErrorCorrection,
    /// Display size of global and system field codes
    pub field_display_px: u32,
    /// Display size of label row codes
    pub label_display_px: u32,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            size_px: 300,
            margin: 2,
            error_correction: ErrorCorrection::M,
            field_display_px: 60,
            label_display_px: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemsConfig {
    /// Skip system names no applier recognizes instead of failing generation
    pub lenient: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// TOML table of enrichment records; no lookup when unset
    pub table: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Ask spreadsheet applications to recalculate formulas on open
    pub full_calc_on_load: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            full_calc_on_load: true,
        }
    }
}
