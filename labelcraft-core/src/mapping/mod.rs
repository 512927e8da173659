//! Field mapping configuration: which row values go to which worksheet cells

pub mod apply;
pub mod registry;
pub mod roles;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;

use crate::address::CellRef;
use crate::reader::workbook::format_number;

pub use apply::{apply_global_fields, apply_promos_system, plan_label_rows, promos_payload};
pub use registry::{SystemApplier, SystemRegistry};
pub use roles::{FieldAction, FieldRole, GlobalField};

/// Global rows plus named systems, as saved by the configuration editor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingConfig {
    #[serde(default)]
    pub global_rows: Vec<DataField>,
    #[serde(default)]
    pub systems: Vec<SystemConfig>,
}

impl FieldMappingConfig {
    /// Parse a stored configuration. Both the wrapped form
    /// `{"templateId", "config": {...}, "updatedAt"}` and the bare form are accepted.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut value: serde_json::Value =
            serde_json::from_str(json).context("Field mapping is not valid JSON")?;

        let inner = if value.get("config").is_some_and(|c| !c.is_null()) {
            value["config"].take()
        } else {
            value
        };

        let config: FieldMappingConfig =
            serde_json::from_value(inner).context("Field mapping has an unexpected shape")?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read field mapping {}", path.display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Failed to parse field mapping {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Systems that take part in generation
    pub fn visible_systems(&self) -> impl Iterator<Item = &SystemConfig> {
        self.systems.iter().filter(|s| s.is_visible)
    }

    /// Check every cell address. Empty addresses mean "not mapped"; anything
    /// else must be a reference inside the worksheet limits.
    pub fn validate(&self) -> Result<()> {
        for row in &self.global_rows {
            let context = format!("global row '{}'", row.id);
            check_address(&row.item_data_cell, &context)?;
            check_address(&row.item_qr_cell, &context)?;
        }

        for system in &self.systems {
            if system.name.trim().is_empty() {
                bail!("Configuration error: system '{}' has no name", system.id);
            }
            for field in &system.fields {
                let context = format!("field '{}' of system '{}'", field.label, system.name);
                check_address(&field.cell, &context)?;
            }
            for row in &system.data_rows {
                let context = format!("data row '{}' of system '{}'", row.id, system.name);
                check_address(&row.item_data_cell, &context)?;
                check_address(&row.item_qr_cell, &context)?;
            }
        }

        Ok(())
    }
}

fn check_address(address: &str, context: &str) -> Result<()> {
    mapped_cell(address).with_context(|| format!("Configuration error in {}", context))?;
    Ok(())
}

/// Parse a configured address; `None` when the address is left empty
pub fn mapped_cell(address: &str) -> Result<Option<CellRef>> {
    let address = address.trim();
    if address.is_empty() {
        return Ok(None);
    }
    match CellRef::parse(address) {
        Some(at) => Ok(Some(at)),
        None => bail!("'{}' is not a cell address within A1:XFD1048576", address),
    }
}

/// A data cell with an optional QR cell next to it. Used for global rows and
/// for the row pairs of label systems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataField {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub item_data_cell: String,
    #[serde(default, rename = "itemQRCell")]
    pub item_qr_cell: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_data_label: Option<String>,
    #[serde(default, rename = "itemQRLabel", skip_serializing_if = "Option::is_none")]
    pub item_qr_label: Option<String>,
    /// Label kind (BOX, BAG, MATCHING) for label systems
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// A named system: either flat `{label, cell}` fields or typed row pairs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<SystemField>,
    #[serde(default)]
    pub data_rows: Vec<DataField>,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemField {
    pub label: String,
    #[serde(default)]
    pub cell: String,
}

/// One record entered by the operator; each row fills one cloned sheet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub order_no: Option<String>,
    #[serde(default)]
    pub item_code: Option<String>,
    #[serde(default)]
    pub external_lot: Option<String>,
    #[serde(default)]
    pub material_code: Option<String>,
    #[serde(default)]
    pub internal_lot: Option<String>,
    /// Quantity as typed; numbers are kept in their shortest text form
    #[serde(default, deserialize_with = "quantity_text")]
    pub qty: Option<String>,
}

impl DataRow {
    pub fn order_no(&self) -> &str {
        self.order_no.as_deref().unwrap_or_default()
    }

    pub fn item_code(&self) -> &str {
        self.item_code.as_deref().unwrap_or_default()
    }

    pub fn external_lot(&self) -> &str {
        self.external_lot.as_deref().unwrap_or_default()
    }

    pub fn qty(&self) -> &str {
        self.qty.as_deref().unwrap_or_default()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Quantity {
    Text(String),
    Number(f64),
}

fn quantity_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Quantity>::deserialize(deserializer)?.map(|qty| match qty {
        Quantity::Text(text) => text,
        Quantity::Number(n) => format_number(n),
    }))
}
