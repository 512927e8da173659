//! Registry of the named systems the generator knows how to apply

use anyhow::Result;

use super::apply::{apply_promos_system, plan_label_rows};
use super::{DataRow, SystemConfig};
use crate::lookup::EnrichmentLookup;
use crate::qr::QrRequest;
use crate::reader::{CalculatedValues, Worksheet};

pub const PROMOS_SYSTEM: &str = "PROMOS SYSTEM";
/// Systems made of data/QR row pairs, stamped from calculated values
pub const LABEL_SYSTEMS: [&str; 3] = ["PRINT LABEL", "ATTACH LABEL", "BOXPACK"];

/// Everything a system needs to populate one cloned sheet for one data row
pub struct RowTarget<'a> {
    pub sheet: &'a mut Worksheet,
    pub row: &'a DataRow,
    pub lookup: &'a dyn EnrichmentLookup,
    pub display_px: u32,
}

/// Trait that every recognized system implements
pub trait SystemApplier: Send + Sync {
    /// Name matched against `SystemConfig::name`
    fn name(&self) -> &str;

    /// Write row values into a freshly cloned sheet during generation
    fn populate(&self, _system: &SystemConfig, _target: &mut RowTarget<'_>) -> Result<Vec<QrRequest>> {
        Ok(Vec::new())
    }

    /// Plan QR codes from values calculated by a spreadsheet application
    fn stamp(
        &self,
        _system: &SystemConfig,
        _sheet_name: &str,
        _values: &dyn CalculatedValues,
        _display_px: u32,
    ) -> Result<Vec<QrRequest>> {
        Ok(Vec::new())
    }
}

/// Flat fields plus one composite QR code
pub struct PromosSystem;

impl SystemApplier for PromosSystem {
    fn name(&self) -> &str {
        PROMOS_SYSTEM
    }

    fn populate(&self, system: &SystemConfig, target: &mut RowTarget<'_>) -> Result<Vec<QrRequest>> {
        apply_promos_system(target.sheet, target.row, system, target.lookup, target.display_px)
    }
}

/// Data/QR row pairs read back from formula results
pub struct LabelSystem {
    name: &'static str,
}

impl LabelSystem {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl SystemApplier for LabelSystem {
    fn name(&self) -> &str {
        self.name
    }

    fn stamp(
        &self,
        system: &SystemConfig,
        sheet_name: &str,
        values: &dyn CalculatedValues,
        display_px: u32,
    ) -> Result<Vec<QrRequest>> {
        plan_label_rows(system, sheet_name, values, display_px)
    }
}

/// Create instances of all recognized systems
pub fn create_all_systems() -> Vec<Box<dyn SystemApplier>> {
    let mut systems: Vec<Box<dyn SystemApplier>> = vec![Box::new(PromosSystem)];
    systems.extend(
        LABEL_SYSTEMS
            .into_iter()
            .map(|name| Box::new(LabelSystem::new(name)) as Box<dyn SystemApplier>),
    );
    systems
}

pub struct SystemRegistry {
    systems: Vec<Box<dyn SystemApplier>>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self {
            systems: create_all_systems(),
        }
    }

    /// Applier for a configured system name (exact match)
    pub fn get(&self, name: &str) -> Option<&dyn SystemApplier> {
        self.systems
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn is_recognized(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }
}

impl Default for SystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names() {
        let registry = SystemRegistry::new();
        assert_eq!(
            registry.names(),
            vec!["PROMOS SYSTEM", "PRINT LABEL", "ATTACH LABEL", "BOXPACK"]
        );
        assert!(registry.is_recognized("BOXPACK"));
        assert!(!registry.is_recognized("boxpack"));
        assert!(!registry.is_recognized("SAP SYSTEM"));
    }

    #[test]
    fn test_label_system_does_not_populate() {
        let registry = SystemRegistry::new();
        let system = SystemConfig {
            id: "p".into(),
            name: "PRINT LABEL".into(),
            fields: Vec::new(),
            data_rows: Vec::new(),
            is_visible: true,
        };
        let mut sheet = Worksheet::new("Template_1");
        let row = DataRow::default();
        let mut target = RowTarget {
            sheet: &mut sheet,
            row: &row,
            lookup: &crate::lookup::NoLookup,
            display_px: 60,
        };
        let requests = registry
            .get("PRINT LABEL")
            .unwrap()
            .populate(&system, &mut target)
            .unwrap();
        assert!(requests.is_empty());
    }
}
