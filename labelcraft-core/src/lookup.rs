//! Item enrichment lookup keyed by normalized item code

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Enrichment data stored for an item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    #[serde(default)]
    pub item_aps: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

impl EnrichmentRecord {
    pub fn item_aps(&self) -> &str {
        self.item_aps.as_deref().unwrap_or_default()
    }

    pub fn product(&self) -> &str {
        self.product.as_deref().unwrap_or_default()
    }
}

/// Point lookup of enrichment data. Implementations are shared read-only
/// across generation requests.
pub trait EnrichmentLookup: Send + Sync {
    /// Record for an already normalized item code, `None` on a miss
    fn lookup(&self, code: &str) -> Result<Option<EnrichmentRecord>>;
}

/// Text before the first `-`: `ABC-001` -> `ABC`
pub fn normalize_item_code(item_code: &str) -> &str {
    item_code.split('-').next().unwrap_or_default()
}

/// Look up the record of a raw item code. Blank codes never reach the lookup.
pub fn lookup_item(lookup: &dyn EnrichmentLookup, item_code: &str) -> Result<Option<EnrichmentRecord>> {
    let code = normalize_item_code(item_code);
    if code.is_empty() {
        return Ok(None);
    }
    let record = lookup
        .lookup(code)
        .with_context(|| format!("Enrichment lookup failed for item '{}'", code))?;
    if record.is_none() {
        debug!(code = %code, "No enrichment record");
    }
    Ok(record)
}

/// Lookup that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl EnrichmentLookup for NoLookup {
    fn lookup(&self, _code: &str) -> Result<Option<EnrichmentRecord>> {
        Ok(None)
    }
}

/// Lookup over a TOML table:
///
/// ```toml
/// [items.ABC]
/// item_aps = "APS-100"
/// product = "Widget"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableLookup {
    #[serde(default)]
    items: HashMap<String, EnrichmentRecord>,
}

impl TableLookup {
    pub fn from_toml(content: &str) -> Result<Self> {
        let table: TableLookup = toml::from_str(content)?;
        Ok(table)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read lookup table {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse lookup table {}", path.display()))
    }

    pub fn insert(&mut self, code: impl Into<String>, record: EnrichmentRecord) {
        self.items.insert(code.into(), record);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl EnrichmentLookup for TableLookup {
    fn lookup(&self, code: &str) -> Result<Option<EnrichmentRecord>> {
        Ok(self.items.get(code).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_item_code() {
        assert_eq!(normalize_item_code("ABC-001"), "ABC");
        assert_eq!(normalize_item_code("ABC-001-X"), "ABC");
        assert_eq!(normalize_item_code("ABC"), "ABC");
        assert_eq!(normalize_item_code("-001"), "");
        assert_eq!(normalize_item_code(""), "");
    }

    #[test]
    fn test_table_lookup() {
        let table = TableLookup::from_toml(
            r#"
[items.ABC]
item_aps = "APS-100"
product = "Widget"

[items.XYZ]
product = "Gadget"
"#,
        )
        .unwrap();

        let record = lookup_item(&table, "ABC-001").unwrap().unwrap();
        assert_eq!(record.item_aps(), "APS-100");
        assert_eq!(record.product(), "Widget");

        let partial = lookup_item(&table, "XYZ").unwrap().unwrap();
        assert_eq!(partial.item_aps(), "");

        assert_eq!(lookup_item(&table, "NOPE-1").unwrap(), None);
        assert_eq!(lookup_item(&table, "").unwrap(), None);
    }

    #[test]
    fn test_no_lookup() {
        assert_eq!(lookup_item(&NoLookup, "ABC-001").unwrap(), None);
    }
}
