//! File-backed template and field mapping storage

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::GenerateError;
use crate::mapping::FieldMappingConfig;
use crate::reader::{Workbook, read_workbook};

/// Mapping used when a template has no configuration of its own
pub const DEFAULT_CONFIG_ID: &str = "defaultConfig";

/// Templates are `{templates_dir}/{id}.xlsx`, mappings `{configs_dir}/{id}.json`
#[derive(Debug, Clone)]
pub struct TemplateStore {
    templates_dir: PathBuf,
    configs_dir: PathBuf,
}

impl TemplateStore {
    pub fn new(templates_dir: impl Into<PathBuf>, configs_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            configs_dir: configs_dir.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.templates_dir, &config.configs_dir)
    }

    pub fn template_path(&self, template_id: &str) -> Result<PathBuf, GenerateError> {
        check_id(template_id)?;
        Ok(self.templates_dir.join(format!("{}.xlsx", template_id)))
    }

    pub fn config_path(&self, template_id: &str) -> Result<PathBuf, GenerateError> {
        check_id(template_id)?;
        Ok(self.configs_dir.join(format!("{}.json", template_id)))
    }

    pub fn load_template(&self, template_id: &str) -> Result<Workbook, GenerateError> {
        let path = self.template_path(template_id)?;
        if !path.is_file() {
            return Err(GenerateError::TemplateNotFound(path));
        }
        debug!(path = %path.display(), "Loading template");
        read_workbook(&path).map_err(GenerateError::Config)
    }

    pub fn load_config(&self, template_id: &str) -> Result<FieldMappingConfig, GenerateError> {
        let path = self.config_path(template_id)?;
        load_mapping(&path)
    }

    /// The template's own mapping, else `defaultConfig.json`
    pub fn load_config_or_default(&self, template_id: &str) -> Result<FieldMappingConfig, GenerateError> {
        let path = self.config_path(template_id)?;
        if path.is_file() {
            return load_mapping(&path);
        }
        debug!(template = %template_id, "No field mapping, using the default one");
        load_mapping(&self.configs_dir.join(format!("{}.json", DEFAULT_CONFIG_ID)))
    }
}

fn load_mapping(path: &Path) -> Result<FieldMappingConfig, GenerateError> {
    if !path.is_file() {
        return Err(GenerateError::ConfigNotFound(path.to_path_buf()));
    }
    FieldMappingConfig::from_file(path).map_err(GenerateError::Config)
}

/// Ids name a file inside the storage directories and nothing else
fn check_id(template_id: &str) -> Result<(), GenerateError> {
    let id = template_id.trim();
    if id.is_empty() {
        return Err(GenerateError::InvalidRequest("missing template id".to_string()));
    }
    if id != template_id || id.contains(['/', '\\', '\0']) || id.contains("..") {
        return Err(GenerateError::InvalidRequest(format!(
            "malformed template id '{}'",
            template_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_rejects_path_like_ids() {
        let store = TemplateStore::new("t", "c");
        for id in ["", "  ", "../secret", "a/b", "a\\b", " padded"] {
            let err = store.template_path(id).unwrap_err();
            assert_eq!(err.status_code(), 400, "{:?}", id);
        }
        assert_eq!(store.template_path("label-a").unwrap(), PathBuf::from("t/label-a.xlsx"));
        assert_eq!(store.config_path("label-a").unwrap(), PathBuf::from("c/label-a.json"));
    }

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path(), dir.path());

        assert!(matches!(
            store.load_template("nope"),
            Err(GenerateError::TemplateNotFound(_))
        ));
        assert!(matches!(
            store.load_config("nope"),
            Err(GenerateError::ConfigNotFound(_))
        ));
        assert!(matches!(
            store.load_config_or_default("nope"),
            Err(GenerateError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_default_config_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("defaultConfig.json"),
            r#"{"globalRows": [{"id": "item", "itemDataCell": "C3"}], "systems": []}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("label-a.json"),
            r#"{"templateId": "label-a", "config": {"globalRows": [], "systems": []}}"#,
        )
        .unwrap();
        let store = TemplateStore::new(dir.path(), dir.path());

        assert_eq!(store.load_config_or_default("other").unwrap().global_rows.len(), 1);
        assert!(store.load_config_or_default("label-a").unwrap().global_rows.is_empty());
    }

    #[test]
    fn test_invalid_mapping_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("bad.json"),
            r#"{"globalRows": [{"id": "item", "itemDataCell": "C0"}]}"#,
        )
        .unwrap();
        let store = TemplateStore::new(dir.path(), dir.path());

        let err = store.load_config("bad").unwrap_err();
        assert!(matches!(err, GenerateError::Config(_)));
        assert_eq!(err.status_code(), 500);
    }
}
