//! Errors reported at the generation boundary

use std::path::PathBuf;
use thiserror::Error;

use crate::generate::Stage;
use crate::qr::QrImageError;

#[derive(Debug, Error)]
pub enum GenerateError {
    /// The request itself is unusable (missing template id, no rows, bad ids)
    #[error("Invalid payload: {0}")]
    InvalidRequest(String),

    #[error("Template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("Config not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Sheet \"{0}\" not found")]
    TemplateSheetMissing(String),

    #[error("Unrecognized system \"{0}\"")]
    UnknownSystem(String),

    #[error("Invalid configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("QR generation failed: {0}")]
    Qr(#[from] QrImageError),

    #[error("{stage} failed: {source:#}")]
    Stage {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl GenerateError {
    pub fn stage(stage: Stage, source: anyhow::Error) -> Self {
        GenerateError::Stage { stage, source }
    }

    /// HTTP-style status: 400 for malformed requests, 500 for everything else
    pub fn status_code(&self) -> u16 {
        match self {
            GenerateError::InvalidRequest(_) => 400,
            _ => 500,
        }
    }

    /// JSON body `{"error": message}`
    pub fn response_body(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}
