//! Loading raw workflow definitions from disk.
//!
//! Definitions are authored as JSON or YAML. Both are read into an untyped
//! `serde_json::Value` and handed to `compile`; no structural validation
//! happens here beyond "is this parseable".

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while loading a workflow definition.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// The file extension names no supported format.
    #[error("unsupported definition format: {0}")]
    UnsupportedFormat(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Source formats a definition may be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Json,
    Yaml,
}

impl DefinitionFormat {
    /// Infer the format from a file extension (`json`, `yaml`, `yml`).
    pub fn from_path(path: &Path) -> Result<Self, WorkflowError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(DefinitionFormat::Json),
            "yaml" | "yml" => Ok(DefinitionFormat::Yaml),
            _ => Err(WorkflowError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse definition source text into an untyped value.
pub fn parse_definition(source: &str, format: DefinitionFormat) -> Result<Value, WorkflowError> {
    match format {
        DefinitionFormat::Json => {
            serde_json::from_str(source).map_err(|e| WorkflowError::ParseError(e.to_string()))
        }
        DefinitionFormat::Yaml => {
            serde_yaml_ng::from_str(source).map_err(|e| WorkflowError::ParseError(e.to_string()))
        }
    }
}

/// Read and parse a definition file, choosing the format by extension.
pub fn load_definition_file(path: &Path) -> Result<Value, WorkflowError> {
    let format = DefinitionFormat::from_path(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_definition(&content, format)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
