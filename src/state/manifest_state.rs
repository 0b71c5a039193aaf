//! Manifest state and its on-disk document

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::config::ManifestInputs;
use crate::projector::ManifestOutputs;

/// Schema version for state.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "stile-manifest/state@1";

/// Result of one successful read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestState {
    /// SHA-256 of the manifest bytes that were used
    pub id: String,

    #[serde(flatten)]
    pub inputs: ManifestInputs,

    #[serde(flatten)]
    pub outputs: ManifestOutputs,

    /// True when the fallback manifest was used instead of the artifact
    pub used_fallback_manifest: bool,
}

/// Errors for state file operations
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported state schema {found:?} (expected {expected:?})")]
    SchemaMismatch { found: String, expected: &'static str },
}

/// state.json contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    pub schema_version: u32,
    pub schema_id: String,

    /// When the read completed
    pub read_at: DateTime<Utc>,

    #[serde(flatten)]
    pub state: ManifestState,
}

impl StateFile {
    pub fn new(state: ManifestState) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            read_at: Utc::now(),
            state,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON, rejecting other schemas
    pub fn from_json(json: &str) -> Result<Self, StateError> {
        let file: StateFile = serde_json::from_str(json)?;
        if file.schema_id != SCHEMA_ID {
            return Err(StateError::SchemaMismatch {
                found: file.schema_id,
                expected: SCHEMA_ID,
            });
        }
        Ok(file)
    }

    /// Write atomically to file (write-then-rename)
    pub fn write_to_file(&self, path: &Path) -> Result<(), StateError> {
        let json = self.to_json()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Load from file
    pub fn from_file(path: &Path) -> Result<Self, StateError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load from file; a missing file means there is no previous read
    pub fn load_optional(path: &Path) -> Result<Option<Self>, StateError> {
        match fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the previous read of the same manifest used the fallback.
    ///
    /// False without a previous read, or when it named a different manifest,
    /// build or architecture.
    pub fn prior_used_fallback(previous: Option<&StateFile>, inputs: &ManifestInputs) -> bool {
        previous.map_or(false, |f| {
            f.state.used_fallback_manifest && f.state.inputs.same_target(inputs)
        })
    }
}
