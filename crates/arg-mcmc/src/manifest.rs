use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use arg_core::{ArgError, ErrorInfo, RunProvenance};
use serde::{Deserialize, Serialize};

use crate::config::SamplerConfig;

/// Structured record of a finished (or interrupted) sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Configuration used for the run.
    pub config: SamplerConfig,
    /// Input digest, ARG hash, seed and timestamp.
    pub provenance: RunProvenance,
    /// Stats log written during the run.
    pub stats_file: PathBuf,
    /// Log file written during the run.
    pub log_file: Option<PathBuf>,
    /// ARG files written during the run, in order.
    pub args: Vec<PathBuf>,
    /// Acceptance rate per move kind.
    pub acceptance_rates: BTreeMap<String, f64>,
    /// Whether the run stopped early on request.
    pub interrupted: bool,
}

impl RunManifest {
    /// Writes the manifest as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<(), ArgError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                ArgError::Serde(
                    ErrorInfo::new("manifest-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            ArgError::Serde(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            ArgError::Serde(
                ErrorInfo::new("manifest-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, ArgError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            ArgError::Serde(
                ErrorInfo::new("manifest-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            ArgError::Serde(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}
