//! Structured error types shared across the ARG sampler crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`ArgError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (coordinates, paths, sizes, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the sampler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum ArgError {
    /// Inconsistent configuration or input that prevents startup.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Violated structural invariant of a tree or local-tree sequence.
    #[error("structure error: {0}")]
    Structure(ErrorInfo),
    /// File system failures (missing files, unreadable logs).
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Numerical failures (non-finite probabilities, failed root finding).
    #[error("numeric error: {0}")]
    Numeric(ErrorInfo),
    /// Parsing and serialization errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Randomness and seeding errors.
    #[error("rng error: {0}")]
    Rng(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl ArgError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            ArgError::Config(info)
            | ArgError::Structure(info)
            | ArgError::Io(info)
            | ArgError::Numeric(info)
            | ArgError::Serde(info)
            | ArgError::Rng(info) => info,
        }
    }

    /// Builds an [`ArgError::Io`] tagged with the offending path.
    pub fn io(code: &str, err: impl Display, path: &Path) -> Self {
        ArgError::Io(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }
}

/// Aborts on a violated structural invariant of the live ARG.
///
/// Invariant violations after an accepted move mean the sampler state can no
/// longer be trusted, so there is no recovery path.
pub fn invariant_violation(err: &ArgError) -> ! {
    panic!("structural invariant violated: {err}")
}
