use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use arg_core::{ArgError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::determinism::Stage;

/// Column names of the stats log.
pub const STATS_HEADER: [&str; 7] = [
    "stage",
    "iter",
    "prior",
    "likelihood",
    "joint",
    "recombs",
    "noncompats",
];

/// One stats-log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    /// Stage name.
    pub stage: String,
    /// Iteration within the stage.
    pub iter: usize,
    /// Log prior.
    pub prior: f64,
    /// Log likelihood.
    pub likelihood: f64,
    /// Log joint probability.
    pub joint: f64,
    /// Number of recombinations.
    pub recombs: usize,
    /// Sites incompatible with their local tree.
    pub noncompats: usize,
}

/// File names derived from the output prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    prefix: PathBuf,
    gzip: bool,
}

impl OutputPaths {
    /// Paths under `prefix`; sampled ARGs get a `.gz` suffix when `gzip`.
    pub fn new(prefix: impl Into<PathBuf>, gzip: bool) -> Self {
        Self {
            prefix: prefix.into(),
            gzip,
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.prefix.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    /// `<prefix>.stats`
    pub fn stats(&self) -> PathBuf {
        self.with_suffix(".stats")
    }

    /// `<prefix>.log`
    pub fn log(&self) -> PathBuf {
        self.with_suffix(".log")
    }

    /// `<prefix>.manifest.json`
    pub fn manifest(&self) -> PathBuf {
        self.with_suffix(".manifest.json")
    }

    /// ARG written after iteration `iter`.
    pub fn arg(&self, iter: usize) -> PathBuf {
        if self.gzip {
            self.with_suffix(&format!(".{iter}.smc.gz"))
        } else {
            self.arg_plain(iter)
        }
    }

    /// Uncompressed name of the ARG written after iteration `iter`.
    pub fn arg_plain(&self, iter: usize) -> PathBuf {
        self.with_suffix(&format!(".{iter}.smc"))
    }

    /// ARG written when a run stops during `stage`. Resampling stages use
    /// [`OutputPaths::arg`]; earlier stages name the stage.
    pub fn stage_arg(&self, stage: Stage, iter: usize) -> PathBuf {
        match stage {
            Stage::Resample | Stage::ResampleRegion => self.arg(iter),
            Stage::Seq | Stage::Climb => {
                let ext = if self.gzip { "smc.gz" } else { "smc" };
                self.with_suffix(&format!(".{}.{iter}.{ext}", stage.as_str()))
            }
        }
    }

    /// Gzipped name of the ARG written after iteration `iter`.
    pub fn arg_gzip(&self, iter: usize) -> PathBuf {
        self.with_suffix(&format!(".{iter}.smc.gz"))
    }
}

/// Tab-separated stats log, flushed after every row.
pub struct StatsLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

fn tab_writer(file: File) -> csv::Writer<File> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(file)
}

fn write_error(err: csv::Error, path: &Path) -> ArgError {
    ArgError::io("stats-write", err, path)
}

impl StatsLog {
    /// Creates (or truncates) the log and writes its header.
    pub fn create(path: &Path) -> Result<Self, ArgError> {
        let file = File::create(path).map_err(|err| ArgError::io("stats-create", err, path))?;
        let mut writer = tab_writer(file);
        writer
            .write_record(STATS_HEADER)
            .map_err(|err| write_error(err, path))?;
        writer
            .flush()
            .map_err(|err| ArgError::io("stats-write", err, path))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    /// Opens an existing log for appending.
    pub fn append(path: &Path) -> Result<Self, ArgError> {
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|err| ArgError::io("stats-open", err, path))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: tab_writer(file),
        })
    }

    /// Appends one row.
    pub fn write_row(&mut self, row: &StatsRow) -> Result<(), ArgError> {
        self.writer
            .serialize(row)
            .map_err(|err| write_error(err, &self.path))?;
        self.writer
            .flush()
            .map_err(|err| ArgError::io("stats-write", err, &self.path))
    }

    /// Path of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads every row of a stats log.
pub fn read_rows(path: &Path) -> Result<Vec<StatsRow>, ArgError> {
    let file = File::open(path).map_err(|err| ArgError::io("stats-open", err, path))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(file);
    reader
        .deserialize()
        .enumerate()
        .map(|(idx, row)| {
            row.map_err(|err| {
                ArgError::Serde(
                    ErrorInfo::new("stats-parse", err.to_string())
                        .with_context("path", path.display().to_string())
                        .with_context("row", (idx + 1).to_string()),
                )
            })
        })
        .collect()
}
