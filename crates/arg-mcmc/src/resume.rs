//! Discovery of the checkpoint a previous run can continue from.

use std::path::PathBuf;

use arg_core::{ArgError, ErrorInfo};
use tracing::debug;

use crate::determinism::Stage;
use crate::stats::{read_rows, OutputPaths};

/// Last resampling iteration with an ARG on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    /// Iteration whose ARG was found.
    pub iter: usize,
    /// The ARG file.
    pub arg_path: PathBuf,
}

impl ResumePoint {
    /// First iteration the resumed run executes.
    pub fn next_iter(&self) -> usize {
        self.iter + 1
    }
}

/// Scans the stats log under `paths` for the last `resample` row whose ARG
/// (plain or gzipped) still exists.
pub fn find_resume_point(paths: &OutputPaths) -> Result<ResumePoint, ArgError> {
    let stats_path = paths.stats();
    if !stats_path.exists() {
        return Err(ArgError::Config(
            ErrorInfo::new("resume-stats-missing", "cannot resume without a stats file")
                .with_context("path", stats_path.display().to_string()),
        ));
    }
    let rows = read_rows(&stats_path)?;
    let mut found = None;
    for row in rows.iter().filter(|row| row.stage == Stage::Resample.as_str()) {
        let candidates = [paths.arg_plain(row.iter), paths.arg_gzip(row.iter)];
        if let Some(path) = candidates.into_iter().find(|path| path.exists()) {
            found = Some(ResumePoint {
                iter: row.iter,
                arg_path: path,
            });
        }
    }
    let point = found.ok_or_else(|| {
        ArgError::Config(
            ErrorInfo::new("resume-arg-missing", "no sampled ARG found to resume from")
                .with_context("stats", stats_path.display().to_string()),
        )
    })?;
    debug!(iter = point.iter, path = %point.arg_path.display(), "found resume point");
    Ok(point)
}
