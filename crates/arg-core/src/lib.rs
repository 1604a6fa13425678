#![deny(missing_docs)]
//! Core types shared by the ARG sampler crates: the error taxonomy,
//! deterministic random number streams, provenance records and genomic
//! regions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod errors;
pub mod provenance;
pub mod rng;

pub use errors::{invariant_violation, ArgError, ErrorInfo};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, sample_log_weights, RngHandle};

/// Genomic coordinate. Intervals are 0-based and half-open.
pub type Coord = usize;

/// Half-open genomic interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Region {
    /// First coordinate inside the region.
    pub start: Coord,
    /// First coordinate past the region.
    pub end: Coord,
}

impl Region {
    /// Creates a region, rejecting empty or inverted intervals.
    pub fn new(start: Coord, end: Coord) -> Result<Self, ArgError> {
        if start >= end {
            return Err(ArgError::Config(
                ErrorInfo::new("region-empty", "region start must precede its end")
                    .with_context("start", start.to_string())
                    .with_context("end", end.to_string()),
            ));
        }
        Ok(Self { start, end })
    }

    /// Number of coordinates covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Regions are never empty once constructed; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns whether `pos` lies inside the region.
    pub fn contains(&self, pos: Coord) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Returns whether `other` lies entirely inside this region.
    pub fn covers(&self, other: &Region) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for Region {
    type Err = ArgError;

    /// Parses `<start>-<end>`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let malformed = || {
            ArgError::Config(
                ErrorInfo::new("region-parse", "region must look like <start>-<end>")
                    .with_context("value", text.to_string()),
            )
        };
        let (start, end) = text.trim().split_once('-').ok_or_else(malformed)?;
        let start = start.trim().parse::<Coord>().map_err(|_| malformed())?;
        let end = end.trim().parse::<Coord>().map_err(|_| malformed())?;
        Region::new(start, end)
    }
}
