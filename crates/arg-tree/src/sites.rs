//! Variant-site alignments (the tab-separated sites format).
//!
//! Coordinates are 1-based on disk and 0-based in memory.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use arg_core::{ArgError, Coord, ErrorInfo, Region};
use tracing::debug;

use crate::sequences::Sequences;

/// Variant columns of an alignment over `[start, end)` of a chromosome.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sites {
    /// Chromosome name.
    pub chrom: String,
    /// First coordinate of the region.
    pub start: Coord,
    /// First coordinate past the region.
    pub end: Coord,
    /// Sequence names, one per base of every column.
    pub names: Vec<String>,
    /// Sorted, unique positions of the columns.
    pub positions: Vec<Coord>,
    /// Bases of each column, one per sequence.
    pub cols: Vec<Vec<u8>>,
}

fn parse_error(code: &str, message: &str, lineno: usize) -> ArgError {
    ArgError::Serde(ErrorInfo::new(code, message).with_context("line", lineno.to_string()))
}

impl Sites {
    /// Parses sites text. A `subregion` overrides the region of the file and
    /// drops sites outside it.
    pub fn read(text: &str, subregion: Option<Region>) -> Result<Self, ArgError> {
        let mut sites = Sites::default();
        let mut region_seen = false;
        for (idx, line) in text.lines().enumerate() {
            let lineno = idx + 1;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("NAMES\t") {
                sites.names = rest.split('\t').map(str::to_string).collect();
                if sites.names.iter().any(String::is_empty) {
                    return Err(parse_error("sites-names", "sequence name is empty", lineno));
                }
            } else if let Some(rest) = line.strip_prefix("REGION\t") {
                let fields: Vec<&str> = rest.split('\t').collect();
                let [chrom, start, end] = fields.as_slice() else {
                    return Err(parse_error("sites-region", "bad REGION format", lineno));
                };
                let start: Coord = start
                    .parse()
                    .map_err(|_| parse_error("sites-region", "bad REGION start", lineno))?;
                let end: Coord = end
                    .parse()
                    .map_err(|_| parse_error("sites-region", "bad REGION end", lineno))?;
                if start == 0 || end < start {
                    return Err(parse_error("sites-region", "REGION must be 1-based", lineno));
                }
                sites.chrom = chrom.to_string();
                sites.start = start - 1;
                sites.end = end;
                if let Some(sub) = subregion {
                    sites.start = sub.start;
                    sites.end = sub.end;
                }
                region_seen = true;
            } else if line.starts_with("RANGE\t") {
                return Err(parse_error(
                    "sites-range",
                    "deprecated RANGE line detected (use REGION instead)",
                    lineno,
                ));
            } else if line.starts_with("POPS\t") {
                let count = line.split('\t').count() - 1;
                if sites.names.is_empty() {
                    return Err(parse_error("sites-pops", "NAMES must precede POPS", lineno));
                }
                if count != sites.names.len() {
                    return Err(parse_error(
                        "sites-pops",
                        "POPS entries do not match NAMES entries",
                        lineno,
                    ));
                }
            } else {
                let (pos, bases) = line.split_once('\t').ok_or_else(|| {
                    parse_error("sites-line", "site line needs two fields", lineno)
                })?;
                let pos: Coord = pos.parse().map_err(|_| {
                    parse_error("sites-position", "first column is not an integer", lineno)
                })?;
                if pos == 0 {
                    return Err(parse_error("sites-position", "positions are 1-based", lineno));
                }
                let pos = pos - 1;
                if !region_seen {
                    return Err(parse_error("sites-region", "REGION must precede sites", lineno));
                }
                if pos < sites.start || pos >= sites.end {
                    continue;
                }
                if bases.len() != sites.names.len() {
                    return Err(ArgError::Serde(
                        ErrorInfo::new("sites-width", "number of bases does not match NAMES")
                            .with_context("line", lineno.to_string())
                            .with_context("bases", bases.len().to_string())
                            .with_context("names", sites.names.len().to_string()),
                    ));
                }
                let col: Vec<u8> = bases.bytes().map(|b| b.to_ascii_uppercase()).collect();
                if !col.iter().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T' | b'N')) {
                    return Err(parse_error("sites-char", "invalid sequence characters", lineno));
                }
                if sites.positions.last().is_some_and(|&last| last >= pos) {
                    return Err(parse_error(
                        "sites-order",
                        "sites must be sorted and unique",
                        lineno,
                    ));
                }
                sites.positions.push(pos);
                sites.cols.push(col);
            }
        }
        if !region_seen {
            return Err(ArgError::Serde(ErrorInfo::new(
                "sites-region",
                "sites file has no REGION line",
            )));
        }
        Ok(sites)
    }

    /// Reads a sites file.
    pub fn load(path: &Path, subregion: Option<Region>) -> Result<Self, ArgError> {
        let text =
            fs::read_to_string(path).map_err(|err| ArgError::io("sites-read", err, path))?;
        let sites = Self::read(&text, subregion).map_err(|err| {
            let mut info = err.info().clone();
            info.context.insert("path".into(), path.display().to_string());
            ArgError::Serde(info)
        })?;
        debug!(
            path = %path.display(),
            nseqs = sites.nseqs(),
            nsites = sites.len(),
            "read sites"
        );
        Ok(sites)
    }

    /// Renders the sites format.
    pub fn write(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "NAMES\t{}", self.names.join("\t"));
        let _ = writeln!(out, "REGION\t{}\t{}\t{}", self.chrom, self.start + 1, self.end);
        for (pos, col) in self.positions.iter().zip(&self.cols) {
            let _ = writeln!(out, "{}\t{}", pos + 1, String::from_utf8_lossy(col));
        }
        out
    }

    /// Writes the sites format to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ArgError> {
        fs::write(path, self.write()).map_err(|err| ArgError::io("sites-write", err, path))
    }

    /// Collects the variant columns of an alignment.
    pub fn from_sequences(seqs: &Sequences, chrom: impl Into<String>) -> Self {
        let mut sites = Sites {
            chrom: chrom.into(),
            start: seqs.offset(),
            end: seqs.end(),
            names: seqs.names().to_vec(),
            ..Sites::default()
        };
        for pos in seqs.offset()..seqs.end() {
            if seqs.is_variant(pos) {
                sites.positions.push(pos);
                sites.cols.push((0..seqs.nseqs()).map(|i| seqs.base(i, pos)).collect());
            }
        }
        sites
    }

    /// Number of sequences.
    pub fn nseqs(&self) -> usize {
        self.names.len()
    }

    /// Number of sites.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether there are no sites.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Length of the region.
    pub fn length(&self) -> usize {
        self.end - self.start
    }
}
