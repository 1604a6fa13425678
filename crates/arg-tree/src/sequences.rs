//! Named haplotype alignments.

use std::fs;
use std::path::Path;

use arg_core::{ArgError, Coord, ErrorInfo};
use arg_model::NullTrack;
use tracing::debug;

use crate::sites::Sites;

const AMBIGUOUS: &[u8] = b"NRYWSKMBDHV-";

/// Equal-length haplotype sequences; column `j` sits at coordinate
/// `offset + j`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequences {
    names: Vec<String>,
    seqs: Vec<Vec<u8>>,
    offset: Coord,
}

impl Sequences {
    /// Builds an alignment after checking names and characters.
    ///
    /// Bases are upper-cased; ambiguity codes and gaps become `N`.
    pub fn new(names: Vec<String>, seqs: Vec<Vec<u8>>, offset: Coord) -> Result<Self, ArgError> {
        if names.len() != seqs.len() {
            return Err(ArgError::Config(
                ErrorInfo::new("sequences-count", "one name per sequence is required")
                    .with_context("names", names.len().to_string())
                    .with_context("sequences", seqs.len().to_string()),
            ));
        }
        for name in &names {
            check_seq_name(name)?;
        }
        let seqlen = seqs.first().map_or(0, Vec::len);
        let mut normalized = Vec::with_capacity(seqs.len());
        for (name, seq) in names.iter().zip(seqs) {
            if seq.len() != seqlen {
                return Err(ArgError::Config(
                    ErrorInfo::new("sequences-length", "sequences differ in length")
                        .with_context("name", name.clone())
                        .with_context("expected", seqlen.to_string())
                        .with_context("found", seq.len().to_string()),
                ));
            }
            normalized.push(normalize(name, seq)?);
        }
        Ok(Self {
            names,
            seqs: normalized,
            offset,
        })
    }

    /// Parses FASTA text.
    pub fn read_fasta(text: &str) -> Result<Self, ArgError> {
        let mut names = Vec::new();
        let mut seqs: Vec<Vec<u8>> = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if let Some(name) = line.strip_prefix('>') {
                names.push(name.trim_end().to_string());
                seqs.push(Vec::new());
            } else {
                let residues = line.trim();
                if residues.is_empty() {
                    continue;
                }
                let seq = seqs.last_mut().ok_or_else(|| {
                    ArgError::Serde(
                        ErrorInfo::new("fasta-no-header", "sequence data before the first header")
                            .with_context("line", (lineno + 1).to_string()),
                    )
                })?;
                seq.extend_from_slice(residues.as_bytes());
            }
        }
        Self::new(names, seqs, 0)
    }

    /// Reads a FASTA file.
    pub fn load_fasta(path: &Path) -> Result<Self, ArgError> {
        let text =
            fs::read_to_string(path).map_err(|err| ArgError::io("fasta-read", err, path))?;
        let seqs = Self::read_fasta(&text)?;
        debug!(path = %path.display(), nseqs = seqs.nseqs(), len = seqs.len(), "read FASTA");
        Ok(seqs)
    }

    /// Expands sites into full sequences; invariant columns take
    /// `default_char`.
    pub fn from_sites(sites: &Sites, default_char: u8) -> Result<Self, ArgError> {
        let seqlen = sites.end - sites.start;
        let mut seqs = vec![vec![default_char; seqlen]; sites.names.len()];
        for (pos, col) in sites.positions.iter().zip(&sites.cols) {
            for (seq, &base) in seqs.iter_mut().zip(col) {
                seq[pos - sites.start] = base;
            }
        }
        Self::new(sites.names.clone(), seqs, sites.start)
    }

    /// Sequence names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Sequence `idx`.
    pub fn seq(&self, idx: usize) -> &[u8] {
        &self.seqs[idx]
    }

    /// Number of sequences.
    pub fn nseqs(&self) -> usize {
        self.seqs.len()
    }

    /// Alignment length.
    pub fn len(&self) -> usize {
        self.seqs.first().map_or(0, Vec::len)
    }

    /// Whether the alignment has no columns.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinate of the first column.
    pub fn offset(&self) -> Coord {
        self.offset
    }

    /// Coordinate past the last column.
    pub fn end(&self) -> Coord {
        self.offset + self.len()
    }

    /// Base of sequence `idx` at coordinate `pos`.
    pub fn base(&self, idx: usize, pos: Coord) -> u8 {
        self.seqs[idx][pos - self.offset]
    }

    /// Whether the column at `pos` carries more than one called base.
    pub fn is_variant(&self, pos: Coord) -> bool {
        let col = pos - self.offset;
        let mut called = self.seqs.iter().map(|s| s[col]).filter(|&b| b != b'N');
        match called.next() {
            Some(first) => called.any(|b| b != first),
            None => false,
        }
    }

    /// Replaces every masked position with `N`.
    pub fn apply_mask(&mut self, mask: &NullTrack) {
        let (lo, hi) = (self.offset, self.end());
        let mut masked = 0usize;
        for region in mask.iter() {
            let start = region.start.max(lo);
            let end = region.end.min(hi);
            for pos in start..end {
                for seq in &mut self.seqs {
                    seq[pos - lo] = b'N';
                }
                masked += 1;
            }
        }
        debug!(masked, "applied sequence mask");
    }
}

fn normalize(name: &str, seq: Vec<u8>) -> Result<Vec<u8>, ArgError> {
    seq.into_iter()
        .enumerate()
        .map(|(col, base)| {
            let upper = base.to_ascii_uppercase();
            match upper {
                b'A' | b'C' | b'G' | b'T' => Ok(upper),
                _ if AMBIGUOUS.contains(&upper) => Ok(b'N'),
                _ => Err(ArgError::Config(
                    ErrorInfo::new("sequences-char", "unknown character in alignment")
                        .with_context("name", name.to_string())
                        .with_context("column", col.to_string())
                        .with_context("char", (base as char).to_string()),
                )),
            }
        })
        .collect()
}

/// Checks a sequence name: non-empty, no leading or trailing space, only
/// `a-z A-Z 0-9 _ - .` and inner spaces, and not purely numeric.
pub fn check_seq_name(name: &str) -> Result<(), ArgError> {
    let bad = |reason: &str| {
        ArgError::Config(
            ErrorInfo::new("sequence-name", format!("invalid sequence name: {reason}"))
                .with_context("name", name.to_string()),
        )
    };
    if name.is_empty() {
        return Err(bad("name is empty"));
    }
    if name.starts_with(' ') || name.ends_with(' ') {
        return Err(bad("name starts or ends with a space"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '))
    {
        return Err(bad("name contains an illegal character"));
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad("name is purely numeric"));
    }
    Ok(())
}
