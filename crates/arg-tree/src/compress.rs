//! Alignment compression: invariant stretches collapse into single columns
//! while every variant column is kept.

use arg_core::{ArgError, Coord, ErrorInfo};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sites::Sites;
use crate::trees::{LocalTrees, TreeSegment};

/// Correspondence between original and compressed coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitesMapping {
    /// Original region start.
    pub old_start: Coord,
    /// Original region end.
    pub old_end: Coord,
    /// Compressed region start.
    pub new_start: Coord,
    /// Compressed region end.
    pub new_end: Coord,
    /// Original positions of the variant sites.
    pub old_sites: Vec<Coord>,
    /// Compressed positions of the variant sites.
    pub new_sites: Vec<Coord>,
    /// Original coordinate represented by each compressed column.
    pub all_sites: Vec<Coord>,
}

impl SitesMapping {
    /// Chooses the compressed columns for `sites` with factor `compress`.
    ///
    /// Each compressed column stands for roughly `compress` original
    /// coordinates. Fails when the variant sites are too dense for the factor.
    pub fn find_compress_cols(sites: &Sites, compress: usize) -> Result<Self, ArgError> {
        if compress == 0 {
            return Err(ArgError::Config(ErrorInfo::new(
                "compress-factor",
                "compression factor must be at least one",
            )));
        }
        check_positions(&sites.positions, sites.start, sites.end)?;
        let mut mapping = SitesMapping {
            old_start: sites.start,
            old_end: sites.end,
            new_start: 0,
            new_end: 0,
            old_sites: Vec::with_capacity(sites.len()),
            new_sites: Vec::with_capacity(sites.len()),
            all_sites: Vec::new(),
        };
        if compress == 1 {
            mapping.all_sites = (sites.start..=sites.end).collect();
            for &pos in &sites.positions {
                mapping.old_sites.push(pos);
                mapping.new_sites.push(pos - sites.start);
            }
            mapping.new_end = sites.length();
            return Ok(mapping);
        }

        let half_block = compress / 2;
        let mut next_block = sites.start + compress;
        let mut blocki = 0usize;
        for (idx, &pos) in sites.positions.iter().enumerate() {
            while pos >= next_block {
                mapping.all_sites.push(next_block - half_block);
                next_block += compress;
                blocki += 1;
            }
            mapping.old_sites.push(pos);
            mapping.new_sites.push(blocki);
            mapping.all_sites.push(pos);
            next_block += compress;
            blocki += 1;
            if next_block - compress > sites.end && idx + 1 != sites.len() {
                return Err(ArgError::Config(
                    ErrorInfo::new("compress-too-dense", "sites too dense for compression factor")
                        .with_context("compress", compress.to_string())
                        .with_context("position", pos.to_string())
                        .with_hint("lower the compression factor"),
                ));
            }
        }
        while sites.end >= next_block {
            mapping.all_sites.push(next_block - half_block);
            next_block += compress;
            blocki += 1;
        }
        if let Some(pair) = mapping.all_sites.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ArgError::Structure(
                ErrorInfo::new("compress-order", "compressed columns are not strictly increasing")
                    .with_context("previous", pair[0].to_string())
                    .with_context("position", pair[1].to_string()),
            ));
        }
        let new_end = sites.length() / compress;
        mapping.new_end = match mapping.new_sites.last() {
            Some(&last) => new_end.max(last + 1),
            None => new_end,
        };
        debug!(
            compress,
            old_len = sites.length(),
            new_len = mapping.new_end,
            "computed compression mapping"
        );
        Ok(mapping)
    }

    /// Compressed coordinate of original coordinate `pos`.
    pub fn compress(&self, pos: Coord) -> Coord {
        self.all_sites
            .partition_point(|&site| site < pos)
            .clamp(self.new_start, self.new_end)
    }

    /// Original coordinate of compressed coordinate `pos`.
    pub fn uncompress(&self, pos: Coord) -> Coord {
        if pos >= self.new_end {
            return self.old_end;
        }
        if pos <= self.new_start {
            return self.old_start;
        }
        self.all_sites.get(pos).copied().unwrap_or(self.old_end)
    }

    /// Average number of original coordinates per compressed column.
    pub fn factor(&self) -> f64 {
        let new_len = self.new_end - self.new_start;
        if new_len == 0 {
            1.0
        } else {
            (self.old_end - self.old_start) as f64 / new_len as f64
        }
    }
}

/// Variant positions must be strictly increasing and inside `[start, end)`.
fn check_positions(positions: &[Coord], start: Coord, end: Coord) -> Result<(), ArgError> {
    let mut prev: Option<Coord> = None;
    for &pos in positions {
        if pos < start || pos >= end {
            return Err(ArgError::Config(
                ErrorInfo::new("compress-site-range", "site outside the alignment region")
                    .with_context("position", pos.to_string())
                    .with_context("start", start.to_string())
                    .with_context("end", end.to_string()),
            ));
        }
        if prev.is_some_and(|prev| prev >= pos) {
            return Err(ArgError::Config(
                ErrorInfo::new("compress-site-order", "sites must be sorted and unique")
                    .with_context("position", pos.to_string()),
            ));
        }
        prev = Some(pos);
    }
    Ok(())
}

/// Moves `sites` to compressed coordinates.
pub fn compress_sites(sites: &mut Sites, mapping: &SitesMapping) -> Result<(), ArgError> {
    if sites.len() != mapping.new_sites.len() {
        return Err(ArgError::Structure(
            ErrorInfo::new("compress-mismatch", "mapping was built for other sites")
                .with_context("sites", sites.len().to_string())
                .with_context("mapped", mapping.new_sites.len().to_string()),
        ));
    }
    sites.start = mapping.new_start;
    sites.end = mapping.new_end;
    sites.positions.clone_from(&mapping.new_sites);
    Ok(())
}

/// Restores original coordinates of compressed `sites`.
pub fn uncompress_sites(sites: &mut Sites, mapping: &SitesMapping) -> Result<(), ArgError> {
    if sites.len() > mapping.old_sites.len() || mapping.old_sites.len() != mapping.new_sites.len()
    {
        return Err(ArgError::Structure(ErrorInfo::new(
            "uncompress-mismatch",
            "incompatible sites mapping",
        )));
    }
    let mut j = 0usize;
    for pos in &mut sites.positions {
        while mapping.new_sites[j] != *pos {
            j += 1;
            if j == mapping.new_sites.len() {
                return Err(ArgError::Structure(
                    ErrorInfo::new("uncompress-missing", "position absent from sites mapping")
                        .with_context("position", pos.to_string()),
                ));
            }
        }
        *pos = mapping.old_sites[j];
    }
    sites.start = mapping.old_start;
    sites.end = mapping.old_end;
    Ok(())
}

fn remap_trees(
    trees: &LocalTrees,
    start: Coord,
    end: Coord,
    ntimes: usize,
    map: impl Fn(Coord) -> Coord,
) -> Result<LocalTrees, ArgError> {
    let nblocks = trees.len();
    let mut segments = Vec::with_capacity(nblocks);
    for (idx, block) in trees.blocks().iter().enumerate() {
        let lo = if idx == 0 { start } else { map(block.start) };
        let hi = if idx + 1 == nblocks { end } else { map(block.end) };
        if lo >= hi {
            return Err(ArgError::Structure(
                ErrorInfo::new("compress-collapse", "local tree collapses under remapping")
                    .with_context("block", idx.to_string())
                    .with_context("start", block.start.to_string())
                    .with_context("end", block.end.to_string()),
            ));
        }
        segments.push(TreeSegment {
            start: lo,
            end: hi,
            tree: block.tree.clone(),
        });
    }
    LocalTrees::from_segments(trees.chrom.clone(), trees.seqids().to_vec(), segments, ntimes)
}

/// Moves local trees into compressed coordinates.
pub fn compress_local_trees(
    trees: &LocalTrees,
    mapping: &SitesMapping,
    ntimes: usize,
) -> Result<LocalTrees, ArgError> {
    remap_trees(trees, mapping.new_start, mapping.new_end, ntimes, |pos| {
        mapping.compress(pos)
    })
}

/// Moves compressed local trees back to original coordinates.
pub fn uncompress_local_trees(
    trees: &LocalTrees,
    mapping: &SitesMapping,
    ntimes: usize,
) -> Result<LocalTrees, ArgError> {
    remap_trees(trees, mapping.old_start, mapping.old_end, ntimes, |pos| {
        mapping.uncompress(pos)
    })
}
