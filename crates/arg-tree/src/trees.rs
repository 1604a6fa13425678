//! Sequence of local trees along a chromosome region.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use arg_core::{ArgError, Coord, ErrorInfo};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::spr::{check_link, find_spr, link_trees, match_nodes, same_tree, NodeMapping, Spr};
use crate::tree::LocalTree;

/// One block of the sequence: a tree over `[start, end)` and the event that
/// links it to the previous block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTreeSpr {
    /// First coordinate of the block.
    pub start: Coord,
    /// First coordinate past the block.
    pub end: Coord,
    /// Local tree valid over the block.
    pub tree: LocalTree,
    /// Event from the previous tree; `None` for the first block.
    pub spr: Option<Spr>,
    /// Node mapping from the previous tree; `None` for the first block.
    pub mapping: Option<NodeMapping>,
}

/// A tree over a coordinate range without linkage, used to build or replace
/// blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSegment {
    /// First coordinate.
    pub start: Coord,
    /// First coordinate past the segment.
    pub end: Coord,
    /// Tree over the segment.
    pub tree: LocalTree,
}

/// Record needed to reverse a [`LocalTrees::splice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceUndo {
    lo: usize,
    inserted: usize,
    removed: Vec<LocalTreeSpr>,
    next_link: Option<(Option<Spr>, Option<NodeMapping>)>,
    relinked: Option<(Coord, Coord)>,
}

impl SpliceUndo {
    /// Coordinates `[start, end)` holding every breakpoint whose event or
    /// left tree the splice changed. `None` when all links survived.
    pub fn relinked(&self) -> Option<Range<Coord>> {
        self.relinked.map(|(lo, hi)| lo..hi + 1)
    }
}

/// The ARG: contiguous local trees over `[start, end)` sharing one
/// leaf-to-sequence assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTrees {
    /// Chromosome name.
    pub chrom: String,
    start: Coord,
    end: Coord,
    nleaves: usize,
    seqids: Vec<usize>,
    blocks: Vec<LocalTreeSpr>,
}

fn structure(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
}

impl LocalTrees {
    /// One tree over the whole region.
    pub fn from_tree(
        chrom: impl Into<String>,
        start: Coord,
        end: Coord,
        tree: LocalTree,
        seqids: Vec<usize>,
    ) -> Result<Self, ArgError> {
        Self::from_segments(chrom, seqids, vec![TreeSegment { start, end, tree }], usize::MAX)
    }

    /// Builds the sequence from contiguous segments, merging equal
    /// neighbours and deriving every link.
    pub fn from_segments(
        chrom: impl Into<String>,
        seqids: Vec<usize>,
        segments: Vec<TreeSegment>,
        ntimes: usize,
    ) -> Result<Self, ArgError> {
        let chrom = chrom.into();
        let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
            return Err(ArgError::Structure(structure("trees-empty", "no local trees given")));
        };
        let (start, end) = (first.start, last.end);
        let nleaves = first.tree.nleaves();
        let segments = merge_equal(segments);
        check_segments(&segments, start, end, nleaves)?;
        let mut blocks: Vec<LocalTreeSpr> = Vec::with_capacity(segments.len());
        for segment in segments {
            let (spr, mapping) = match blocks.last() {
                None => (None, None),
                Some(prev) => {
                    let (spr, mapping) =
                        find_spr(&prev.tree, &segment.tree, ntimes).ok_or_else(|| {
                            ArgError::Structure(
                                structure(
                                    "trees-unlinkable",
                                    "neighbouring trees are not one SPR apart",
                                )
                                .with_context("position", segment.start.to_string()),
                            )
                        })?;
                    (Some(spr), Some(mapping))
                }
            };
            blocks.push(LocalTreeSpr {
                start: segment.start,
                end: segment.end,
                tree: segment.tree,
                spr,
                mapping,
            });
        }
        let trees = Self {
            chrom,
            start,
            end,
            nleaves,
            seqids,
            blocks,
        };
        trees.check_seqids()?;
        Ok(trees)
    }

    /// Wraps already linked blocks; run [`LocalTrees::validate`] before use.
    pub fn from_blocks(
        chrom: impl Into<String>,
        start: Coord,
        end: Coord,
        seqids: Vec<usize>,
        blocks: Vec<LocalTreeSpr>,
    ) -> Result<Self, ArgError> {
        let nleaves = blocks
            .first()
            .map(|b| b.tree.nleaves())
            .ok_or_else(|| ArgError::Structure(structure("trees-empty", "no local trees given")))?;
        Ok(Self {
            chrom: chrom.into(),
            start,
            end,
            nleaves,
            seqids,
            blocks,
        })
    }

    /// First covered coordinate.
    pub fn start(&self) -> Coord {
        self.start
    }

    /// First coordinate past the covered region.
    pub fn end(&self) -> Coord {
        self.end
    }

    /// Length of the covered region.
    pub fn length(&self) -> usize {
        self.end - self.start
    }

    /// Number of leaves in every tree.
    pub fn nleaves(&self) -> usize {
        self.nleaves
    }

    /// Sequence index of every leaf.
    pub fn seqids(&self) -> &[usize] {
        &self.seqids
    }

    /// Blocks in coordinate order.
    pub fn blocks(&self) -> &[LocalTreeSpr] {
        &self.blocks
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false for a constructed sequence.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of breakpoints.
    pub fn num_recombinations(&self) -> usize {
        self.blocks.len().saturating_sub(1)
    }

    /// Index of the block containing `pos`.
    pub fn block_index(&self, pos: Coord) -> Option<usize> {
        if pos < self.start || pos >= self.end {
            return None;
        }
        Some(self.blocks.partition_point(|b| b.end <= pos))
    }

    /// Tree valid at `pos`.
    pub fn tree_at(&self, pos: Coord) -> Option<&LocalTree> {
        self.block_index(pos).map(|idx| &self.blocks[idx].tree)
    }

    /// Indices of the blocks intersecting `[lo, hi)`.
    pub fn blocks_overlapping(&self, lo: Coord, hi: Coord) -> Range<usize> {
        let first = self.blocks.partition_point(|b| b.end <= lo);
        let last = self.blocks.partition_point(|b| b.start < hi);
        first..last.max(first)
    }

    /// Replaces the leaf-to-sequence assignment.
    pub fn set_seqids(&mut self, seqids: Vec<usize>) -> Result<(), ArgError> {
        let previous = std::mem::replace(&mut self.seqids, seqids);
        if let Err(err) = self.check_seqids() {
            self.seqids = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Assigns leaves to sequences by name: leaf `i` carries `leaf_names[i]`.
    pub fn map_seqids(
        &mut self,
        leaf_names: &[String],
        seq_names: &[String],
    ) -> Result<(), ArgError> {
        if leaf_names.len() != self.nleaves {
            return Err(ArgError::Config(
                ErrorInfo::new("arg-names-count", "ARG names do not match its leaf count")
                    .with_context("names", leaf_names.len().to_string())
                    .with_context("leaves", self.nleaves.to_string()),
            ));
        }
        let mut seqids = Vec::with_capacity(leaf_names.len());
        for name in leaf_names {
            let idx = seq_names.iter().position(|s| s == name).ok_or_else(|| {
                ArgError::Config(
                    ErrorInfo::new("arg-names-mismatch", "ARG leaf has no matching sequence")
                        .with_context("name", name.clone()),
                )
            })?;
            seqids.push(idx);
        }
        self.set_seqids(seqids)
    }

    fn check_seqids(&self) -> Result<(), ArgError> {
        let distinct: BTreeSet<usize> = self.seqids.iter().copied().collect();
        if self.seqids.len() != self.nleaves || distinct.len() != self.seqids.len() {
            return Err(ArgError::Structure(
                structure("trees-seqids", "seqids must name one distinct sequence per leaf")
                    .with_context("seqids", self.seqids.len().to_string())
                    .with_context("leaves", self.nleaves.to_string()),
            ));
        }
        Ok(())
    }

    /// Checks every invariant of the sequence.
    pub fn validate(&self, ntimes: usize) -> Result<(), ArgError> {
        self.check_seqids()?;
        let first = self
            .blocks
            .first()
            .ok_or_else(|| ArgError::Structure(structure("trees-empty", "no local trees")))?;
        if first.start != self.start || self.blocks.last().map(|b| b.end) != Some(self.end) {
            return Err(ArgError::Structure(
                structure("trees-span", "blocks do not span the region")
                    .with_context("start", self.start.to_string())
                    .with_context("end", self.end.to_string()),
            ));
        }
        if first.spr.is_some() || first.mapping.is_some() {
            return Err(ArgError::Structure(structure(
                "trees-first-spr",
                "the first block cannot carry an SPR",
            )));
        }
        for (idx, block) in self.blocks.iter().enumerate() {
            if block.start >= block.end {
                return Err(ArgError::Structure(
                    structure("trees-empty-block", "block covers no coordinates")
                        .with_context("block", idx.to_string()),
                ));
            }
            if block.tree.nleaves() != self.nleaves {
                return Err(ArgError::Structure(
                    structure("trees-leaf-count", "tree leaf count differs from the ARG")
                        .with_context("block", idx.to_string()),
                ));
            }
            block.tree.check(ntimes)?;
            if idx == 0 {
                continue;
            }
            let prev = &self.blocks[idx - 1];
            if prev.end != block.start {
                return Err(ArgError::Structure(
                    structure("trees-gap", "blocks are not contiguous")
                        .with_context("block", idx.to_string())
                        .with_context("previous_end", prev.end.to_string())
                        .with_context("start", block.start.to_string()),
                ));
            }
            let (Some(spr), Some(mapping)) = (&block.spr, &block.mapping) else {
                return Err(ArgError::Structure(
                    structure("trees-missing-spr", "block after a breakpoint lacks its SPR")
                        .with_context("block", idx.to_string()),
                ));
            };
            check_link(&prev.tree, spr, mapping, &block.tree, ntimes).map_err(|err| {
                let mut info = err.info().clone();
                info.context.insert("block".into(), idx.to_string());
                ArgError::Structure(info)
            })?;
            if same_tree(&prev.tree, &block.tree) {
                return Err(ArgError::Structure(
                    structure("trees-redundant", "consecutive trees are identical")
                        .with_context("block", idx.to_string()),
                ));
            }
        }
        Ok(())
    }

    /// Replaces blocks `first..=last` with `segments`, which must cover the
    /// same coordinates.
    ///
    /// Equal neighbours are merged and links are recomputed at every new
    /// boundary. Returns `Ok(None)` and leaves the sequence untouched when
    /// some boundary is not a single SPR.
    pub fn splice(
        &mut self,
        first: usize,
        last: usize,
        segments: Vec<TreeSegment>,
        ntimes: usize,
    ) -> Result<Option<SpliceUndo>, ArgError> {
        if first > last || last >= self.blocks.len() {
            return Err(ArgError::Structure(
                structure("splice-range", "splice range outside the block list")
                    .with_context("first", first.to_string())
                    .with_context("last", last.to_string()),
            ));
        }
        let (lo_coord, hi_coord) = (self.blocks[first].start, self.blocks[last].end);
        check_segments(&segments, lo_coord, hi_coord, self.nleaves)?;
        let mut segments = merge_equal(segments);

        let mut lo = first;
        let mut hi = last + 1;
        let mut left_link = None;
        if lo > 0 && same_tree(&self.blocks[lo - 1].tree, &segments[0].tree) {
            lo -= 1;
            let left = &self.blocks[lo];
            segments[0] = TreeSegment {
                start: left.start,
                end: segments[0].end,
                tree: left.tree.clone(),
            };
            left_link = Some((left.spr, left.mapping.clone()));
        }
        if hi < self.blocks.len() {
            let right = &self.blocks[hi];
            let count = segments.len();
            if let Some(tail) = segments.last_mut() {
                if same_tree(&right.tree, &tail.tree) {
                    tail.end = right.end;
                    if count > 1 || left_link.is_none() {
                        tail.tree = right.tree.clone();
                    }
                    hi += 1;
                }
            }
        }

        let mut new_blocks: Vec<LocalTreeSpr> = Vec::with_capacity(segments.len());
        for (idx, segment) in segments.into_iter().enumerate() {
            let (spr, mapping) = if idx == 0 {
                match left_link.take() {
                    Some(link) => link,
                    None if lo == 0 => (None, None),
                    None => {
                        let prev = &self.blocks[lo - 1].tree;
                        match self.relink(lo, prev, &segment.tree, ntimes) {
                            Some((spr, mapping)) => (Some(spr), Some(mapping)),
                            None => return Ok(None),
                        }
                    }
                }
            } else {
                let prev = &new_blocks[idx - 1].tree;
                let old = self.blocks[lo + 1..hi]
                    .iter()
                    .position(|b| b.start == segment.start)
                    .map(|k| lo + 1 + k);
                let link = match old {
                    Some(k) => self.relink(k, prev, &segment.tree, ntimes),
                    None => find_spr(prev, &segment.tree, ntimes),
                };
                match link {
                    Some((spr, mapping)) => (Some(spr), Some(mapping)),
                    None => return Ok(None),
                }
            };
            new_blocks.push(LocalTreeSpr {
                start: segment.start,
                end: segment.end,
                tree: segment.tree,
                spr,
                mapping,
            });
        }

        let mut new_next = None;
        if hi < self.blocks.len() {
            let Some(tail) = new_blocks.last() else {
                return Ok(None);
            };
            let Some(link) = self.relink(hi, &tail.tree, &self.blocks[hi].tree, ntimes) else {
                return Ok(None);
            };
            new_next = Some(link);
        }
        let relinked = self.changed_links(lo, hi, &new_blocks, new_next.as_ref().map(|l| &l.0));

        let mut next_link = None;
        if let Some((spr, mapping)) = new_next {
            let next = &mut self.blocks[hi];
            next_link = Some((
                std::mem::replace(&mut next.spr, Some(spr)),
                std::mem::replace(&mut next.mapping, Some(mapping)),
            ));
        }

        let inserted = new_blocks.len();
        let removed: Vec<LocalTreeSpr> = self.blocks.splice(lo..hi, new_blocks).collect();
        trace!(lo, removed = removed.len(), inserted, ?relinked, "spliced local trees");
        Ok(Some(SpliceUndo {
            lo,
            inserted,
            removed,
            next_link,
            relinked,
        }))
    }

    /// Link from `prev` into `cur` at the breakpoint that currently opens
    /// block `k`. The stored event is kept when both trees are unchanged and
    /// carried over by clade when they were only relabelled; otherwise a new
    /// event is searched.
    fn relink(
        &self,
        k: usize,
        prev: &LocalTree,
        cur: &LocalTree,
        ntimes: usize,
    ) -> Option<(Spr, NodeMapping)> {
        let block = &self.blocks[k];
        let old_prev = &self.blocks[k - 1].tree;
        if let (Some(spr), Some(mapping)) = (&block.spr, &block.mapping) {
            if prev == old_prev && cur == &block.tree {
                return Some((*spr, mapping.clone()));
            }
            if same_tree(prev, old_prev) && same_tree(cur, &block.tree) {
                if let Some(nodes) = match_nodes(old_prev, prev) {
                    let carried = Spr {
                        recomb_node: nodes[spr.recomb_node],
                        coal_node: nodes[spr.coal_node],
                        ..*spr
                    };
                    if carried.check(prev, ntimes).is_ok() {
                        if let Some(mapping) = link_trees(prev, &carried, cur, ntimes) {
                            return Some((carried, mapping));
                        }
                    }
                }
            }
        }
        find_spr(prev, cur, ntimes)
    }

    /// Range of breakpoint positions between blocks `lo - 1` and `hi` whose
    /// left tree or event differs once `new_blocks` replace `lo..hi`.
    fn changed_links(
        &self,
        lo: usize,
        hi: usize,
        new_blocks: &[LocalTreeSpr],
        new_next: Option<&Spr>,
    ) -> Option<(Coord, Coord)> {
        let mut old: BTreeMap<Coord, (&LocalTree, &Spr)> = BTreeMap::new();
        for k in lo.max(1)..(hi + 1).min(self.blocks.len()) {
            if let Some(spr) = &self.blocks[k].spr {
                old.insert(self.blocks[k].start, (&self.blocks[k - 1].tree, spr));
            }
        }
        let mut new: BTreeMap<Coord, (&LocalTree, &Spr)> = BTreeMap::new();
        for (j, block) in new_blocks.iter().enumerate() {
            let left = match j {
                0 if lo == 0 => continue,
                0 => &self.blocks[lo - 1].tree,
                _ => &new_blocks[j - 1].tree,
            };
            if let Some(spr) = &block.spr {
                new.insert(block.start, (left, spr));
            }
        }
        if let (Some(spr), Some(tail)) = (new_next, new_blocks.last()) {
            new.insert(self.blocks[hi].start, (&tail.tree, spr));
        }
        let removed = old.iter().filter(|&(pos, link)| new.get(pos) != Some(link));
        let added = new.iter().filter(|&(pos, link)| old.get(pos) != Some(link));
        removed.chain(added).map(|(&pos, _)| pos).fold(None, |span, pos| match span {
            None => Some((pos, pos)),
            Some((a, b)) => Some((a.min(pos), b.max(pos))),
        })
    }

    /// Reverses the splice that produced `undo`.
    pub fn undo(&mut self, undo: SpliceUndo) {
        let SpliceUndo {
            lo,
            inserted,
            removed,
            next_link,
            ..
        } = undo;
        if let Some((spr, mapping)) = next_link {
            if let Some(next) = self.blocks.get_mut(lo + inserted) {
                next.spr = spr;
                next.mapping = mapping;
            }
        }
        self.blocks.splice(lo..lo + inserted, removed);
    }
}

fn merge_equal(segments: Vec<TreeSegment>) -> Vec<TreeSegment> {
    let mut merged: Vec<TreeSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last) if same_tree(&last.tree, &segment.tree) => last.end = segment.end,
            _ => merged.push(segment),
        }
    }
    merged
}

fn check_segments(
    segments: &[TreeSegment],
    start: Coord,
    end: Coord,
    nleaves: usize,
) -> Result<(), ArgError> {
    let mut cursor = start;
    for segment in segments {
        if segment.start != cursor || segment.end <= segment.start {
            return Err(ArgError::Structure(
                structure("segments-layout", "segments must be contiguous and non-empty")
                    .with_context("expected", cursor.to_string())
                    .with_context("start", segment.start.to_string())
                    .with_context("end", segment.end.to_string()),
            ));
        }
        if segment.tree.nleaves() != nleaves {
            return Err(ArgError::Structure(
                structure("segments-leaf-count", "segment tree has the wrong leaf count")
                    .with_context("expected", nleaves.to_string())
                    .with_context("found", segment.tree.nleaves().to_string()),
            ));
        }
        cursor = segment.end;
    }
    if cursor != end || segments.is_empty() {
        return Err(ArgError::Structure(
            structure("segments-layout", "segments do not cover the replaced range")
                .with_context("covered_to", cursor.to_string())
                .with_context("end", end.to_string()),
        ));
    }
    Ok(())
}
