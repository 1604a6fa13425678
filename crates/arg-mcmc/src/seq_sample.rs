//! Sequential construction of an initial ARG, one haplotype at a time.

use std::collections::HashMap;

use arg_core::{sample_log_weights, ArgError, Coord, ErrorInfo, RngHandle};
use arg_model::ArgModel;
use arg_prob::{calc_log_coal_prob, calc_tree_likelihood_spans, score_arg};
use arg_tree::{
    find_spr, LeafSet, LineageCounts, LocalTree, LocalTrees, Sequences, TreeSegment,
};
use tracing::{debug, trace};

use crate::determinism::{iteration_seed, Stage};

/// ARG holding only sequence 0 over `[start, end)`.
pub fn seed_trees(chrom: &str, start: Coord, end: Coord) -> Result<LocalTrees, ArgError> {
    LocalTrees::from_tree(chrom, start, end, LocalTree::single_leaf(), vec![0])
}

/// A place where the new lineage can join every local tree: the branch
/// above `clade` at time index `time`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Attachment {
    clade: LeafSet,
    time: usize,
}

fn attachments(trees: &LocalTrees, ntimes: usize) -> Vec<Attachment> {
    let blocks = trees.blocks();
    let Some(first) = blocks.first() else {
        return Vec::new();
    };
    let indices: Vec<HashMap<LeafSet, usize>> = blocks
        .iter()
        .map(|block| {
            block
                .tree
                .leafsets()
                .into_iter()
                .enumerate()
                .map(|(node, set)| (set, node))
                .collect()
        })
        .collect();
    let mut found = Vec::new();
    for clade in first.tree.leafsets() {
        let mut lo = 1usize;
        let mut hi = ntimes - 1;
        for (block, index) in blocks.iter().zip(&indices) {
            let Some(&node) = index.get(&clade) else {
                hi = 0;
                break;
            };
            lo = lo.max(block.tree.age(node));
            if let Some(parent) = block.tree.parent(node) {
                hi = hi.min(block.tree.age(parent));
            }
        }
        for time in lo..=hi {
            found.push(Attachment {
                clade: clade.clone(),
                time,
            });
        }
    }
    found
}

fn attach(
    trees: &LocalTrees,
    attachment: &Attachment,
    seqid: usize,
    ntimes: usize,
) -> Result<LocalTrees, ArgError> {
    let mut segments = Vec::with_capacity(trees.len());
    for block in trees.blocks() {
        let node = block
            .tree
            .leafsets()
            .iter()
            .position(|set| *set == attachment.clade)
            .ok_or_else(|| {
                ArgError::Structure(ErrorInfo::new(
                    "seq-sample-clade",
                    "attachment clade missing from a local tree",
                ))
            })?;
        segments.push(TreeSegment {
            start: block.start,
            end: block.end,
            tree: block.tree.with_new_leaf(node, attachment.time)?,
        });
    }
    let mut seqids = trees.seqids().to_vec();
    seqids.push(seqid);
    LocalTrees::from_segments(trees.chrom.clone(), seqids, segments, ntimes)
}

/// Longest run of positions that share one hidden state.
const CHUNK: Coord = 20;

/// Hidden states over one block of the current ARG: every branch of its tree
/// at every time the new lineage may join it.
struct BlockStates {
    /// `(node, time)` of each state.
    states: Vec<(usize, usize)>,
    /// Tree of each state with the new leaf attached.
    grown: Vec<LocalTree>,
    /// Normalized log probability of each state after a recombination.
    log_prior: Vec<f64>,
    /// Position spans of the chunks, in order.
    chunks: Vec<(Coord, Coord)>,
    /// Log likelihood per state and chunk.
    emissions: Vec<Vec<f64>>,
}

impl BlockStates {
    fn new(
        model: &ArgModel,
        seqs: &Sequences,
        tree: &LocalTree,
        seqids: &[usize],
        (start, end): (Coord, Coord),
    ) -> Result<Self, ArgError> {
        let ntimes = model.ntimes();
        let mut states = Vec::new();
        for node in 0..tree.nnodes() {
            let lo = tree.age(node).max(1);
            let hi = tree.parent(node).map_or(ntimes - 1, |parent| tree.age(parent));
            states.extend((lo..=hi).map(|time| (node, time)));
        }
        let grown = states
            .iter()
            .map(|&(node, time)| tree.with_new_leaf(node, time))
            .collect::<Result<Vec<_>, _>>()?;

        let lineages = LineageCounts::count(tree, ntimes);
        let mut branches = vec![0usize; ntimes];
        for &(_, time) in &states {
            branches[time] += 1;
        }
        let mut log_prior: Vec<f64> = states
            .iter()
            .map(|&(_, time)| {
                calc_log_coal_prob(model, &lineages, 0, time, None) - (branches[time] as f64).ln()
            })
            .collect();
        let total = log_sum_exp(&log_prior);
        log_prior.iter_mut().for_each(|p| *p -= total);

        let chunks: Vec<(Coord, Coord)> = (start..end)
            .step_by(CHUNK)
            .map(|lo| (lo, (lo + CHUNK).min(end)))
            .collect();
        let emissions = grown
            .iter()
            .map(|tree| calc_tree_likelihood_spans(model, seqs, tree, seqids, &chunks))
            .collect();
        Ok(Self {
            states,
            grown,
            log_prior,
            chunks,
            emissions,
        })
    }

    /// Probability that the new branch of `state` recombines within `chunk`.
    fn switch_prob(&self, model: &ArgModel, state: usize, chunk: usize) -> f64 {
        let (lo, hi) = self.chunks[chunk];
        let time = model.times()[self.states[state].1];
        -(-model.recomb_sum(lo, hi) * time).exp_m1()
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Rescales `column` to sum to one; `None` once no mass is left.
fn normalize(column: &mut [f64]) -> Option<()> {
    let total: f64 = column.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return None;
    }
    column.iter_mut().for_each(|p| *p /= total);
    Some(())
}

/// For every state of `cur`, the state of `prev` it continues across the
/// breakpoint between both blocks: same clade, same time, and grown trees
/// one SPR apart.
fn carried_states(
    prev: &BlockStates,
    prev_tree: &LocalTree,
    cur: &BlockStates,
    cur_tree: &LocalTree,
    ntimes: usize,
) -> Vec<Option<usize>> {
    let prev_clades = prev_tree.leafsets();
    let index: HashMap<(&LeafSet, usize), usize> = prev
        .states
        .iter()
        .enumerate()
        .map(|(idx, &(node, time))| ((&prev_clades[node], time), idx))
        .collect();
    let cur_clades = cur_tree.leafsets();
    cur.states
        .iter()
        .enumerate()
        .map(|(idx, &(node, time))| {
            let &from = index.get(&(&cur_clades[node], time))?;
            find_spr(&prev.grown[from], &cur.grown[idx], ntimes).map(|_| from)
        })
        .collect()
}

/// Threads `seqid` by sampling a path of attachments along the sequence.
///
/// The hidden state of a chunk of at most [`CHUNK`] positions is a branch
/// and time of the local tree. Inside a block the new lineage may recombine
/// between chunks and rejoin anywhere by the coalescent prior; across an
/// existing breakpoint it keeps its clade and time. Returns `None` when no
/// path has positive probability.
fn thread_by_chunks(
    model: &ArgModel,
    seqs: &Sequences,
    trees: &LocalTrees,
    seqid: usize,
    rng: &mut RngHandle,
) -> Result<Option<LocalTrees>, ArgError> {
    let ntimes = model.ntimes();
    let mut seqids = trees.seqids().to_vec();
    seqids.push(seqid);
    let blocks = trees
        .blocks()
        .iter()
        .map(|block| {
            BlockStates::new(model, seqs, &block.tree, &seqids, (block.start, block.end))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let carried: Vec<Vec<Option<usize>>> = (1..blocks.len())
        .map(|b| {
            let old = trees.blocks();
            carried_states(
                &blocks[b - 1],
                &old[b - 1].tree,
                &blocks[b],
                &old[b].tree,
                ntimes,
            )
        })
        .collect();

    // Scaled forward pass, one column per chunk.
    let mut forward: Vec<Vec<Vec<f64>>> = Vec::with_capacity(blocks.len());
    for (b, block) in blocks.iter().enumerate() {
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(block.chunks.len());
        for chunk in 0..block.chunks.len() {
            let emit: Vec<f64> = block.emissions.iter().map(|e| e[chunk]).collect();
            let top = emit.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !top.is_finite() {
                return Ok(None);
            }
            let mut column: Vec<f64> = match (chunk, b) {
                (0, 0) => block.log_prior.iter().map(|p| p.exp()).collect(),
                (0, _) => {
                    let Some(prev) = forward.last().and_then(|cols| cols.last()) else {
                        return Ok(None);
                    };
                    carried[b - 1]
                        .iter()
                        .map(|from| from.map_or(0.0, |from| prev[from]))
                        .collect()
                }
                _ => {
                    let prev = &columns[chunk - 1];
                    let switched: f64 = prev
                        .iter()
                        .enumerate()
                        .map(|(s, p)| p * block.switch_prob(model, s, chunk - 1))
                        .sum();
                    prev.iter()
                        .enumerate()
                        .map(|(s, p)| {
                            p * (1.0 - block.switch_prob(model, s, chunk - 1))
                                + switched * block.log_prior[s].exp()
                        })
                        .collect()
                }
            };
            column
                .iter_mut()
                .zip(&emit)
                .for_each(|(p, e)| *p *= (e - top).exp());
            if normalize(&mut column).is_none() {
                return Ok(None);
            }
            columns.push(column);
        }
        forward.push(columns);
    }

    // Stochastic traceback from the last chunk.
    let mut path: Vec<Vec<usize>> = blocks.iter().map(|b| vec![0; b.chunks.len()]).collect();
    let draw = |weights: Vec<f64>, rng: &mut RngHandle| {
        let logs: Vec<f64> = weights.iter().map(|w| w.ln()).collect();
        sample_log_weights(&logs, rng)
    };
    let mut state: Option<usize> = None;
    for b in (0..blocks.len()).rev() {
        let block = &blocks[b];
        for chunk in (0..block.chunks.len()).rev() {
            let column = &forward[b][chunk];
            let next = match state {
                None => draw(column.clone(), rng),
                Some(next) if chunk + 1 == block.chunks.len() => {
                    // Crossing an existing breakpoint from block `b + 1`.
                    carried[b][next]
                }
                Some(next) => {
                    let weights = column
                        .iter()
                        .enumerate()
                        .map(|(s, p)| {
                            let switch = block.switch_prob(model, s, chunk);
                            let stay = if s == next { 1.0 - switch } else { 0.0 };
                            p * (stay + switch * block.log_prior[next].exp())
                        })
                        .collect();
                    draw(weights, rng)
                }
            };
            let Some(next) = next else {
                return Ok(None);
            };
            path[b][chunk] = next;
            state = Some(next);
        }
    }

    let mut segments: Vec<TreeSegment> = Vec::new();
    for (block, states) in blocks.iter().zip(&path) {
        for (&(start, end), &s) in block.chunks.iter().zip(states) {
            match segments.last_mut() {
                Some(last) if last.end == start && last.tree == block.grown[s] => last.end = end,
                _ => segments.push(TreeSegment {
                    start,
                    end,
                    tree: block.grown[s].clone(),
                }),
            }
        }
    }
    trace!(seqid, segments = segments.len(), "sampled threading path");
    match LocalTrees::from_segments(trees.chrom.clone(), seqids, segments, ntimes) {
        Ok(grown) => Ok(Some(grown)),
        Err(err) => {
            debug!(seqid, %err, "threading path not linkable");
            Ok(None)
        }
    }
}

/// Same clade and time along the whole region, each such attachment
/// weighted by the joint probability of the resulting ARG.
fn thread_uniformly(
    model: &ArgModel,
    seqs: &Sequences,
    trees: &LocalTrees,
    seqid: usize,
    rng: &mut RngHandle,
) -> Result<LocalTrees, ArgError> {
    let ntimes = model.ntimes();
    let candidates = attachments(trees, ntimes);
    let weights: Vec<f64> = candidates
        .iter()
        .map(|candidate| match attach(trees, candidate, seqid, ntimes) {
            Ok(grown) => score_arg(model, seqs, &grown).joint,
            Err(_) => f64::NEG_INFINITY,
        })
        .collect();
    let choice = sample_log_weights(&weights, rng).ok_or_else(|| {
        ArgError::Numeric(
            ErrorInfo::new("seq-sample-stuck", "no attachment has positive probability")
                .with_context("seqid", seqid.to_string())
                .with_context("candidates", candidates.len().to_string()),
        )
    })?;
    let chosen = &candidates[choice];
    debug!(
        seqid,
        time = chosen.time,
        weight = weights[choice],
        "threaded sequence along one branch"
    );
    attach(trees, chosen, seqid, ntimes)
}

/// Threads sequence `seqid` into every local tree.
///
/// The attachment of the new lineage is sampled chunk by chunk with a
/// forward pass and stochastic traceback, so it may recombine within a
/// block. When no path survives, a single attachment for the whole region
/// is drawn instead.
pub fn add_sequence(
    model: &ArgModel,
    seqs: &Sequences,
    trees: &LocalTrees,
    seqid: usize,
    rng: &mut RngHandle,
) -> Result<LocalTrees, ArgError> {
    if let Some(grown) = thread_by_chunks(model, seqs, trees, seqid, rng)? {
        debug!(seqid, blocks = grown.len(), "threaded sequence");
        return Ok(grown);
    }
    thread_uniformly(model, seqs, trees, seqid, rng)
}

/// Adds every sequence missing from `trees`, in index order. Sequence
/// number `k` draws from the `seq` stream of iteration `k`.
pub fn sample_arg_seq(
    model: &ArgModel,
    seqs: &Sequences,
    mut trees: LocalTrees,
    master_seed: u64,
) -> Result<LocalTrees, ArgError> {
    let missing: Vec<usize> = (0..seqs.nseqs())
        .filter(|seqid| !trees.seqids().contains(seqid))
        .collect();
    for seqid in missing {
        let mut rng = RngHandle::from_seed(iteration_seed(master_seed, Stage::Seq, seqid));
        trees = add_sequence(model, seqs, &trees, seqid, &mut rng)?;
    }
    Ok(trees)
}
