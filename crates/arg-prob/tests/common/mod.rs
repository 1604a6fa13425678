#![allow(dead_code)]

use arg_model::{ArgModel, TimeModel};
use arg_tree::spr::broken_parent;
use arg_tree::{apply_spr, LocalTree, LocalTrees, Sequences, Spr, TreeSegment};
use rand::rngs::StdRng;
use rand::Rng;

pub const NTIMES: usize = 20;

pub fn model() -> ArgModel {
    let time = TimeModel::log_spaced(200e3, NTIMES).unwrap();
    ArgModel::new(time, 1e4, 2.5e-8, 1.5e-8).unwrap()
}

pub fn balanced_four() -> LocalTree {
    LocalTree::from_parents(
        &[Some(4), Some(4), Some(5), Some(5), Some(6), Some(6), None],
        &[0, 0, 0, 0, 2, 3, 6],
    )
    .unwrap()
}

pub fn moved_four() -> LocalTree {
    let spr = Spr {
        recomb_node: 0,
        recomb_time: 1,
        coal_node: 2,
        coal_time: 2,
    };
    apply_spr(&balanced_four(), &spr, NTIMES).unwrap()
}

/// Balanced, moved, balanced over `[0, 100)`, `[100, 200)`, `[200, 300)`.
pub fn three_blocks() -> LocalTrees {
    let segment = |start, end, tree| TreeSegment { start, end, tree };
    LocalTrees::from_segments(
        "chr1",
        vec![0, 1, 2, 3],
        vec![
            segment(0, 100, balanced_four()),
            segment(100, 200, moved_four()),
            segment(200, 300, balanced_four()),
        ],
        NTIMES,
    )
    .unwrap()
}

/// Four sequences over `[0, 300)` with a handful of variant columns.
pub fn four_seqs() -> Sequences {
    let mut seqs = vec![vec![b'A'; 300]; 4];
    for (pos, col) in [(5, b"AACC"), (120, b"ACAC"), (150, b"AANN"), (250, b"GAAA")] {
        for (seq, &base) in seqs.iter_mut().zip(col.iter()) {
            seq[pos] = base;
        }
    }
    let names = ["n1", "n2", "n3", "n4"].map(String::from).to_vec();
    Sequences::new(names, seqs, 0).unwrap()
}

/// Coalescent-shaped random tree with strictly increasing internal ages.
pub fn random_tree(nleaves: usize, ntimes: usize, rng: &mut StdRng) -> LocalTree {
    let nnodes = 2 * nleaves - 1;
    let mut parents = vec![None; nnodes];
    let mut ages = vec![0; nnodes];
    let mut active: Vec<usize> = (0..nleaves).collect();
    let mut time = 0;
    for node in nleaves..nnodes {
        let a = active.swap_remove(rng.gen_range(0..active.len()));
        let b = active.swap_remove(rng.gen_range(0..active.len()));
        time = (time + rng.gen_range(1..=2)).min(ntimes - 1);
        parents[a] = Some(node);
        parents[b] = Some(node);
        ages[node] = time;
        active.push(node);
    }
    LocalTree::from_parents(&parents, &ages).unwrap()
}

/// Every visible SPR of `tree`: each recombination point on a non-root
/// branch and each re-coalescence point in the broken tree.
pub fn all_visible_sprs(tree: &LocalTree, ntimes: usize) -> Vec<Spr> {
    let mut sprs = Vec::new();
    for recomb_node in 0..tree.nnodes() {
        let Some(broken) = tree.parent(recomb_node) else {
            continue;
        };
        for recomb_time in tree.age(recomb_node)..tree.age(broken) {
            for coal_node in 0..tree.nnodes() {
                if coal_node == broken || tree.is_descendant(coal_node, recomb_node) {
                    continue;
                }
                let low = recomb_time.max(tree.age(coal_node));
                let high = broken_parent(tree, recomb_node, coal_node)
                    .map_or(ntimes - 1, |p| tree.age(p));
                for coal_time in low..=high {
                    sprs.push(Spr {
                        recomb_node,
                        recomb_time,
                        coal_node,
                        coal_time,
                    });
                }
            }
        }
    }
    sprs
}
