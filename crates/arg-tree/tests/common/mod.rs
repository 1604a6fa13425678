#![allow(dead_code)]

use arg_tree::spr::broken_parent;
use arg_tree::{LocalTree, Spr};
use rand::rngs::StdRng;
use rand::Rng;

pub const NTIMES: usize = 20;

/// `((0,1):2, (2,3):3):6` with internal nodes 4, 5 and root 6.
pub fn balanced_four() -> LocalTree {
    LocalTree::from_parents(
        &[Some(4), Some(4), Some(5), Some(5), Some(6), Some(6), None],
        &[0, 0, 0, 0, 2, 3, 6],
    )
    .unwrap()
}

/// `((0,2):2, (1,3):3):6`, two SPRs away from [`balanced_four`].
pub fn crossed_four() -> LocalTree {
    LocalTree::from_parents(
        &[Some(4), Some(5), Some(4), Some(5), Some(6), Some(6), None],
        &[0, 0, 0, 0, 2, 3, 6],
    )
    .unwrap()
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

/// Draws a valid visible SPR for `tree`, if the draw lands on one.
pub fn random_spr(tree: &LocalTree, ntimes: usize, rng: &mut StdRng) -> Option<Spr> {
    let recomb_node = rng.gen_range(0..tree.nnodes());
    let broken = tree.parent(recomb_node)?;
    if tree.age(recomb_node) >= tree.age(broken) {
        return None;
    }
    let recomb_time = rng.gen_range(tree.age(recomb_node)..tree.age(broken));
    let coal_node = rng.gen_range(0..tree.nnodes());
    if coal_node == broken || tree.is_descendant(coal_node, recomb_node) {
        return None;
    }
    let low = recomb_time.max(tree.age(coal_node));
    let high = broken_parent(tree, recomb_node, coal_node).map_or(ntimes - 1, |p| tree.age(p));
    if low > high {
        return None;
    }
    Some(Spr {
        recomb_node,
        recomb_time,
        coal_node,
        coal_time: rng.gen_range(low..=high),
    })
}
