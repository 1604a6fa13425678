//! Site compatibility with the local trees.

use crate::leafset::LeafSet;
use crate::sequences::Sequences;
use crate::trees::LocalTrees;

/// Counts sites inside the ARG whose allele split is not a clade of the
/// local tree. Missing bases are ignored; sites with more than two alleles
/// always count.
pub fn count_noncompat(trees: &LocalTrees, seqs: &Sequences) -> usize {
    let nleaves = trees.nleaves();
    let seqids = trees.seqids();
    let mut noncompat = 0;
    for block in trees.blocks() {
        let lo = block.start.max(seqs.offset());
        let hi = block.end.min(seqs.end());
        if lo >= hi {
            continue;
        }
        let clades = block.tree.leafsets();
        for pos in lo..hi {
            let mut alleles: Vec<u8> = Vec::with_capacity(2);
            let mut known = LeafSet::empty(nleaves);
            let mut derived = LeafSet::empty(nleaves);
            for (leaf, &seqid) in seqids.iter().enumerate() {
                let base = seqs.base(seqid, pos);
                if base == b'N' {
                    continue;
                }
                known.insert(leaf);
                match alleles.iter().position(|&a| a == base) {
                    Some(0) => {}
                    Some(_) => derived.insert(leaf),
                    None => {
                        if !alleles.is_empty() {
                            derived.insert(leaf);
                        }
                        alleles.push(base);
                    }
                }
            }
            if alleles.len() < 2 {
                continue;
            }
            if alleles.len() > 2 {
                noncompat += 1;
                continue;
            }
            let ancestral = known.difference(&derived);
            let compatible = clades.iter().any(|clade| {
                let split = known.difference(&known.difference(clade));
                split == derived || split == ancestral
            });
            if !compatible {
                noncompat += 1;
            }
        }
    }
    noncompat
}
