use sha2::{Digest, Sha256};

use crate::trees::LocalTrees;

/// Hashes the coordinates, leaf assignment, tree shapes and links of
/// `trees`. Equal structures always hash equal.
pub fn canonical_hash(trees: &LocalTrees) -> String {
    let mut hasher = Sha256::new();
    hasher.update(trees.chrom.as_bytes());
    hasher.update((trees.start() as u64).to_le_bytes());
    hasher.update((trees.end() as u64).to_le_bytes());
    update_slice(trees.seqids(), &mut hasher);
    hasher.update((trees.len() as u64).to_le_bytes());
    for block in trees.blocks() {
        hasher.update((block.start as u64).to_le_bytes());
        hasher.update((block.end as u64).to_le_bytes());
        for node in block.tree.nodes() {
            hasher.update(encode_option(node.parent).to_le_bytes());
            hasher.update((node.age as u64).to_le_bytes());
        }
        match &block.spr {
            None => hasher.update(b"spr:none"),
            Some(spr) => {
                hasher.update(b"spr");
                hasher.update((spr.recomb_node as u64).to_le_bytes());
                hasher.update((spr.recomb_time as u64).to_le_bytes());
                hasher.update((spr.coal_node as u64).to_le_bytes());
                hasher.update((spr.coal_time as u64).to_le_bytes());
            }
        }
    }
    format!("{:x}", hasher.finalize())
}

fn encode_option(value: Option<usize>) -> u64 {
    value.map_or(u64::MAX, |v| v as u64)
}

fn update_slice(values: &[usize], hasher: &mut Sha256) {
    hasher.update((values.len() as u64).to_le_bytes());
    for &value in values {
        hasher.update((value as u64).to_le_bytes());
    }
}
