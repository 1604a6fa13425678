#![deny(missing_docs)]
//! Local trees, SPR events and the local-tree sequence that represents an
//! ARG, together with the alignment inputs and the `.smc` format.

/// Site compatibility counts.
pub mod compat;
/// Alignment compression mappings.
pub mod compress;
/// Structural hashing of local-tree sequences.
pub mod hash;
/// Leaf bit sets.
pub mod leafset;
/// Per-time lineage counts.
pub mod lineages;
/// Haplotype alignments.
pub mod sequences;
/// Variant-site alignments.
pub mod sites;
/// `.smc` reading and writing.
pub mod smc;
/// SPR events, node mappings and tree linking.
pub mod spr;
/// Binary local trees.
pub mod tree;
/// Local-tree sequences.
pub mod trees;

pub use compat::count_noncompat;
pub use compress::{
    compress_local_trees, compress_sites, uncompress_local_trees, uncompress_sites, SitesMapping,
};
pub use hash::canonical_hash;
pub use leafset::LeafSet;
pub use lineages::LineageCounts;
pub use sequences::{check_seq_name, Sequences};
pub use sites::Sites;
pub use smc::{load_arg, read_local_trees, store_arg, write_local_trees};
pub use spr::{apply_spr, find_spr, link_trees, same_tree, NodeMapping, Spr};
pub use tree::{LocalNode, LocalTree};
pub use trees::{LocalTreeSpr, LocalTrees, SpliceUndo, TreeSegment};
