use arg_core::derive_substream_seed;
use serde::{Deserialize, Serialize};

/// Sampler stage, as named in the stats log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Sequential construction of the initial ARG.
    Seq,
    /// Recombination-reducing warm-up.
    Climb,
    /// Genome-wide resampling.
    Resample,
    /// Resampling restricted to one region.
    ResampleRegion,
}

impl Stage {
    /// Name written to the stats log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Seq => "seq",
            Stage::Climb => "climb",
            Stage::Resample => "resample",
            Stage::ResampleRegion => "resample_region",
        }
    }

    fn tag(&self) -> u64 {
        match self {
            Stage::Seq => 1,
            Stage::Climb => 2,
            Stage::Resample => 3,
            Stage::ResampleRegion => 4,
        }
    }
}

/// Seed of the random stream used by one iteration of a stage.
pub fn iteration_seed(master_seed: u64, stage: Stage, iter: usize) -> u64 {
    derive_substream_seed(master_seed, stage.tag() << 48 | iter as u64)
}

/// Seed for state-exchange proposals with a peer chain.
pub fn exchange_seed(master_seed: u64, iter: usize) -> u64 {
    derive_substream_seed(master_seed ^ 0xA5A5_A5A5_A5A5_A5A5, iter as u64)
}

/// Seed of the population-size update following iteration `iter`.
pub fn popsize_seed(master_seed: u64, stage: Stage, iter: usize) -> u64 {
    derive_substream_seed(master_seed ^ 0x5EED_0F_0B0B, stage.tag() << 48 | iter as u64)
}
