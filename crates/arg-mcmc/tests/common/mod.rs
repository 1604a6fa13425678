#![allow(dead_code)]

use std::fs;
use std::path::Path;

use arg_mcmc::SamplerConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SEQLEN: usize = 1000;

/// Four sequences over `[0, SEQLEN)` with scattered variant columns.
pub fn fasta_text(seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seqs = vec![vec![b'A'; SEQLEN]; 4];
    for pos in (7..SEQLEN).step_by(37) {
        let derived = rng.gen_range(1..4);
        let mut carriers: Vec<usize> = (0..4).filter(|_| rng.gen_bool(0.5)).collect();
        if carriers.is_empty() {
            carriers.push(rng.gen_range(0..4));
        }
        for seq in carriers {
            seqs[seq][pos] = b"ACGT"[derived];
        }
    }
    let mut text = String::new();
    for (idx, seq) in seqs.iter().enumerate() {
        text.push_str(&format!(">n{}\n", idx + 1));
        for line in seq.chunks(60) {
            text.push_str(std::str::from_utf8(line).unwrap());
            text.push('\n');
        }
    }
    text
}

/// Small, fast configuration writing into `dir`.
pub fn small_config(dir: &Path) -> SamplerConfig {
    let fasta = dir.join("input.fa");
    fs::write(&fasta, fasta_text(11)).unwrap();
    let mut config = SamplerConfig::default();
    config.input.fasta = Some(fasta);
    config.model.ntimes = 12;
    config.search.climb = 5;
    config.search.iters = 10;
    config.search.sample_step = 5;
    config.moves.moves_per_iteration = 2;
    config.moves.climb_candidates = 2;
    config.output.prefix = dir.join("out").join("run");
    config.logging.quiet = true;
    config.seed = 2024;
    config
}
