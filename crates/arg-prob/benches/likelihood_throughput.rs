use arg_model::{ArgModel, TimeModel};
use arg_prob::{calc_arg_likelihood, calc_arg_prior};
use arg_tree::{LocalTree, LocalTrees, Sequences};
use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NTIMES: usize = 20;
const NLEAVES: usize = 8;
const LENGTH: usize = 100_000;

fn caterpillar() -> LocalTree {
    let nnodes = 2 * NLEAVES - 1;
    let mut parents = vec![None; nnodes];
    let mut ages = vec![0; nnodes];
    let mut below = 0;
    for (step, node) in (NLEAVES..nnodes).enumerate() {
        parents[below] = Some(node);
        parents[step + 1] = Some(node);
        ages[node] = step + 1;
        below = node;
    }
    LocalTree::from_parents(&parents, &ages).expect("tree")
}

fn sequences() -> Sequences {
    let mut rng = StdRng::seed_from_u64(7);
    let mut seqs = vec![vec![b'A'; LENGTH]; NLEAVES];
    for _ in 0..LENGTH / 100 {
        let pos = rng.gen_range(0..LENGTH);
        for seq in &mut seqs {
            if rng.gen_bool(0.3) {
                seq[pos] = b'G';
            }
        }
    }
    let names = (0..NLEAVES).map(|i| format!("s{i}")).collect();
    Sequences::new(names, seqs, 0).expect("sequences")
}

fn bench_scoring(c: &mut Criterion) {
    let time = TimeModel::log_spaced(200e3, NTIMES).expect("times");
    let model = ArgModel::new(time, 1e4, 2.5e-8, 1.5e-8).expect("model");
    let seqs = sequences();
    let trees = LocalTrees::from_tree("chr1", 0, LENGTH, caterpillar(), (0..NLEAVES).collect())
        .expect("trees");
    c.bench_function("arg_likelihood_100kb", |b| {
        b.iter(|| calc_arg_likelihood(&model, &seqs, &trees, 0, LENGTH));
    });
    c.bench_function("arg_prior_100kb", |b| {
        b.iter(|| calc_arg_prior(&model, &trees, 0, LENGTH));
    });
}

criterion_group!(benches, bench_scoring);
criterion_main!(benches);
