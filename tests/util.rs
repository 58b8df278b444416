#![allow(dead_code)]
use dorfler_mark::algs::communicator::ThreadComm;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Run `f` once per rank of a fresh `size`-rank group, each on its own thread.
/// Results come back in rank order.
pub fn run_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(ThreadComm) -> R + Sync,
{
    let comms = ThreadComm::group(size);
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

/// Brute-force global (count, squared error) marked by `threshold`.
pub fn global_marked(parts: &[Vec<f64>], threshold: f64) -> (u64, f64) {
    parts
        .iter()
        .flatten()
        .filter(|&&e| e >= threshold)
        .fold((0, 0.0), |(n, err), &e| (n + 1, err + e * e))
}

pub fn total_error(parts: &[Vec<f64>]) -> f64 {
    parts.iter().flatten().map(|e| e * e).sum()
}

/// Largest threshold whose sorted suffix holds strictly more than
/// `fraction` of the error, or the smallest positive estimate if none does.
pub fn brute_force_threshold(estimates: &[f64], fraction: f64) -> f64 {
    let mut desc: Vec<f64> = estimates.to_vec();
    desc.sort_by(|a, b| b.total_cmp(a));
    let target = fraction * desc.iter().map(|e| e * e).sum::<f64>();
    let mut acc = 0.0;
    for &v in &desc {
        acc += v * v;
        if acc > target {
            return v;
        }
    }
    desc.iter()
        .copied()
        .filter(|&v| v > 0.0)
        .fold(f64::INFINITY, f64::min)
}

/// Reproducible per-rank estimates in `[lo, hi)`.
pub fn random_parts(seed: u64, ranks: usize, per_rank: usize, lo: f64, hi: f64) -> Vec<Vec<f64>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..ranks)
        .map(|_| (0..per_rank).map(|_| rng.gen_range(lo..hi)).collect())
        .collect()
}
