//! Input-volume based sizing of partitions, workers and batches

use super::types::TuningPlan;

const MIN_PARALLELISM: usize = 4;
const MAX_PARALLELISM: usize = 32;

/// (upper bound on records, partition size, batch size, parallelism cap)
const TIERS: [(usize, usize, usize, usize); 2] = [
    (100_000, 20_000, 500, 8),
    (1_000_000, 50_000, 1_000, 16),
];
const LARGE_TIER: (usize, usize, usize) = (100_000, 2_000, 24);

/// Compute the plan for `total_records` body lines
///
/// `cpu_hint` is usually the available core count. Volumes exactly on a
/// tier boundary belong to the lower tier.
pub fn tune(total_records: usize, cpu_hint: usize) -> TuningPlan {
    let safe = cpu_hint
        .saturating_mul(2)
        .clamp(MIN_PARALLELISM, MAX_PARALLELISM);

    let (partition_size, batch_size, cap) = TIERS
        .iter()
        .find(|(bound, ..)| total_records <= *bound)
        .map(|&(_, partition, batch, cap)| (partition, batch, cap))
        .unwrap_or(LARGE_TIER);

    TuningPlan {
        partition_size,
        parallelism: safe.min(cap),
        batch_size,
    }
}

/// Core count of this host, 1 when unknown
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
