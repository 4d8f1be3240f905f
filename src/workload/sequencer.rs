use super::OperationKind;
use crate::error::BenchError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Splits `total` into per-kind counts proportional to `ratios` using
/// largest-remainder rounding. Ties go to the lower index. The counts always
/// sum to `total`.
pub fn allocate_counts(total: u64, ratios: &[f64]) -> Result<Vec<u64>, BenchError> {
    if ratios.iter().any(|r| !r.is_finite() || *r < 0.0) {
        return Err(BenchError::config("operation ratios must be non-negative"));
    }
    let sum: f64 = ratios.iter().sum();
    if sum <= 0.0 {
        return Err(BenchError::config("operation ratios sum to zero"));
    }

    let quotas: Vec<f64> = ratios.iter().map(|r| total as f64 * r / sum).collect();
    let mut counts: Vec<u64> = quotas.iter().map(|q| q.floor() as u64).collect();
    let assigned: u64 = counts.iter().sum();
    let mut leftover = total.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..ratios.len()).filter(|i| ratios[*i] > 0.0).collect();
    // Stable sort keeps lower indices first among equal remainders.
    order.sort_by(|a, b| {
        let ra = quotas[*a] - quotas[*a].floor();
        let rb = quotas[*b] - quotas[*b].floor();
        rb.total_cmp(&ra)
    });
    for index in order.iter().cycle() {
        if leftover == 0 {
            break;
        }
        counts[*index] += 1;
        leftover -= 1;
    }
    Ok(counts)
}

/// The exact operation schedule of one client, consumed once.
#[derive(Debug)]
pub struct OperationSequencer {
    counts: Vec<u64>,
    sequence: std::vec::IntoIter<OperationKind>,
}

impl OperationSequencer {
    pub fn new(total: u64, ratios: &[f64], seed: u64) -> Result<Self, BenchError> {
        if ratios.len() != OperationKind::COUNT {
            return Err(BenchError::config(format!(
                "expected {} operation ratios, got {}",
                OperationKind::COUNT,
                ratios.len()
            )));
        }
        let counts = allocate_counts(total, ratios)?;
        let mut sequence = Vec::with_capacity(total as usize);
        for (kind, count) in OperationKind::ALL.iter().zip(&counts) {
            sequence.extend(std::iter::repeat(*kind).take(*count as usize));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        sequence.shuffle(&mut rng);

        Ok(Self {
            counts,
            sequence: sequence.into_iter(),
        })
    }

    /// Planned number of `kind` operations in this schedule.
    pub fn allocated(&self, kind: OperationKind) -> u64 {
        self.counts[kind.index()]
    }

    pub fn remaining(&self) -> usize {
        self.sequence.len()
    }
}

impl Iterator for OperationSequencer {
    type Item = OperationKind;

    fn next(&mut self) -> Option<Self::Item> {
        self.sequence.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.sequence.size_hint()
    }
}
