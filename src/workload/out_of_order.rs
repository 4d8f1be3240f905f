use super::batch::Batch;
use super::mix_seed;
use crate::config::OutOfOrderMode;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Poisson;

/// Reorders records inside a batch before transmission. Only delivery order
/// changes; the set of timestamps written per device is untouched.
#[derive(Debug, Clone)]
pub struct OutOfOrderScheduler {
    mode: OutOfOrderMode,
    poisson: Option<Poisson>,
    max_k: u64,
    ratio: f64,
    seed: u64,
    batches_seen: u64,
}

impl OutOfOrderScheduler {
    pub fn new(mode: OutOfOrderMode, lambda: f64, max_k: u64, ratio: f64, seed: u64) -> Self {
        // A zero rate yields no displacement, which statrs cannot represent.
        let poisson = (lambda > 0.0).then(|| Poisson::new(lambda).ok()).flatten();
        Self {
            mode,
            poisson,
            max_k,
            ratio: ratio.clamp(0.0, 1.0),
            seed,
            batches_seen: 0,
        }
    }

    /// Displacement of the record at stream position `index`, in `0..=max_k`.
    pub fn displacement(&self, index: u64) -> u64 {
        match &self.poisson {
            Some(poisson) => {
                let mut rng = StdRng::seed_from_u64(mix_seed(self.seed, index));
                (poisson.sample(&mut rng) as u64).min(self.max_k)
            }
            None => 0,
        }
    }

    /// Applies the configured mode to `batch` in place.
    pub fn apply(&mut self, batch: &mut Batch) {
        let batch_index = self.batches_seen;
        self.batches_seen += 1;

        match self.mode {
            OutOfOrderMode::Poisson => {
                for segment in &mut batch.segments {
                    let mut keyed: Vec<_> = segment
                        .records
                        .drain(..)
                        .enumerate()
                        .map(|(offset, record)| {
                            (offset as u64 + self.displacement(record.position), record)
                        })
                        .collect();
                    keyed.sort_by_key(|(key, _)| *key);
                    segment.records = keyed.into_iter().map(|(_, record)| record).collect();
                }
            }
            OutOfOrderMode::Batch => {
                let mut rng = StdRng::seed_from_u64(mix_seed(self.seed, batch_index));
                if rng.gen_bool(self.ratio) {
                    for segment in &mut batch.segments {
                        segment.records.reverse();
                    }
                    tracing::trace!(batch_index, "delivering batch in reverse order");
                }
            }
        }
    }
}
