use crate::error::BenchError;
use crate::workload::OperationKind;
use hdrhistogram::Histogram;
use std::sync::{Mutex, MutexGuard};

/// Highest trackable latency: one hour, in microseconds.
const MAX_LATENCY_US: u64 = 3_600_000_000;

/// Percentiles reported for every operation kind.
pub const QUANTILE_LADDER: [f64; 10] = [0.0, 10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0, 99.9, 100.0];

/// Bounded-memory latency distribution for one operation kind.
///
/// Samples are whole microseconds. Memory is fixed by the significant-figure
/// setting, independent of how many samples are recorded.
#[derive(Debug)]
pub struct LatencyDigest {
    histogram: Mutex<Histogram<u64>>,
}

impl LatencyDigest {
    pub fn new(significant_figures: u8) -> Result<Self, BenchError> {
        let histogram = Histogram::<u64>::new_with_bounds(1, MAX_LATENCY_US, significant_figures)
            .map_err(|err| BenchError::config(format!("invalid latency digest settings: {err:?}")))?;
        Ok(Self {
            histogram: Mutex::new(histogram),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Histogram<u64>> {
        match self.histogram.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn record_micros(&self, micros: u64) {
        self.lock().saturating_record(micros);
    }

    pub fn len(&self) -> u64 {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Latency in milliseconds at `percentile` (0..=100). The extremes report
    /// the tracked minimum and maximum so the ladder brackets every sample.
    pub fn quantile_ms(&self, percentile: f64) -> f64 {
        let histogram = self.lock();
        if histogram.is_empty() {
            return 0.0;
        }
        micros_at(&histogram, percentile) as f64 / 1_000.0
    }

    /// The whole ladder under one lock acquisition.
    pub fn ladder_ms(&self) -> [f64; QUANTILE_LADDER.len()] {
        let histogram = self.lock();
        let mut out = [0.0; QUANTILE_LADDER.len()];
        if histogram.is_empty() {
            return out;
        }
        for (slot, percentile) in out.iter_mut().zip(QUANTILE_LADDER) {
            *slot = micros_at(&histogram, percentile) as f64 / 1_000.0;
        }
        out
    }
}

fn micros_at(histogram: &Histogram<u64>, percentile: f64) -> u64 {
    if percentile <= 0.0 {
        histogram.min()
    } else if percentile >= 100.0 {
        histogram.max()
    } else {
        histogram.value_at_quantile(percentile / 100.0)
    }
}

/// One digest per operation kind, shared by every client of a run.
#[derive(Debug)]
pub struct DigestSet {
    digests: Vec<LatencyDigest>,
}

impl DigestSet {
    pub fn new(significant_figures: u8) -> Result<Self, BenchError> {
        let digests = OperationKind::ALL
            .iter()
            .map(|_| LatencyDigest::new(significant_figures))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { digests })
    }

    pub fn get(&self, kind: OperationKind) -> &LatencyDigest {
        &self.digests[kind.index()]
    }

    pub fn record(&self, kind: OperationKind, micros: u64) {
        self.get(kind).record_micros(micros);
    }
}
