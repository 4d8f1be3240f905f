use super::digest::{DigestSet, QUANTILE_LADDER};
use super::Measurement;
use crate::workload::OperationKind;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindReport {
    pub kind: OperationKind,
    pub ok_operations: u64,
    pub ok_points: u64,
    pub fail_operations: u64,
    pub fail_points: u64,
    /// Successful points per second of run time.
    pub throughput: f64,
    pub avg_latency_ms: f64,
    pub max_client_latency_sum_ms: f64,
    /// Latencies at each rung of [`QUANTILE_LADDER`].
    pub quantiles_ms: [f64; QUANTILE_LADDER.len()],
}

impl KindReport {
    pub fn ran(&self) -> bool {
        self.ok_operations + self.fail_operations > 0
    }

    pub fn min_ms(&self) -> f64 {
        self.quantiles_ms[0]
    }

    pub fn max_ms(&self) -> f64 {
        self.quantiles_ms[QUANTILE_LADDER.len() - 1]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub clients: usize,
    pub failed_clients: usize,
    pub create_schema_secs: f64,
    pub elapsed_secs: f64,
    pub kinds: Vec<KindReport>,
}

impl BenchReport {
    pub fn kind(&self, kind: OperationKind) -> &KindReport {
        &self.kinds[kind.index()]
    }

    /// Kinds that issued at least one operation.
    pub fn executed(&self) -> impl Iterator<Item = &KindReport> {
        self.kinds.iter().filter(|k| k.ran())
    }
}

/// Folds client measurements and the shared digests into a report. Runs once,
/// after every client has finished.
#[derive(Debug, Clone)]
pub struct MeasurementAggregator {
    digests: Arc<DigestSet>,
}

impl MeasurementAggregator {
    pub fn new(digests: Arc<DigestSet>) -> Self {
        Self { digests }
    }

    pub fn merge<'a>(measurements: impl IntoIterator<Item = &'a Measurement>) -> Measurement {
        let mut total = Measurement::new();
        for measurement in measurements {
            total.merge(measurement);
        }
        total
    }

    pub fn aggregate(&self, measurements: &[Measurement], failed_clients: usize) -> BenchReport {
        let total = Self::merge(measurements);
        let elapsed_secs = total.elapsed.as_secs_f64();

        let kinds = OperationKind::ALL
            .iter()
            .map(|kind| {
                let counters = total.counters(*kind);
                let avg_latency_ms = if counters.ok_operations == 0 {
                    0.0
                } else {
                    counters.latency_sum_us as f64 / counters.ok_operations as f64 / 1_000.0
                };
                let throughput = if elapsed_secs > 0.0 {
                    counters.ok_points as f64 / elapsed_secs
                } else {
                    0.0
                };
                KindReport {
                    kind: *kind,
                    ok_operations: counters.ok_operations,
                    ok_points: counters.ok_points,
                    fail_operations: counters.fail_operations,
                    fail_points: counters.fail_points,
                    throughput,
                    avg_latency_ms,
                    max_client_latency_sum_ms: counters.max_client_latency_sum_us as f64 / 1_000.0,
                    quantiles_ms: self.digests.get(*kind).ladder_ms(),
                }
            })
            .collect();

        BenchReport {
            clients: measurements.len() + failed_clients,
            failed_clients,
            create_schema_secs: total.create_schema_time.as_secs_f64(),
            elapsed_secs,
            kinds,
        }
    }
}
