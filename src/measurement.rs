//! Per-client counters, shared latency digests and their aggregation.

pub mod aggregate;
pub mod digest;

pub use aggregate::{BenchReport, KindReport, MeasurementAggregator};
pub use digest::{DigestSet, LatencyDigest, QUANTILE_LADDER};

use crate::workload::OperationKind;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounters {
    pub ok_operations: u64,
    pub fail_operations: u64,
    pub ok_points: u64,
    pub fail_points: u64,
    /// Sum of successful operation latencies.
    pub latency_sum_us: u64,
    /// Largest single-client latency sum folded into this value.
    pub max_client_latency_sum_us: u64,
}

impl OperationCounters {
    fn merge(&mut self, other: &Self) {
        self.ok_operations += other.ok_operations;
        self.fail_operations += other.fail_operations;
        self.ok_points += other.ok_points;
        self.fail_points += other.fail_points;
        self.latency_sum_us += other.latency_sum_us;
        self.max_client_latency_sum_us = self
            .max_client_latency_sum_us
            .max(other.max_client_latency_sum_us);
    }
}

/// Counters owned by one client while it runs. Merging is associative and
/// commutative, so results do not depend on the order clients finish in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Measurement {
    counters: [OperationCounters; OperationKind::COUNT],
    pub create_schema_time: Duration,
    pub elapsed: Duration,
}

impl Measurement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self, kind: OperationKind) -> &OperationCounters {
        &self.counters[kind.index()]
    }

    pub fn record_ok(&mut self, kind: OperationKind, points: u64, latency_us: u64) {
        let counters = &mut self.counters[kind.index()];
        counters.ok_operations += 1;
        counters.ok_points += points;
        counters.latency_sum_us += latency_us;
        counters.max_client_latency_sum_us = counters.latency_sum_us;
    }

    pub fn record_failure(&mut self, kind: OperationKind, points: u64) {
        let counters = &mut self.counters[kind.index()];
        counters.fail_operations += 1;
        counters.fail_points += points;
    }

    /// Total operations issued so far, successful or not.
    pub fn operations(&self) -> u64 {
        self.counters
            .iter()
            .map(|c| c.ok_operations + c.fail_operations)
            .sum()
    }

    pub fn merge(&mut self, other: &Measurement) {
        for (mine, theirs) in self.counters.iter_mut().zip(&other.counters) {
            mine.merge(theirs);
        }
        self.create_schema_time = self.create_schema_time.max(other.create_schema_time);
        self.elapsed = self.elapsed.max(other.elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ok: u64, fail: u64, latency_us: u64, elapsed_ms: u64) -> Measurement {
        let mut m = Measurement::new();
        for _ in 0..ok {
            m.record_ok(OperationKind::Ingestion, 10, latency_us);
        }
        for _ in 0..fail {
            m.record_failure(OperationKind::Ingestion, 10);
        }
        m.record_ok(OperationKind::GroupBy, 3, latency_us * 2);
        m.elapsed = Duration::from_millis(elapsed_ms);
        m
    }

    fn merged(parts: &[&Measurement]) -> Measurement {
        let mut out = Measurement::new();
        for part in parts {
            out.merge(part);
        }
        out
    }

    #[test]
    fn merge_is_associative_and_commutative() {
        let a = sample(3, 1, 120, 40);
        let b = sample(5, 0, 75, 90);
        let c = sample(0, 4, 1_000, 10);

        let mut left = merged(&[&a, &b]);
        left.merge(&c);
        let mut right_tail = merged(&[&b, &c]);
        let mut right = a.clone();
        right.merge(&right_tail);
        assert_eq!(left, right);

        right_tail = merged(&[&c, &a, &b]);
        assert_eq!(left, right_tail);
    }

    #[test]
    fn merge_keeps_slowest_client_sum() {
        let a = sample(2, 0, 100, 1);
        let b = sample(1, 0, 500, 1);
        let total = merged(&[&a, &b]);
        let ingestion = total.counters(OperationKind::Ingestion);
        assert_eq!(ingestion.latency_sum_us, 700);
        assert_eq!(ingestion.max_client_latency_sum_us, 500);
        assert_eq!(ingestion.ok_points, 30);
    }

    #[test]
    fn failures_do_not_touch_latency() {
        let m = sample(0, 3, 50, 1);
        let ingestion = m.counters(OperationKind::Ingestion);
        assert_eq!(ingestion.fail_operations, 3);
        assert_eq!(ingestion.fail_points, 30);
        assert_eq!(ingestion.latency_sum_us, 0);
        assert_eq!(m.operations(), 4);
    }
}
