//! The boundary to the system under test.

pub mod memory;
pub mod registry;

pub use memory::{MemoryStore, MemoryTarget};
pub use registry::{Backend, BackendFactory, NullTarget};

use crate::config::InsertMode;
use crate::error::BenchError;
use crate::schema::DeviceSchema;
use crate::workload::query::{
    AggRangeQuery, AggRangeValueQuery, AggValueQuery, GroupByQuery, LatestPointQuery,
    PreciseQuery, RangeQuery, ValueRangeQuery,
};
use crate::workload::{Batch, Query};
use std::future::Future;
use std::sync::Arc;

/// Outcome of one call against the target. Failures travel as values.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub ok: bool,
    /// Points applied by a write or returned by a query.
    pub points: u64,
    pub error: Option<BenchError>,
}

impl Status {
    pub fn ok(points: u64) -> Self {
        Self {
            ok: true,
            points,
            error: None,
        }
    }

    pub fn failed(error: BenchError) -> Self {
        Self {
            ok: false,
            points: 0,
            error: Some(error),
        }
    }
}

/// A data store driven by the benchmark. One instance per client connection.
pub trait TargetSystem: Send {
    fn open(&mut self) -> impl Future<Output = Result<(), BenchError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), BenchError>> + Send;

    fn register_schema(
        &mut self,
        devices: &[Arc<DeviceSchema>],
    ) -> impl Future<Output = Result<(), BenchError>> + Send;

    /// Deletes data previously written for `devices`. Registered schema is kept.
    fn cleanup(
        &mut self,
        devices: &[Arc<DeviceSchema>],
    ) -> impl Future<Output = Result<(), BenchError>> + Send;

    /// Writes the batch one record per call.
    fn insert_by_record(&mut self, batch: &Batch) -> impl Future<Output = Status> + Send;

    /// Writes the batch as one row-oriented call.
    fn insert_by_records(&mut self, batch: &Batch) -> impl Future<Output = Status> + Send;

    /// Writes the batch as one column-oriented call.
    fn insert_by_columnar_batch(&mut self, batch: &Batch) -> impl Future<Output = Status> + Send;

    fn precise_point(&mut self, query: &PreciseQuery) -> impl Future<Output = Status> + Send;

    fn time_range(&mut self, query: &RangeQuery) -> impl Future<Output = Status> + Send;

    fn time_range_value_filter(
        &mut self,
        query: &ValueRangeQuery,
    ) -> impl Future<Output = Status> + Send;

    fn agg_time(&mut self, query: &AggRangeQuery) -> impl Future<Output = Status> + Send;

    fn agg_value(&mut self, query: &AggValueQuery) -> impl Future<Output = Status> + Send;

    fn agg_time_value(
        &mut self,
        query: &AggRangeValueQuery,
    ) -> impl Future<Output = Status> + Send;

    fn group_by(&mut self, query: &GroupByQuery) -> impl Future<Output = Status> + Send;

    fn last_point(&mut self, query: &LatestPointQuery) -> impl Future<Output = Status> + Send;

    fn time_range_desc(&mut self, query: &RangeQuery) -> impl Future<Output = Status> + Send;

    fn time_range_value_desc(
        &mut self,
        query: &ValueRangeQuery,
    ) -> impl Future<Output = Status> + Send;
}

/// Writes `batch` through the configured insert path.
pub async fn dispatch_insert<T: TargetSystem>(target: &mut T, mode: InsertMode, batch: &Batch) -> Status {
    match mode {
        InsertMode::Record => target.insert_by_record(batch).await,
        InsertMode::Records => target.insert_by_records(batch).await,
        InsertMode::Columnar => target.insert_by_columnar_batch(batch).await,
    }
}

/// Routes a generated query to the matching target call.
pub async fn dispatch_query<T: TargetSystem>(target: &mut T, query: &Query) -> Status {
    match query {
        Query::PrecisePoint(q) => target.precise_point(q).await,
        Query::TimeRange(q) => target.time_range(q).await,
        Query::TimeRangeValueFilter(q) => target.time_range_value_filter(q).await,
        Query::AggTime(q) => target.agg_time(q).await,
        Query::AggValue(q) => target.agg_value(q).await,
        Query::AggTimeValue(q) => target.agg_time_value(q).await,
        Query::GroupBy(q) => target.group_by(q).await,
        Query::LastPoint(q) => target.last_point(q).await,
        Query::TimeRangeDesc(q) => target.time_range_desc(q).await,
        Query::TimeRangeValueDesc(q) => target.time_range_value_desc(q).await,
    }
}
