use super::memory::{MemoryStore, MemoryTarget};
use super::{Status, TargetSystem};
use crate::error::BenchError;
use crate::schema::DeviceSchema;
use crate::workload::query::{
    AggRangeQuery, AggRangeValueQuery, AggValueQuery, GroupByQuery, LatestPointQuery,
    PreciseQuery, RangeQuery, ValueRangeQuery,
};
use crate::workload::Batch;
use std::sync::Arc;

pub const BACKEND_NAMES: [&str; 2] = ["memory", "null"];

/// Accepts every write and answers every query with zero points.
#[derive(Debug, Default)]
pub struct NullTarget;

impl TargetSystem for NullTarget {
    async fn open(&mut self) -> Result<(), BenchError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BenchError> {
        Ok(())
    }

    async fn register_schema(&mut self, _devices: &[Arc<DeviceSchema>]) -> Result<(), BenchError> {
        Ok(())
    }

    async fn cleanup(&mut self, _devices: &[Arc<DeviceSchema>]) -> Result<(), BenchError> {
        Ok(())
    }

    async fn insert_by_record(&mut self, batch: &Batch) -> Status {
        Status::ok(batch.point_count())
    }

    async fn insert_by_records(&mut self, batch: &Batch) -> Status {
        Status::ok(batch.point_count())
    }

    async fn insert_by_columnar_batch(&mut self, batch: &Batch) -> Status {
        Status::ok(batch.point_count())
    }

    async fn precise_point(&mut self, _query: &PreciseQuery) -> Status {
        Status::ok(0)
    }

    async fn time_range(&mut self, _query: &RangeQuery) -> Status {
        Status::ok(0)
    }

    async fn time_range_value_filter(&mut self, _query: &ValueRangeQuery) -> Status {
        Status::ok(0)
    }

    async fn agg_time(&mut self, _query: &AggRangeQuery) -> Status {
        Status::ok(0)
    }

    async fn agg_value(&mut self, _query: &AggValueQuery) -> Status {
        Status::ok(0)
    }

    async fn agg_time_value(&mut self, _query: &AggRangeValueQuery) -> Status {
        Status::ok(0)
    }

    async fn group_by(&mut self, _query: &GroupByQuery) -> Status {
        Status::ok(0)
    }

    async fn last_point(&mut self, _query: &LatestPointQuery) -> Status {
        Status::ok(0)
    }

    async fn time_range_desc(&mut self, _query: &RangeQuery) -> Status {
        Status::ok(0)
    }

    async fn time_range_value_desc(&mut self, _query: &ValueRangeQuery) -> Status {
        Status::ok(0)
    }
}

/// A target selected by name from configuration.
#[derive(Debug)]
pub enum Backend {
    Memory(MemoryTarget),
    Null(NullTarget),
}

macro_rules! delegate {
    ($self:ident, $method:ident($($arg:expr),*)) => {
        match $self {
            Backend::Memory(target) => target.$method($($arg),*).await,
            Backend::Null(target) => target.$method($($arg),*).await,
        }
    };
}

impl TargetSystem for Backend {
    async fn open(&mut self) -> Result<(), BenchError> {
        delegate!(self, open())
    }

    async fn close(&mut self) -> Result<(), BenchError> {
        delegate!(self, close())
    }

    async fn register_schema(&mut self, devices: &[Arc<DeviceSchema>]) -> Result<(), BenchError> {
        delegate!(self, register_schema(devices))
    }

    async fn cleanup(&mut self, devices: &[Arc<DeviceSchema>]) -> Result<(), BenchError> {
        delegate!(self, cleanup(devices))
    }

    async fn insert_by_record(&mut self, batch: &Batch) -> Status {
        delegate!(self, insert_by_record(batch))
    }

    async fn insert_by_records(&mut self, batch: &Batch) -> Status {
        delegate!(self, insert_by_records(batch))
    }

    async fn insert_by_columnar_batch(&mut self, batch: &Batch) -> Status {
        delegate!(self, insert_by_columnar_batch(batch))
    }

    async fn precise_point(&mut self, query: &PreciseQuery) -> Status {
        delegate!(self, precise_point(query))
    }

    async fn time_range(&mut self, query: &RangeQuery) -> Status {
        delegate!(self, time_range(query))
    }

    async fn time_range_value_filter(&mut self, query: &ValueRangeQuery) -> Status {
        delegate!(self, time_range_value_filter(query))
    }

    async fn agg_time(&mut self, query: &AggRangeQuery) -> Status {
        delegate!(self, agg_time(query))
    }

    async fn agg_value(&mut self, query: &AggValueQuery) -> Status {
        delegate!(self, agg_value(query))
    }

    async fn agg_time_value(&mut self, query: &AggRangeValueQuery) -> Status {
        delegate!(self, agg_time_value(query))
    }

    async fn group_by(&mut self, query: &GroupByQuery) -> Status {
        delegate!(self, group_by(query))
    }

    async fn last_point(&mut self, query: &LatestPointQuery) -> Status {
        delegate!(self, last_point(query))
    }

    async fn time_range_desc(&mut self, query: &RangeQuery) -> Status {
        delegate!(self, time_range_desc(query))
    }

    async fn time_range_value_desc(&mut self, query: &ValueRangeQuery) -> Status {
        delegate!(self, time_range_value_desc(query))
    }
}

/// Creates one connection per client for a named backend. Connections of
/// the same factory share state, so every client of a run sees one store.
#[derive(Debug, Clone)]
pub enum BackendFactory {
    Memory(Arc<MemoryStore>),
    Null,
}

impl BackendFactory {
    pub fn from_name(name: &str) -> Result<Self, BenchError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory(MemoryStore::new())),
            "null" => Ok(Self::Null),
            other => Err(BenchError::config(format!(
                "unknown backend {other:?}; expected one of {}",
                BACKEND_NAMES.join(", ")
            ))),
        }
    }

    pub fn connect(&self) -> Backend {
        match self {
            Self::Memory(store) => Backend::Memory(MemoryTarget::new(store.clone())),
            Self::Null => Backend::Null(NullTarget),
        }
    }

    pub fn memory_store(&self) -> Option<&Arc<MemoryStore>> {
        match self {
            Self::Memory(store) => Some(store),
            Self::Null => None,
        }
    }
}
