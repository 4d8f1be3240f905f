use super::OperationKind;
use crate::config::Config;
use crate::schema::DeviceSchema;
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use std::sync::Arc;

/// Devices and sensor indices a query touches.
#[derive(Debug, Clone)]
pub struct Selection {
    pub devices: Vec<Arc<DeviceSchema>>,
    pub sensors: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct PreciseQuery {
    pub selection: Selection,
    pub timestamp: i64,
}

/// Closed interval `[start, end]`.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    pub selection: Selection,
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone)]
pub struct ValueRangeQuery {
    pub range: RangeQuery,
    pub min_value: f64,
}

#[derive(Debug, Clone)]
pub struct AggRangeQuery {
    pub range: RangeQuery,
    pub aggregate: String,
}

#[derive(Debug, Clone)]
pub struct AggValueQuery {
    pub selection: Selection,
    pub aggregate: String,
    pub min_value: f64,
}

#[derive(Debug, Clone)]
pub struct AggRangeValueQuery {
    pub range: RangeQuery,
    pub aggregate: String,
    pub min_value: f64,
}

#[derive(Debug, Clone)]
pub struct GroupByQuery {
    pub range: RangeQuery,
    pub aggregate: String,
    pub granularity: i64,
}

#[derive(Debug, Clone)]
pub struct LatestPointQuery {
    pub selection: Selection,
}

#[derive(Debug, Clone)]
pub enum Query {
    PrecisePoint(PreciseQuery),
    TimeRange(RangeQuery),
    TimeRangeValueFilter(ValueRangeQuery),
    AggTime(AggRangeQuery),
    AggValue(AggValueQuery),
    AggTimeValue(AggRangeValueQuery),
    GroupBy(GroupByQuery),
    LastPoint(LatestPointQuery),
    TimeRangeDesc(RangeQuery),
    TimeRangeValueDesc(ValueRangeQuery),
}

impl Query {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::PrecisePoint(_) => OperationKind::PrecisePoint,
            Self::TimeRange(_) => OperationKind::TimeRange,
            Self::TimeRangeValueFilter(_) => OperationKind::TimeRangeValueFilter,
            Self::AggTime(_) => OperationKind::AggTime,
            Self::AggValue(_) => OperationKind::AggValue,
            Self::AggTimeValue(_) => OperationKind::AggTimeValue,
            Self::GroupBy(_) => OperationKind::GroupBy,
            Self::LastPoint(_) => OperationKind::LastPoint,
            Self::TimeRangeDesc(_) => OperationKind::TimeRangeDesc,
            Self::TimeRangeValueDesc(_) => OperationKind::TimeRangeValueDesc,
        }
    }
}

/// Builds query parameters from the query seed. Each kind walks its own
/// window forward by `step_size` grid steps per issued query.
#[derive(Debug)]
pub struct QueryGenerator {
    schemas: Vec<Arc<DeviceSchema>>,
    rng: StdRng,
    start_timestamp: i64,
    point_step: i64,
    step_size: i64,
    interval: i64,
    group_by_unit: i64,
    device_num: usize,
    sensor_num: usize,
    aggregate: String,
    lower_value: f64,
    /// Shift precise-point timestamps half a step off the write grid.
    empty_precise_point: bool,
    issued: [u64; OperationKind::COUNT],
}

impl QueryGenerator {
    pub fn new(
        config: &Config,
        schemas: Vec<Arc<DeviceSchema>>,
        start_timestamp: i64,
        seed: u64,
    ) -> Self {
        Self {
            schemas,
            rng: StdRng::seed_from_u64(seed),
            start_timestamp,
            point_step: config.scaled_point_step(),
            step_size: config.step_size,
            interval: config.scaled_query_interval(),
            group_by_unit: config.scaled_group_by_unit(),
            device_num: config.query_device_num,
            sensor_num: config.query_sensor_num,
            aggregate: config.query_aggregate_fun.clone(),
            lower_value: config.query_lower_value,
            empty_precise_point: config.empty_precise_point_query,
            issued: [0; OperationKind::COUNT],
        }
    }

    fn window_start(&mut self, kind: OperationKind) -> i64 {
        let issued = &mut self.issued[kind.index()];
        let offset = *issued as i64 * self.step_size * self.point_step;
        *issued += 1;
        self.start_timestamp + offset
    }

    fn selection(&mut self) -> Selection {
        let devices: Vec<_> = self
            .schemas
            .choose_multiple(&mut self.rng, self.device_num)
            .cloned()
            .collect();
        let sensor_count = devices
            .iter()
            .map(|d| d.sensor_count())
            .min()
            .unwrap_or(0);
        let mut sensors = index::sample(&mut self.rng, sensor_count, self.sensor_num.min(sensor_count)).into_vec();
        sensors.sort_unstable();
        Selection { devices, sensors }
    }

    fn range(&mut self, kind: OperationKind) -> RangeQuery {
        let start = self.window_start(kind);
        RangeQuery {
            selection: self.selection(),
            start,
            end: start + self.interval,
        }
    }

    /// Parameters for the next query of `kind`; `None` for ingestion.
    pub fn next(&mut self, kind: OperationKind) -> Option<Query> {
        let query = match kind {
            OperationKind::Ingestion => return None,
            OperationKind::PrecisePoint => {
                let mut timestamp = self.window_start(kind);
                if self.empty_precise_point {
                    timestamp += self.point_step / 2;
                }
                Query::PrecisePoint(PreciseQuery {
                    selection: self.selection(),
                    timestamp,
                })
            }
            OperationKind::TimeRange => Query::TimeRange(self.range(kind)),
            OperationKind::TimeRangeValueFilter => Query::TimeRangeValueFilter(ValueRangeQuery {
                range: self.range(kind),
                min_value: self.lower_value,
            }),
            OperationKind::AggTime => Query::AggTime(AggRangeQuery {
                range: self.range(kind),
                aggregate: self.aggregate.clone(),
            }),
            OperationKind::AggValue => Query::AggValue(AggValueQuery {
                selection: self.selection(),
                aggregate: self.aggregate.clone(),
                min_value: self.lower_value,
            }),
            OperationKind::AggTimeValue => Query::AggTimeValue(AggRangeValueQuery {
                range: self.range(kind),
                aggregate: self.aggregate.clone(),
                min_value: self.lower_value,
            }),
            OperationKind::GroupBy => Query::GroupBy(GroupByQuery {
                range: self.range(kind),
                aggregate: self.aggregate.clone(),
                granularity: self.group_by_unit,
            }),
            OperationKind::LastPoint => Query::LastPoint(LatestPointQuery {
                selection: self.selection(),
            }),
            OperationKind::TimeRangeDesc => Query::TimeRangeDesc(self.range(kind)),
            OperationKind::TimeRangeValueDesc => Query::TimeRangeValueDesc(ValueRangeQuery {
                range: self.range(kind),
                min_value: self.lower_value,
            }),
        };
        Some(query)
    }
}
