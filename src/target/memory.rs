use super::{Status, TargetSystem};
use crate::error::BenchError;
use crate::generator::Value;
use crate::schema::DeviceSchema;
use crate::workload::query::{
    AggRangeQuery, AggRangeValueQuery, AggValueQuery, GroupByQuery, LatestPointQuery,
    PreciseQuery, RangeQuery, Selection, ValueRangeQuery,
};
use crate::workload::{Batch, BatchSegment};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

const AGGREGATES: [&str; 7] = [
    "count",
    "sum",
    "avg",
    "max_value",
    "min_value",
    "first_value",
    "last_value",
];

#[derive(Debug, Default)]
struct DeviceSeries {
    sensors: usize,
    rows: BTreeMap<i64, Vec<Value>>,
}

/// In-process store shared by every client connection of one run.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: Mutex<HashMap<usize, DeviceSeries>>,
    write_calls: AtomicU64,
    registered: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<usize, DeviceSeries>>, BenchError> {
        self.devices
            .lock()
            .map_err(|_| BenchError::Operation("memory store lock poisoned".to_string()))
    }

    /// Total points currently stored.
    pub fn point_count(&self) -> u64 {
        self.lock()
            .map(|devices| {
                devices
                    .values()
                    .map(|s| (s.rows.len() * s.sensors) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Stored timestamps of one device, ascending.
    pub fn timestamps(&self, device_id: usize) -> Vec<i64> {
        self.lock()
            .ok()
            .and_then(|devices| devices.get(&device_id).map(|s| s.rows.keys().copied().collect()))
            .unwrap_or_default()
    }

    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }

    pub fn registered_devices(&self) -> u64 {
        self.registered.load(Ordering::Relaxed)
    }

    fn register(&self, devices: &[Arc<DeviceSchema>]) -> Result<(), BenchError> {
        let mut guard = self.lock()?;
        for device in devices {
            guard.entry(device.device_id).or_insert_with(|| DeviceSeries {
                sensors: device.sensor_count(),
                rows: BTreeMap::new(),
            });
            self.registered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn write_rows<'a>(
        &self,
        device: &DeviceSchema,
        rows: impl Iterator<Item = (i64, Vec<Value>)> + 'a,
    ) -> Result<u64, BenchError> {
        let mut guard = self.lock()?;
        let series = guard.entry(device.device_id).or_insert_with(|| DeviceSeries {
            sensors: device.sensor_count(),
            rows: BTreeMap::new(),
        });
        let mut points = 0;
        for (timestamp, values) in rows {
            check_row(device, &values)?;
            points += values.len() as u64;
            series.rows.insert(timestamp, values);
        }
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        Ok(points)
    }

    /// Drops stored rows of `devices`, keeping their registrations. Returns the points removed.
    fn clear(&self, devices: &[Arc<DeviceSchema>]) -> Result<u64, BenchError> {
        let mut guard = self.lock()?;
        let mut removed = 0;
        for device in devices {
            if let Some(series) = guard.get_mut(&device.device_id) {
                removed += (series.rows.len() * series.sensors) as u64;
                series.rows.clear();
            }
        }
        Ok(removed)
    }

    /// Visits `(series rows, sensor index)` for every selected device/sensor pair.
    fn scan<F>(&self, selection: &Selection, mut visit: F) -> Result<u64, BenchError>
    where
        F: FnMut(&BTreeMap<i64, Vec<Value>>, usize) -> u64,
    {
        let guard = self.lock()?;
        let mut total = 0;
        for device in &selection.devices {
            let Some(series) = guard.get(&device.device_id) else {
                continue;
            };
            for sensor in &selection.sensors {
                total += visit(&series.rows, *sensor);
            }
        }
        Ok(total)
    }
}

/// Rejects a row whose width or value types disagree with the device schema.
fn check_row(device: &DeviceSchema, values: &[Value]) -> Result<(), BenchError> {
    if values.len() != device.sensor_count() {
        return Err(BenchError::Operation(format!(
            "{} expects {} values, got {}",
            device.device_name(),
            device.sensor_count(),
            values.len()
        )));
    }
    let mismatch = values
        .iter()
        .zip(&device.data_types)
        .position(|(value, expected)| value.data_type() != *expected);
    if let Some(sensor) = mismatch {
        return Err(BenchError::Operation(format!(
            "{}.{} expects {}, got {}",
            device.device_name(),
            device.sensors[sensor],
            device.data_types[sensor],
            values[sensor].data_type()
        )));
    }
    Ok(())
}

/// Validates every record up front so a rejected batch leaves the store untouched.
fn check_batch(batch: &Batch) -> Result<(), BenchError> {
    for segment in &batch.segments {
        for record in &segment.records {
            check_row(&segment.device, &record.values)?;
        }
    }
    Ok(())
}

fn check_aggregate(name: &str) -> Result<(), BenchError> {
    if AGGREGATES.contains(&name.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(BenchError::Operation(format!("unsupported aggregate {name:?}")))
    }
}

fn above(values: &[Value], sensor: usize, min_value: f64) -> bool {
    values
        .get(sensor)
        .and_then(Value::as_f64)
        .is_some_and(|v| v > min_value)
}

fn window(range: &RangeQuery) -> RangeInclusive<i64> {
    range.start..=range.end
}

fn into_status(result: Result<u64, BenchError>) -> Status {
    match result {
        Ok(points) => Status::ok(points),
        Err(err) => Status::failed(err),
    }
}

/// One client connection to a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTarget {
    store: Arc<MemoryStore>,
    open: bool,
}

impl MemoryTarget {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store, open: false }
    }

    fn ensure_open(&self) -> Result<(), BenchError> {
        if self.open {
            Ok(())
        } else {
            Err(BenchError::Connection("memory target is not open".to_string()))
        }
    }

    fn write_segment(&self, segment: &BatchSegment) -> Result<u64, BenchError> {
        self.store.write_rows(
            &segment.device,
            segment.records.iter().map(|r| (r.timestamp, r.values.clone())),
        )
    }

    fn run(&self, op: impl FnOnce(&MemoryStore) -> Result<u64, BenchError>) -> Status {
        into_status(self.ensure_open().and_then(|()| op(&self.store)))
    }
}

impl TargetSystem for MemoryTarget {
    async fn open(&mut self) -> Result<(), BenchError> {
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BenchError> {
        self.open = false;
        Ok(())
    }

    async fn register_schema(&mut self, devices: &[Arc<DeviceSchema>]) -> Result<(), BenchError> {
        self.ensure_open()?;
        self.store.register(devices)
    }

    async fn cleanup(&mut self, devices: &[Arc<DeviceSchema>]) -> Result<(), BenchError> {
        self.ensure_open()?;
        let removed = self.store.clear(devices)?;
        tracing::debug!(devices = devices.len(), removed, "cleared memory store");
        Ok(())
    }

    async fn insert_by_record(&mut self, batch: &Batch) -> Status {
        self.run(|store| {
            check_batch(batch)?;
            let mut points = 0;
            for segment in &batch.segments {
                for record in &segment.records {
                    points += store.write_rows(
                        &segment.device,
                        std::iter::once((record.timestamp, record.values.clone())),
                    )?;
                }
            }
            Ok(points)
        })
    }

    async fn insert_by_records(&mut self, batch: &Batch) -> Status {
        self.run(|_| {
            check_batch(batch)?;
            batch
                .segments
                .iter()
                .map(|segment| self.write_segment(segment))
                .sum()
        })
    }

    async fn insert_by_columnar_batch(&mut self, batch: &Batch) -> Status {
        self.run(|store| {
            check_batch(batch)?;
            let mut points = 0;
            for segment in &batch.segments {
                let timestamps: Vec<i64> = segment.records.iter().map(|r| r.timestamp).collect();
                let columns: Vec<Vec<Value>> = (0..segment.device.sensor_count())
                    .map(|sensor| {
                        segment
                            .records
                            .iter()
                            .filter_map(|r| r.values.get(sensor).cloned())
                            .collect()
                    })
                    .collect();
                if columns.iter().any(|c| c.len() != timestamps.len()) {
                    return Err(BenchError::Operation(format!(
                        "ragged columnar batch for {}",
                        segment.device.device_name()
                    )));
                }
                let rows = timestamps.iter().enumerate().map(|(row, ts)| {
                    (*ts, columns.iter().map(|c| c[row].clone()).collect())
                });
                points += store.write_rows(&segment.device, rows)?;
            }
            Ok(points)
        })
    }

    async fn precise_point(&mut self, query: &PreciseQuery) -> Status {
        self.run(|store| {
            store.scan(&query.selection, |rows, _| {
                u64::from(rows.contains_key(&query.timestamp))
            })
        })
    }

    async fn time_range(&mut self, query: &RangeQuery) -> Status {
        self.run(|store| {
            store.scan(&query.selection, |rows, _| rows.range(window(query)).count() as u64)
        })
    }

    async fn time_range_value_filter(&mut self, query: &ValueRangeQuery) -> Status {
        self.run(|store| {
            store.scan(&query.range.selection, |rows, sensor| {
                rows.range(window(&query.range))
                    .filter(|(_, values)| above(values, sensor, query.min_value))
                    .count() as u64
            })
        })
    }

    async fn agg_time(&mut self, query: &AggRangeQuery) -> Status {
        self.run(|store| {
            check_aggregate(&query.aggregate)?;
            store.scan(&query.range.selection, |rows, _| {
                u64::from(rows.range(window(&query.range)).next().is_some())
            })
        })
    }

    async fn agg_value(&mut self, query: &AggValueQuery) -> Status {
        self.run(|store| {
            check_aggregate(&query.aggregate)?;
            store.scan(&query.selection, |rows, sensor| {
                u64::from(rows.values().any(|values| above(values, sensor, query.min_value)))
            })
        })
    }

    async fn agg_time_value(&mut self, query: &AggRangeValueQuery) -> Status {
        self.run(|store| {
            check_aggregate(&query.aggregate)?;
            store.scan(&query.range.selection, |rows, sensor| {
                u64::from(
                    rows.range(window(&query.range))
                        .any(|(_, values)| above(values, sensor, query.min_value)),
                )
            })
        })
    }

    async fn group_by(&mut self, query: &GroupByQuery) -> Status {
        self.run(|store| {
            check_aggregate(&query.aggregate)?;
            if query.granularity <= 0 {
                return Err(BenchError::Operation("group-by granularity must be positive".to_string()));
            }
            store.scan(&query.range.selection, |rows, _| {
                rows.range(window(&query.range))
                    .map(|(ts, _)| (ts - query.range.start) / query.granularity)
                    .collect::<BTreeSet<_>>()
                    .len() as u64
            })
        })
    }

    async fn last_point(&mut self, query: &LatestPointQuery) -> Status {
        self.run(|store| {
            store.scan(&query.selection, |rows, _| u64::from(rows.last_key_value().is_some()))
        })
    }

    async fn time_range_desc(&mut self, query: &RangeQuery) -> Status {
        self.run(|store| {
            store.scan(&query.selection, |rows, _| {
                rows.range(window(query)).rev().count() as u64
            })
        })
    }

    async fn time_range_value_desc(&mut self, query: &ValueRangeQuery) -> Status {
        self.run(|store| {
            store.scan(&query.range.selection, |rows, sensor| {
                rows.range(window(&query.range))
                    .rev()
                    .filter(|(_, values)| above(values, sensor, query.min_value))
                    .count() as u64
            })
        })
    }
}
