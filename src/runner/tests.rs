use super::{run_benchmark, run_with};
use crate::config::{Config, InsertMode, OutOfOrderMode};
use crate::error::BenchError;
use crate::generator::Value;
use crate::schema::{self, DeviceSchema};
use crate::target::{BackendFactory, MemoryStore, MemoryTarget, Status, TargetSystem};
use crate::workload::query::{
    AggRangeQuery, AggRangeValueQuery, AggValueQuery, GroupByQuery, LatestPointQuery,
    PreciseQuery, RangeQuery, ValueRangeQuery,
};
use crate::workload::{Batch, BatchSegment, OperationKind, Record};
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn config() -> Config {
    Config {
        log_print_interval_secs: 0,
        csv_output: false,
        ..Config::default()
    }
}

/// Wraps a memory target with injectable faults and a log of delivered batches.
struct ScriptedTarget {
    inner: MemoryTarget,
    fail_open: bool,
    panic_open: bool,
    fail_every: Option<u64>,
    insert_delay: Option<Duration>,
    inserts: u64,
    deliveries: Arc<Mutex<Vec<Vec<i64>>>>,
}

impl ScriptedTarget {
    fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            inner: MemoryTarget::new(store),
            fail_open: false,
            panic_open: false,
            fail_every: None,
            insert_delay: None,
            inserts: 0,
            deliveries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn scripted_insert(&mut self, batch: &Batch) -> Status {
        self.inserts += 1;
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_every.is_some_and(|n| self.inserts % n == 0) {
            return Status::failed(BenchError::Operation("injected failure".to_string()));
        }
        if let Ok(mut log) = self.deliveries.lock() {
            log.extend(
                batch
                    .segments
                    .iter()
                    .map(|s| s.records.iter().map(|r| r.timestamp).collect()),
            );
        }
        self.inner.insert_by_records(batch).await
    }
}

impl TargetSystem for ScriptedTarget {
    async fn open(&mut self) -> Result<(), BenchError> {
        if self.panic_open {
            panic!("driver crashed while connecting");
        }
        if self.fail_open {
            return Err(BenchError::Connection("refused".to_string()));
        }
        self.inner.open().await
    }

    async fn close(&mut self) -> Result<(), BenchError> {
        self.inner.close().await
    }

    async fn register_schema(&mut self, devices: &[Arc<DeviceSchema>]) -> Result<(), BenchError> {
        self.inner.register_schema(devices).await
    }

    async fn cleanup(&mut self, devices: &[Arc<DeviceSchema>]) -> Result<(), BenchError> {
        self.inner.cleanup(devices).await
    }

    async fn insert_by_record(&mut self, batch: &Batch) -> Status {
        self.scripted_insert(batch).await
    }

    async fn insert_by_records(&mut self, batch: &Batch) -> Status {
        self.scripted_insert(batch).await
    }

    async fn insert_by_columnar_batch(&mut self, batch: &Batch) -> Status {
        self.scripted_insert(batch).await
    }

    async fn precise_point(&mut self, query: &PreciseQuery) -> Status {
        self.inner.precise_point(query).await
    }

    async fn time_range(&mut self, query: &RangeQuery) -> Status {
        self.inner.time_range(query).await
    }

    async fn time_range_value_filter(&mut self, query: &ValueRangeQuery) -> Status {
        self.inner.time_range_value_filter(query).await
    }

    async fn agg_time(&mut self, query: &AggRangeQuery) -> Status {
        self.inner.agg_time(query).await
    }

    async fn agg_value(&mut self, query: &AggValueQuery) -> Status {
        self.inner.agg_value(query).await
    }

    async fn agg_time_value(&mut self, query: &AggRangeValueQuery) -> Status {
        self.inner.agg_time_value(query).await
    }

    async fn group_by(&mut self, query: &GroupByQuery) -> Status {
        self.inner.group_by(query).await
    }

    async fn last_point(&mut self, query: &LatestPointQuery) -> Status {
        self.inner.last_point(query).await
    }

    async fn time_range_desc(&mut self, query: &RangeQuery) -> Status {
        self.inner.time_range_desc(query).await
    }

    async fn time_range_value_desc(&mut self, query: &ValueRangeQuery) -> Status {
        self.inner.time_range_value_desc(query).await
    }
}

fn assert_gapless(timestamps: &[i64], start: i64, step: i64, expected: usize) {
    assert_eq!(timestamps.len(), expected);
    for (i, ts) in timestamps.iter().enumerate() {
        assert_eq!(*ts, start + i as i64 * step);
    }
}

#[tokio::test]
async fn pure_ingestion_counts_batches_and_points() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 2,
        device_number: 2,
        loop_count: 100,
        batch_size_per_write: 10,
        ..config()
    });
    let factory = BackendFactory::from_name("memory")?;
    let summary = run_with(config.clone(), |_| factory.connect(), None).await?;

    let ingestion = summary.report.kind(OperationKind::Ingestion);
    assert_eq!(ingestion.ok_operations, 20);
    assert_eq!(ingestion.fail_operations, 0);
    assert_eq!(ingestion.ok_points, 200 * 5);
    assert_eq!(summary.report.executed().count(), 1);

    let store = factory.memory_store().expect("memory backend");
    assert_eq!(store.point_count(), 1_000);
    let start = config.start_timestamp()?;
    for device in 0..2 {
        assert_gapless(&store.timestamps(device), start, 7_000, 100);
    }
    Ok(())
}

#[tokio::test]
async fn half_insert_rate_sends_about_half_the_points() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 2,
        device_number: 2,
        loop_count: 1_000,
        batch_size_per_write: 10,
        real_insert_rate: 0.5,
        ..config()
    });
    let summary = run_benchmark(config).await?;
    let ingestion = summary.report.kind(OperationKind::Ingestion);
    let share = ingestion.ok_points as f64 / (2_000.0 * 5.0);
    assert!((0.45..=0.55).contains(&share), "share {share}");
    Ok(())
}

#[tokio::test]
async fn mixed_workload_runs_every_kind() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 3,
        device_number: 3,
        loop_count: 330,
        batch_size_per_write: 5,
        operation_proportion: "1:1:1:1:1:1:1:1:1:1:1".to_string(),
        query_device_num: 2,
        query_sensor_num: 2,
        ..config()
    });
    let summary = run_benchmark(config).await?;
    let report = &summary.report;

    // 30 record steps per client grouped in batches of 5.
    let ingestion = report.kind(OperationKind::Ingestion);
    assert_eq!(ingestion.ok_operations + ingestion.fail_operations, 18);
    for kind in OperationKind::ALL.iter().filter(|k| k.is_query()) {
        let row = report.kind(*kind);
        assert_eq!(row.ok_operations + row.fail_operations, 90, "{kind}");
        assert_eq!(row.fail_operations, 0, "{kind}");
    }
    Ok(())
}

#[tokio::test]
async fn mean_latency_stays_within_digest_extremes() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 4,
        device_number: 4,
        loop_count: 220,
        batch_size_per_write: 4,
        operation_proportion: "4:1:1:1:1:1:1:1:1:1:1".to_string(),
        ..config()
    });
    let summary = run_benchmark(config).await?;
    for kind in summary.report.executed() {
        assert!(
            kind.min_ms() <= kind.avg_latency_ms && kind.avg_latency_ms <= kind.max_ms(),
            "{}: min {} avg {} max {}",
            kind.kind,
            kind.min_ms(),
            kind.avg_latency_ms,
            kind.max_ms()
        );
        assert!(kind.quantiles_ms.windows(2).all(|w| w[0] <= w[1]));
    }
    Ok(())
}

#[tokio::test]
async fn injected_failures_do_not_stop_the_schedule() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 1,
        device_number: 1,
        loop_count: 90,
        batch_size_per_write: 10,
        ..config()
    });
    let store = MemoryStore::new();
    let summary = run_with(
        config,
        |_| ScriptedTarget {
            fail_every: Some(3),
            ..ScriptedTarget::new(store.clone())
        },
        None,
    )
    .await?;

    let ingestion = summary.report.kind(OperationKind::Ingestion);
    assert_eq!(ingestion.ok_operations, 6);
    assert_eq!(ingestion.fail_operations, 3);
    assert_eq!(ingestion.fail_points, 3 * 10 * 5);
    assert_eq!(store.point_count(), ingestion.ok_points);
    Ok(())
}

#[tokio::test]
async fn slow_writes_time_out_as_failures() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 1,
        device_number: 1,
        loop_count: 20,
        batch_size_per_write: 10,
        write_operation_timeout_ms: 20,
        ..config()
    });
    let store = MemoryStore::new();
    let summary = run_with(
        config,
        |_| ScriptedTarget {
            insert_delay: Some(Duration::from_millis(250)),
            ..ScriptedTarget::new(store.clone())
        },
        None,
    )
    .await?;

    let ingestion = summary.report.kind(OperationKind::Ingestion);
    assert_eq!(ingestion.ok_operations, 0);
    assert_eq!(ingestion.fail_operations, 2);
    assert_eq!(store.point_count(), 0);
    Ok(())
}

#[tokio::test]
async fn refused_connection_fails_only_that_client() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 2,
        device_number: 2,
        loop_count: 50,
        batch_size_per_write: 10,
        ..config()
    });
    let store = MemoryStore::new();
    let summary = run_with(
        config,
        |client| ScriptedTarget {
            fail_open: client == 1,
            ..ScriptedTarget::new(store.clone())
        },
        None,
    )
    .await?;

    assert_eq!(summary.report.failed_clients, 1);
    assert_eq!(summary.report.clients, 2);
    let ingestion = summary.report.kind(OperationKind::Ingestion);
    assert_eq!(ingestion.ok_operations, 5);
    assert_eq!(store.timestamps(1).len(), 0);
    Ok(())
}

#[tokio::test]
async fn panicking_connection_does_not_stall_other_clients() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 2,
        device_number: 2,
        loop_count: 50,
        batch_size_per_write: 10,
        ..config()
    });
    let store = MemoryStore::new();
    let run = run_with(
        config,
        |client| ScriptedTarget {
            panic_open: client == 0,
            ..ScriptedTarget::new(store.clone())
        },
        None,
    );
    let summary = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("schema barrier released")?;

    assert_eq!(summary.report.failed_clients, 1);
    assert_eq!(summary.report.kind(OperationKind::Ingestion).ok_operations, 5);
    assert!(store.timestamps(0).is_empty());
    assert_eq!(store.timestamps(1).len(), 50);
    Ok(())
}

/// Writes one off-grid row to device 0 before the benchmark starts.
async fn seed_stale_row(store: &Arc<MemoryStore>, config: &Config) -> Result<i64> {
    let data_types = schema::assign_data_types(config)?;
    let devices = schema::build_schemas(config, &data_types);
    let stale = config.start_timestamp()? - 1_000;
    let mut target = MemoryTarget::new(store.clone());
    target.open().await?;
    target.register_schema(&devices).await?;
    let batch = Batch {
        segments: vec![BatchSegment {
            device: devices[0].clone(),
            first_position: 0,
            records: vec![Record {
                timestamp: stale,
                position: 0,
                values: vec![Value::Double(0.5); config.sensor_number],
            }],
        }],
    };
    let status = target.insert_by_records(&batch).await;
    assert!(status.ok, "{:?}", status.error);
    target.close().await?;
    Ok(stale)
}

#[tokio::test]
async fn delete_data_clears_stale_rows_before_writing() -> Result<()> {
    let base = Config {
        client_number: 1,
        device_number: 1,
        loop_count: 100,
        batch_size_per_write: 10,
        insert_datatype_proportion: "0:0:0:0:1:0".to_string(),
        init_wait_time_ms: 10,
        ..config()
    };

    let kept = MemoryStore::new();
    let stale = seed_stale_row(&kept, &base).await?;
    run_with(Arc::new(base.clone()), |_| MemoryTarget::new(kept.clone()), None).await?;
    let timestamps = kept.timestamps(0);
    assert_eq!(timestamps.len(), 101);
    assert_eq!(timestamps[0], stale);

    let cleared = MemoryStore::new();
    seed_stale_row(&cleared, &base).await?;
    let config = Arc::new(Config {
        is_delete_data: true,
        ..base
    });
    let summary = run_with(config.clone(), |_| MemoryTarget::new(cleared.clone()), None).await?;
    assert_eq!(summary.report.failed_clients, 0);
    assert_gapless(&cleared.timestamps(0), config.start_timestamp()?, 7_000, 100);
    Ok(())
}

#[tokio::test]
async fn reversed_batches_keep_the_timestamp_grid() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 1,
        device_number: 1,
        loop_count: 60,
        batch_size_per_write: 6,
        out_of_order: true,
        out_of_order_mode: OutOfOrderMode::Batch,
        out_of_order_ratio: 1.0,
        ..config()
    });
    let store = MemoryStore::new();
    let target = ScriptedTarget::new(store.clone());
    let deliveries = target.deliveries.clone();
    let mut target = Some(target);
    let summary = run_with(
        config.clone(),
        |_| target.take().expect("single client"),
        None,
    )
    .await?;

    assert_eq!(summary.report.kind(OperationKind::Ingestion).ok_operations, 10);
    let log = deliveries.lock().expect("delivery log");
    assert_eq!(log.len(), 10);
    for batch in log.iter() {
        assert!(batch.windows(2).all(|w| w[0] > w[1]), "{batch:?}");
    }
    assert_gapless(&store.timestamps(0), config.start_timestamp()?, 7_000, 60);
    Ok(())
}

#[tokio::test]
async fn poisson_jitter_writes_every_grid_point_once() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 2,
        device_number: 2,
        loop_count: 200,
        batch_size_per_write: 20,
        out_of_order: true,
        out_of_order_mode: OutOfOrderMode::Poisson,
        lambda: 3.0,
        max_k: 10,
        insert_mode: InsertMode::Record,
        ..config()
    });
    let factory = BackendFactory::from_name("memory")?;
    run_with(config.clone(), |_| factory.connect(), None).await?;
    let store = factory.memory_store().expect("memory backend");
    let start = config.start_timestamp()?;
    for device in 0..2 {
        assert_gapless(&store.timestamps(device), start, 7_000, 200);
    }
    Ok(())
}

#[tokio::test]
async fn unbound_clients_share_devices_without_collisions() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 4,
        device_number: 2,
        client_bind: false,
        loop_count: 30,
        batch_size_per_write: 10,
        ..config()
    });
    let factory = BackendFactory::from_name("memory")?;
    let summary = run_with(config.clone(), |_| factory.connect(), None).await?;
    assert_eq!(summary.report.kind(OperationKind::Ingestion).ok_points, 4 * 30 * 5);

    let store = factory.memory_store().expect("memory backend");
    let start = config.start_timestamp()?;
    for device in 0..2 {
        let unique: BTreeSet<i64> = store.timestamps(device).into_iter().collect();
        assert_eq!(unique.len(), 60);
        assert_gapless(&unique.into_iter().collect::<Vec<_>>(), start, 7_000, 60);
    }
    Ok(())
}

#[tokio::test]
async fn dual_write_mirrors_accepted_batches() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 2,
        device_number: 2,
        loop_count: 100,
        batch_size_per_write: 10,
        double_insert: true,
        ..config()
    });
    let primary = BackendFactory::from_name("memory")?;
    let secondary = BackendFactory::from_name("memory")?;
    let summary = run_with(config, |_| primary.connect(), Some(secondary.connect())).await?;

    let replication = summary.replication.expect("replication snapshot");
    assert_eq!(replication.forwarded, 20);
    assert_eq!(replication.dropped, 0);
    let primary_points = primary.memory_store().expect("memory").point_count();
    let secondary_points = secondary.memory_store().expect("memory").point_count();
    assert_eq!(primary_points, secondary_points);
    assert_eq!(summary.report.kind(OperationKind::Ingestion).ok_points, primary_points);
    Ok(())
}

#[tokio::test]
async fn op_interval_paces_each_operation() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 1,
        device_number: 1,
        loop_count: 5,
        operation_proportion: "0:0:1:0:0:0:0:0:0:0:0".to_string(),
        op_interval_ms: 30,
        ..config()
    });
    let started = Instant::now();
    let summary = run_benchmark(config).await?;
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(summary.report.kind(OperationKind::TimeRange).ok_operations, 5);
    Ok(())
}

#[tokio::test]
async fn configuration_errors_abort_before_running() {
    let unknown_backend = Arc::new(Config {
        backend: "nosuchdb".to_string(),
        ..config()
    });
    let err = run_benchmark(unknown_backend).await.unwrap_err();
    assert!(matches!(err, BenchError::Configuration(_)));

    let no_functions = Arc::new(Config {
        line_ratio: 0.0,
        sin_ratio: 0.0,
        square_ratio: 0.0,
        random_ratio: 0.0,
        constant_ratio: 0.0,
        ..config()
    });
    assert!(matches!(
        run_benchmark(no_functions).await,
        Err(BenchError::Configuration(_))
    ));
}

#[tokio::test]
async fn multi_device_batches_cover_every_device() -> Result<()> {
    let config = Arc::new(Config {
        client_number: 2,
        device_number: 4,
        mul_dev_batch: true,
        loop_count: 100,
        batch_size_per_write: 10,
        insert_mode: InsertMode::Columnar,
        ..config()
    });
    let factory = BackendFactory::from_name("memory")?;
    let summary = run_with(config.clone(), |_| factory.connect(), None).await?;
    let ingestion = summary.report.kind(OperationKind::Ingestion);
    assert_eq!(ingestion.ok_operations, 20);
    assert_eq!(ingestion.ok_points, 200 * 5);

    let store = factory.memory_store().expect("memory backend");
    let start = config.start_timestamp()?;
    for device in 0..4 {
        assert_gapless(&store.timestamps(device), start, 7_000, 50);
    }
    Ok(())
}
