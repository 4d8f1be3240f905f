use crate::config::{Config, InsertMode};
use crate::error::BenchError;
use crate::measurement::{DigestSet, Measurement};
use crate::replication::Replicator;
use crate::target::{dispatch_insert, dispatch_query, Status, TargetSystem};
use crate::workload::{
    BatchBuilder, OperationKind, OperationSequencer, OutOfOrderScheduler, QueryGenerator, Workload,
};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Init,
    Run,
    Done,
    Closed,
    /// Could not connect or register schema; never entered `Run`.
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Run => "RUN",
            Self::Done => "DONE",
            Self::Closed => "CLOSED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Completed schedule entries of one client, read by the progress logger.
#[derive(Debug)]
pub struct ClientProgress {
    pub client: usize,
    pub total: u64,
    pub completed: AtomicU64,
}

impl ClientProgress {
    pub fn new(client: usize, total: u64) -> Self {
        Self {
            client,
            total,
            completed: AtomicU64::new(0),
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed.load(Ordering::Relaxed) as f64 * 100.0 / self.total as f64
    }
}

/// State shared by every client of one run.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub digests: Arc<DigestSet>,
    pub schema_barrier: Arc<Barrier>,
    pub replicator: Option<Replicator>,
}

#[derive(Debug)]
pub struct WorkerOutcome {
    pub client: usize,
    pub state: WorkerState,
    pub measurement: Measurement,
    pub error: Option<BenchError>,
}

/// Drives one client's operation schedule against its own target connection.
pub struct ClientWorker<T> {
    id: usize,
    target: T,
    config: Arc<Config>,
    sequencer: OperationSequencer,
    batches: BatchBuilder,
    out_of_order: Option<OutOfOrderScheduler>,
    queries: QueryGenerator,
    context: RunContext,
    progress: Arc<ClientProgress>,
    measurement: Measurement,
    state: WorkerState,
}

impl<T: TargetSystem + 'static> ClientWorker<T> {
    pub fn new(
        id: usize,
        target: T,
        workload: &Workload,
        context: RunContext,
    ) -> Result<Self, BenchError> {
        let sequencer = workload.sequencer(id)?;
        let progress = Arc::new(ClientProgress::new(id, sequencer.remaining() as u64));
        Ok(Self {
            id,
            target,
            config: workload.config.clone(),
            sequencer,
            batches: workload.batch_builder(id)?,
            out_of_order: workload.out_of_order(id),
            queries: workload.query_generator(id),
            context,
            progress,
            measurement: Measurement::new(),
            state: WorkerState::Init,
        })
    }

    pub fn progress(&self) -> Arc<ClientProgress> {
        self.progress.clone()
    }

    fn transition(&mut self, next: WorkerState) {
        tracing::debug!(client = self.id, from = %self.state, to = %next, "client state change");
        self.state = next;
    }

    pub async fn run(mut self) -> WorkerOutcome {
        let init = match AssertUnwindSafe(self.initialize()).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(BenchError::Connection(
                "target panicked during initialization".to_string(),
            )),
        };
        // Every client arrives, even a failed or panicked one, so the others are not held back.
        self.context.schema_barrier.wait().await;

        if let Err(err) = init {
            tracing::error!(client = self.id, error = %err, "client failed to initialize");
            self.transition(WorkerState::Failed);
            return self.finish(Some(err));
        }

        self.transition(WorkerState::Run);
        let started = Instant::now();
        self.drive().await;
        self.measurement.elapsed = started.elapsed();
        self.transition(WorkerState::Done);

        if let Err(err) = self.target.close().await {
            tracing::warn!(client = self.id, error = %err, "client close failed");
        }
        self.transition(WorkerState::Closed);
        tracing::info!(
            client = self.id,
            operations = self.measurement.operations(),
            elapsed_ms = self.measurement.elapsed.as_millis() as u64,
            "client finished"
        );
        self.finish(None)
    }

    fn finish(self, error: Option<BenchError>) -> WorkerOutcome {
        WorkerOutcome {
            client: self.id,
            state: self.state,
            measurement: self.measurement,
            error,
        }
    }

    async fn initialize(&mut self) -> Result<(), BenchError> {
        let budget = self.config.write_timeout();
        match tokio::time::timeout(budget, self.target.open()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(BenchError::Connection(err.to_string())),
            Err(_) => {
                return Err(BenchError::Connection(format!(
                    "open timed out after {}ms",
                    budget.as_millis()
                )))
            }
        }

        let devices = self.batches.devices();
        if self.config.is_delete_data {
            let cleared = match tokio::time::timeout(budget, self.target.cleanup(&devices)).await {
                Ok(result) => result,
                Err(_) => Err(BenchError::Timeout(budget)),
            };
            if let Err(err) = cleared {
                self.close_quietly().await;
                return Err(err);
            }
            tracing::info!(client = self.id, devices = devices.len(), "cleared existing data");
            if let Some(wait) = self.config.init_wait() {
                tokio::time::sleep(wait).await;
            }
        }

        if self.config.create_schema {
            let started = Instant::now();
            let registered =
                match tokio::time::timeout(budget, self.target.register_schema(&devices)).await {
                    Ok(result) => result,
                    Err(_) => Err(BenchError::Timeout(budget)),
                };
            self.measurement.create_schema_time = started.elapsed();
            if let Err(err) = registered {
                self.close_quietly().await;
                return Err(err);
            }
            tracing::debug!(
                client = self.id,
                devices = devices.len(),
                micros = self.measurement.create_schema_time.as_micros() as u64,
                "registered schema"
            );
        }
        Ok(())
    }

    async fn close_quietly(&mut self) {
        if let Err(err) = self.target.close().await {
            tracing::warn!(client = self.id, error = %err, "client close failed");
        }
    }

    async fn drive(&mut self) {
        let batch_size = self.batches.batch_size();
        let mut pending = 0;
        while let Some(kind) = self.sequencer.next() {
            if kind == OperationKind::Ingestion {
                pending += 1;
                if pending == batch_size {
                    self.ingest(pending).await;
                    pending = 0;
                }
            } else {
                self.query(kind).await;
            }
            self.progress.completed.fetch_add(1, Ordering::Relaxed);
        }
        if pending > 0 {
            self.ingest(pending).await;
        }
    }

    async fn ingest(&mut self, records: usize) {
        let Some(mut batch) = self.batches.build(records) else {
            tracing::trace!(client = self.id, records, "every record sampled out; nothing sent");
            return;
        };
        if let Some(scheduler) = self.out_of_order.as_mut() {
            scheduler.apply(&mut batch);
        }

        let budget = self.config.write_timeout();
        let mode: InsertMode = self.config.insert_mode;
        let attempted = batch.point_count();
        let started = Instant::now();
        let status =
            match tokio::time::timeout(budget, dispatch_insert(&mut self.target, mode, &batch)).await {
                Ok(status) => status,
                Err(_) => Status::failed(BenchError::Timeout(budget)),
            };
        let latency = started.elapsed();

        if status.ok {
            if let Some(replicator) = &self.context.replicator {
                replicator.offer(&batch);
            }
        }
        self.observe(OperationKind::Ingestion, status, attempted, latency);
        pace(self.config.op_interval(), started).await;
    }

    async fn query(&mut self, kind: OperationKind) {
        let Some(query) = self.queries.next(kind) else {
            return;
        };
        let budget = self.config.read_timeout();
        let started = Instant::now();
        let status = match tokio::time::timeout(budget, dispatch_query(&mut self.target, &query)).await {
            Ok(status) => status,
            Err(_) => Status::failed(BenchError::Timeout(budget)),
        };
        let latency = started.elapsed();
        self.observe(kind, status, 0, latency);
        pace(self.config.op_interval(), started).await;
    }

    fn observe(&mut self, kind: OperationKind, status: Status, attempted: u64, latency: Duration) {
        if status.ok {
            let micros = latency.as_micros() as u64;
            self.measurement.record_ok(kind, status.points, micros);
            self.context.digests.record(kind, micros);
            return;
        }
        self.measurement.record_failure(kind, attempted);
        match status.error {
            Some(err) if err.is_timeout() => {
                tracing::warn!(client = self.id, %kind, error = %err, "operation timed out")
            }
            Some(err) => tracing::warn!(client = self.id, %kind, error = %err, "operation failed"),
            None => tracing::warn!(client = self.id, %kind, "operation failed without detail"),
        }
    }
}

/// Sleeps out the rest of `interval` measured from `started`.
async fn pace(interval: Option<Duration>, started: Instant) {
    if let Some(interval) = interval {
        let spent = started.elapsed();
        if spent < interval {
            tokio::time::sleep(interval - spent).await;
        }
    }
}
