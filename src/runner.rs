#[cfg(test)]
mod tests;

use crate::client::{ClientProgress, ClientWorker, RunContext, WorkerState};
use crate::config::Config;
use crate::error::BenchError;
use crate::measurement::{BenchReport, DigestSet, MeasurementAggregator};
use crate::replication::{ReplicationSnapshot, Replicator};
use crate::target::{Backend, BackendFactory, TargetSystem};
use crate::workload::Workload;
use futures::future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug)]
pub struct RunSummary {
    pub report: BenchReport,
    pub replication: Option<ReplicationSnapshot>,
    pub wall_time: Duration,
}

/// Runs the configured benchmark against the backend named in `config`.
pub async fn run_benchmark(config: Arc<Config>) -> Result<RunSummary, BenchError> {
    let factory = BackendFactory::from_name(&config.backend)?;
    let replica = if config.double_insert {
        Some(BackendFactory::from_name(&config.secondary_backend)?.connect())
    } else {
        None
    };
    run_with(config, |_| factory.connect(), replica).await
}

/// Runs the benchmark with one `connect(client)` target per client and an
/// optional secondary target for dual writes.
pub async fn run_with<T, F>(
    config: Arc<Config>,
    mut connect: F,
    replica: Option<Backend>,
) -> Result<RunSummary, BenchError>
where
    T: TargetSystem + 'static,
    F: FnMut(usize) -> T,
{
    let started = Instant::now();
    config.validate()?;
    let workload = Workload::prepare(config.clone())?;
    let digests = Arc::new(DigestSet::new(config.digest_significant_figures)?);

    let (replicator, replication_task) = match replica {
        Some(target) => {
            let (replicator, handle) = Replicator::spawn(
                target,
                config.replication_queue,
                config.insert_mode,
                config.write_timeout(),
            );
            (Some(replicator), Some(handle))
        }
        None => (None, None),
    };

    let context = RunContext {
        digests: digests.clone(),
        schema_barrier: Arc::new(Barrier::new(config.client_number)),
        replicator,
    };
    let mut workers = Vec::with_capacity(config.client_number);
    for client in 0..config.client_number {
        workers.push(ClientWorker::new(
            client,
            connect(client),
            &workload,
            context.clone(),
        )?);
    }
    // Clients now hold the only replicator handles; the queue closes when they finish.
    drop(context);

    let progress: Vec<Arc<ClientProgress>> = workers.iter().map(ClientWorker::progress).collect();
    let progress_handle = config
        .log_print_interval()
        .map(|interval| spawn_progress_logger(progress, interval));

    tracing::info!(
        clients = config.client_number,
        backend = %config.backend,
        loop_count = config.loop_count,
        "benchmark started"
    );
    let handles: Vec<_> = workers
        .into_iter()
        .map(|worker| tokio::spawn(worker.run()))
        .collect();
    // Completion barrier: aggregation waits for every client.
    let results = future::join_all(handles).await;
    if let Some(handle) = progress_handle {
        handle.abort();
    }

    let mut measurements = Vec::with_capacity(results.len());
    let mut failed_clients = 0;
    for result in results {
        match result {
            Ok(outcome) if outcome.state == WorkerState::Closed => {
                measurements.push(outcome.measurement)
            }
            Ok(outcome) => {
                failed_clients += 1;
                tracing::warn!(
                    client = outcome.client,
                    state = %outcome.state,
                    error = ?outcome.error,
                    "client excluded from results"
                );
            }
            Err(err) => {
                failed_clients += 1;
                tracing::error!(error = %err, "client task aborted");
            }
        }
    }

    let report = MeasurementAggregator::new(digests).aggregate(&measurements, failed_clients);

    let replication = match replication_task {
        Some(handle) => match handle.await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, "replication task aborted");
                None
            }
        },
        None => None,
    };

    let wall_time = started.elapsed();
    tracing::info!(
        wall_ms = wall_time.as_millis() as u64,
        failed_clients,
        "benchmark finished"
    );
    Ok(RunSummary {
        report,
        replication,
        wall_time,
    })
}

fn spawn_progress_logger(progress: Vec<Arc<ClientProgress>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for client in &progress {
                tracing::info!(
                    client = client.client,
                    percent = %format!("{:.2}", client.percent()),
                    "client progress"
                );
            }
        }
    })
}
