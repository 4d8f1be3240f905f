use crate::config::InsertMode;
use crate::target::{dispatch_insert, TargetSystem};
use crate::workload::Batch;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct ReplicationStats {
    pub forwarded: AtomicU64,
    pub dropped: AtomicU64,
    pub failed: AtomicU64,
    pub points: AtomicU64,
}

impl ReplicationStats {
    pub fn snapshot(&self) -> ReplicationSnapshot {
        ReplicationSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            points: self.points.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplicationSnapshot {
    pub forwarded: u64,
    pub dropped: u64,
    pub failed: u64,
    pub points: u64,
}

/// Best-effort second write path. Clients hand over batches that the primary
/// accepted; a background task writes them to the secondary target. A full
/// queue drops the batch and nothing here feeds back into measurements.
#[derive(Clone, Debug)]
pub struct Replicator {
    tx: mpsc::Sender<Batch>,
    stats: Arc<ReplicationStats>,
}

impl Replicator {
    pub fn spawn<T>(
        target: T,
        queue: usize,
        mode: InsertMode,
        timeout: Duration,
    ) -> (Self, JoinHandle<ReplicationSnapshot>)
    where
        T: TargetSystem + 'static,
    {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let stats = Arc::new(ReplicationStats::default());
        let handle = tokio::spawn(run_replicator(target, rx, stats.clone(), mode, timeout));
        (Self { tx, stats }, handle)
    }

    pub fn offer(&self, batch: &Batch) {
        if let Err(err) = self.tx.try_send(batch.clone()) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error=%err, "replication queue full; dropping batch");
        }
    }

    pub fn stats(&self) -> Arc<ReplicationStats> {
        self.stats.clone()
    }
}

async fn run_replicator<T: TargetSystem>(
    mut target: T,
    mut rx: mpsc::Receiver<Batch>,
    stats: Arc<ReplicationStats>,
    mode: InsertMode,
    timeout: Duration,
) -> ReplicationSnapshot {
    let connected = match tokio::time::timeout(timeout, target.open()).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::error!(error=%err, "replication target failed to open; discarding replicated batches");
            false
        }
        Err(_) => {
            tracing::error!(?timeout, "replication target open timed out; discarding replicated batches");
            false
        }
    };

    while let Some(batch) = rx.recv().await {
        if !connected {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        match tokio::time::timeout(timeout, dispatch_insert(&mut target, mode, &batch)).await {
            Ok(status) if status.ok => {
                stats.forwarded.fetch_add(1, Ordering::Relaxed);
                stats.points.fetch_add(status.points, Ordering::Relaxed);
            }
            Ok(status) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                if let Some(err) = status.error {
                    tracing::warn!(error=%err, "replicated write failed");
                }
            }
            Err(_) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(?timeout, "replicated write timed out");
            }
        }
    }

    if connected {
        if let Err(err) = target.close().await {
            tracing::warn!(error=%err, "replication target close failed");
        }
    }
    let snapshot = stats.snapshot();
    tracing::info!(
        forwarded = snapshot.forwarded,
        dropped = snapshot.dropped,
        failed = snapshot.failed,
        points = snapshot.points,
        "replication drained"
    );
    snapshot
}
