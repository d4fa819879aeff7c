// SPDX-License-Identifier: LGPL-3.0-only
//! Background worker for the disk tier.
//!
//! Every mutation of the disk tier (writes, sweeps, clears) goes through one
//! queue drained by a single task, so usage bookkeeping never races with a
//! sweep and callers never wait on disk I/O to store a thumbnail.

use crate::thumbnail::bitmap::Bitmap;
use crate::thumbnail::disk_cache::{DiskCache, SweepReport};
use crate::thumbnail::error::ThumbnailError;
use crate::thumbnail::key::CacheKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

/// Work items for the disk worker.
enum DiskTask {
    Write {
        key: CacheKey,
        bitmap: Bitmap,
    },
    Sweep {
        force: bool,
        done: oneshot::Sender<Result<SweepReport, ThumbnailError>>,
    },
    Clear(oneshot::Sender<Result<(), ThumbnailError>>),
    Flush(oneshot::Sender<()>),
}

/// Queue in front of the disk tier.
pub struct ThumbnailExecutor {
    task_tx: mpsc::UnboundedSender<DiskTask>,
}

impl ThumbnailExecutor {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// The worker measures the tier right away and then sweeps every
    /// `sweep_interval`, plus whenever a write crosses the high watermark.
    pub fn new(disk: Arc<DiskCache>, sweep_interval: Duration) -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            Self::worker_task(disk, task_rx, sweep_interval).await;
        });

        Self { task_tx }
    }

    /// Queue `bitmap` to be written for `key`. Returns immediately.
    pub fn persist(&self, key: CacheKey, bitmap: Bitmap) {
        if self.task_tx.send(DiskTask::Write { key, bitmap }).is_err() {
            log::warn!("Disk worker stopped, thumbnail not persisted");
        }
    }

    /// Wait until every task queued before this call has been handled.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.task_tx.send(DiskTask::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Run a sweep now. With `force`, evict down to the low watermark even
    /// below the high watermark.
    pub async fn sweep(&self, force: bool) -> Result<SweepReport, ThumbnailError> {
        let (done, rx) = oneshot::channel();
        self.task_tx
            .send(DiskTask::Sweep { force, done })
            .map_err(|_| worker_gone())?;
        rx.await.map_err(|_| worker_gone())?
    }

    /// Remove every disk entry, after pending writes have landed.
    pub async fn clear(&self) -> Result<(), ThumbnailError> {
        let (done, rx) = oneshot::channel();
        self.task_tx.send(DiskTask::Clear(done)).map_err(|_| worker_gone())?;
        rx.await.map_err(|_| worker_gone())?
    }

    async fn worker_task(
        disk: Arc<DiskCache>,
        mut task_rx: mpsc::UnboundedReceiver<DiskTask>,
        sweep_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(sweep_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                task = task_rx.recv() => {
                    let Some(task) = task else { break };
                    Self::handle(&disk, task).await;
                }
                _ = ticker.tick() => {
                    if let Err(e) = disk.sweep(false).await {
                        log::warn!("Periodic disk sweep failed: {}", e);
                    }
                }
            }
        }
        log::debug!("Disk worker for {:?} stopped", disk.root());
    }

    async fn handle(disk: &DiskCache, task: DiskTask) {
        match task {
            DiskTask::Write { key, bitmap } => match disk.write(&key, bitmap).await {
                Ok(_) if disk.needs_sweep() => {
                    log::debug!("Disk usage {} crossed high watermark", disk.usage());
                    if let Err(e) = disk.sweep(false).await {
                        log::warn!("Disk sweep failed: {}", e);
                    }
                },
                Ok(_) => {},
                Err(e) => log::warn!("Failed to persist thumbnail for {}: {}", key.id, e),
            },
            DiskTask::Sweep { force, done } => {
                let _ = done.send(disk.sweep(force).await);
            },
            DiskTask::Clear(done) => {
                let _ = done.send(disk.clear().await);
            },
            DiskTask::Flush(done) => {
                let _ = done.send(());
            },
        }
    }
}

fn worker_gone() -> ThumbnailError {
    ThumbnailError::CacheIo(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "disk worker stopped",
    ))
}
