// SPDX-License-Identifier: LGPL-3.0-only
//! Poll-driven Download Status Source adapter.

use super::{DownloadStatusSource, StatusCallback, WatchHandle};
use crate::error::SourceError;
use crate::resource::ResourceId;
use crate::status::DownloadStatus;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A backend that can only be asked for status, never subscribed to.
#[async_trait]
pub trait StatusProbe: Send + Sync + 'static {
    /// Query the current status.
    async fn probe(&self, id: &ResourceId) -> Result<DownloadStatus, SourceError>;

    /// Ask the backend to start fetching. No-op if already fetching or fetched.
    async fn begin_fetch(&self, id: &ResourceId) -> Result<(), SourceError>;
}

/// Turns a [`StatusProbe`] into a watchable source by polling it.
///
/// Every watch runs its own tokio task that probes at `interval` and reports
/// only changes. An error ends the watch.
pub struct PollingSource<P> {
    probe: Arc<P>,
    interval: Duration,
}

impl<P: StatusProbe> PollingSource<P> {
    /// Create a polling source.
    pub fn new(probe: P, interval: Duration) -> Self {
        Self {
            probe: Arc::new(probe),
            interval,
        }
    }

    async fn poll_loop(
        probe: Arc<P>,
        id: ResourceId,
        interval: Duration,
        on_update: StatusCallback,
    ) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last: Option<DownloadStatus> = None;

        loop {
            ticker.tick().await;
            match probe.probe(&id).await {
                Ok(status) => {
                    let status = status.clamped();
                    if last.as_ref() != Some(&status) {
                        log::trace!("Polled {} -> {}", id, status);
                        last = Some(status.clone());
                        on_update(Ok(status));
                    }
                },
                Err(e) => {
                    log::warn!("Polling {} failed: {}", id, e);
                    on_update(Err(e));
                    return;
                },
            }
        }
    }
}

#[async_trait]
impl<P: StatusProbe> DownloadStatusSource for PollingSource<P> {
    async fn current_status(&self, id: &ResourceId) -> Result<DownloadStatus, SourceError> {
        self.probe.probe(id).await.map(DownloadStatus::clamped)
    }

    async fn begin_fetch(&self, id: &ResourceId) -> Result<(), SourceError> {
        self.probe.begin_fetch(id).await
    }

    fn watch(
        &self,
        id: &ResourceId,
        on_update: StatusCallback,
    ) -> Result<Box<dyn WatchHandle>, SourceError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SourceError::Unavailable("no async runtime to poll on".to_string()))?;

        let task = runtime.spawn(Self::poll_loop(
            self.probe.clone(),
            id.clone(),
            self.interval,
            on_update,
        ));
        Ok(Box::new(PollingWatch { task }))
    }
}

struct PollingWatch {
    task: JoinHandle<()>,
}

impl WatchHandle for PollingWatch {
    fn cancel(self: Box<Self>) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Reports Fetching(0.5) twice, then Fetched forever.
    struct ScriptedProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StatusProbe for ScriptedProbe {
        async fn probe(&self, _id: &ResourceId) -> Result<DownloadStatus, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(if n < 2 {
                DownloadStatus::fetching(0.5)
            } else {
                DownloadStatus::Fetched
            })
        }

        async fn begin_fetch(&self, _id: &ResourceId) -> Result<(), SourceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_polling_reports_changes_only() {
        let source = PollingSource::new(
            ScriptedProbe {
                calls: AtomicUsize::new(0),
            },
            Duration::from_millis(5),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = source
            .watch(
                &ResourceId::from_uri("poll://a"),
                Arc::new(move |update| sink.lock().unwrap().push(update)),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.cancel();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![Ok(DownloadStatus::Fetching(0.5)), Ok(DownloadStatus::Fetched)]
        );
    }
}
