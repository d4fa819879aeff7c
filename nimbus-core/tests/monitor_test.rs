//! Tests for the download progress multiplexer

use async_trait::async_trait;
use nimbus_core::source::{DownloadStatusSource, InMemorySource, StatusCallback, WatchHandle};
use nimbus_core::{DownloadMonitor, DownloadStatus, MonitorConfig, ResourceId, SourceError};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const STEP: Duration = Duration::from_secs(2);

fn monitor_over(source: &InMemorySource) -> DownloadMonitor {
    DownloadMonitor::new(
        Arc::new(source.clone()),
        MonitorConfig::default().with_throttle_interval(Duration::ZERO),
    )
}

fn remote_source() -> InMemorySource {
    let source = InMemorySource::with_default_status(DownloadStatus::NotFetched);
    source.set_auto_fetch(false);
    source
}

#[tokio::test]
async fn test_two_subscribers_share_one_watch() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://photos/cat.heic");

    let mut first = monitor.subscribe(id.clone()).await;
    let mut second = monitor.subscribe(id.clone()).await;

    assert_eq!(source.watch_calls(), 1);
    assert_eq!(source.active_watches(&id), 1);
    assert_eq!(monitor.subscriber_count(&id), 2);

    assert_eq!(first.next().await, Some(DownloadStatus::NotFetched));
    assert_eq!(second.next().await, Some(DownloadStatus::NotFetched));

    source.set_status(&id, DownloadStatus::fetching(0.5));
    assert_eq!(first.next().await, Some(DownloadStatus::Fetching(0.5)));
    assert_eq!(second.next().await, Some(DownloadStatus::Fetching(0.5)));

    first.cancel();
    assert!(monitor.is_tracking(&id));
    assert_eq!(monitor.subscriber_count(&id), 1);
    assert_eq!(source.active_watches(&id), 1);

    drop(second);
    assert!(!monitor.is_tracking(&id));
    assert_eq!(source.active_watches(&id), 0);
    assert!(monitor.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribes_start_exactly_one_watch() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://video.mov");

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let monitor = monitor.clone();
            let id = id.clone();
            tokio::spawn(async move { monitor.subscribe(id).await })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    assert_eq!(source.watch_calls(), 1);
    assert_eq!(monitor.subscriber_count(&id), 32);

    // Release from many threads at once.
    let releases: Vec<_> = handles
        .into_iter()
        .map(|handle| tokio::spawn(async move { drop(handle) }))
        .collect();
    for release in releases {
        release.await.unwrap();
    }

    assert!(!monitor.is_tracking(&id));
    assert_eq!(source.total_active_watches(), 0);
}

#[tokio::test]
async fn test_refcount_tracks_interleaved_subscribes() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://doc.pdf");

    let a = monitor.subscribe(id.clone()).await;
    let b = monitor.subscribe(id.clone()).await;
    drop(a);
    let c = monitor.subscribe(id.clone()).await;
    let d = monitor.subscribe(id.clone()).await;
    drop(b);
    assert_eq!(monitor.subscriber_count(&id), 2);

    drop(d);
    assert!(monitor.is_tracking(&id));
    c.cancel();
    c.cancel();
    assert!(!monitor.is_tracking(&id));
    drop(c);
    assert_eq!(source.watch_calls(), 1);
}

#[tokio::test]
async fn test_unsubscribe_unknown_id_is_noop() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let tracked = ResourceId::from_uri("cloud://a");
    let _handle = monitor.subscribe(tracked.clone()).await;

    monitor.unsubscribe(&ResourceId::from_uri("cloud://never-seen"));
    monitor.unsubscribe(&ResourceId::from_uri("cloud://never-seen"));

    assert_eq!(monitor.len(), 1);
    assert_eq!(monitor.subscriber_count(&tracked), 1);
}

#[tokio::test]
async fn test_raw_unsubscribe_releases_detached_handle() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://raw");

    let a = monitor.subscribe(id.clone()).await;
    let b = monitor.subscribe(id.clone()).await;

    let detached = a.detach();
    assert_eq!(monitor.subscriber_count(&id), 2);

    monitor.unsubscribe(&detached);
    assert!(monitor.is_tracking(&id));
    assert_eq!(monitor.subscriber_count(&id), 1);
    assert_eq!(source.active_watches(&id), 1);

    // Duplicate raw calls never take the reference held by a live handle.
    monitor.unsubscribe(&detached);
    assert_eq!(monitor.subscriber_count(&id), 1);

    drop(b);
    assert!(!monitor.is_tracking(&id));
    assert_eq!(source.active_watches(&id), 0);
}

#[tokio::test]
async fn test_unsubscribe_does_not_steal_a_live_handle_reference() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://shared");

    let a = monitor.subscribe(id.clone()).await;
    let _b = monitor.subscribe(id.clone()).await;

    monitor.unsubscribe(&id);
    drop(a);

    assert!(monitor.is_tracking(&id));
    assert_eq!(monitor.subscriber_count(&id), 1);
    assert_eq!(source.active_watches(&id), 1);
}

#[tokio::test]
async fn test_late_unsubscribe_after_failure_leaves_fresh_entry_alone() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://retry");

    let detached = monitor.subscribe(id.clone()).await.detach();
    let mut witness = monitor.subscribe(id.clone()).await;
    source.fail(&id, SourceError::Backend("disk full".into()));
    assert!(matches!(witness.wait_terminal().await, Some(DownloadStatus::Failed(_))));
    assert!(!monitor.is_tracking(&id));

    let _fresh = monitor.subscribe(id.clone()).await;
    monitor.unsubscribe(&detached);
    assert_eq!(monitor.subscriber_count(&id), 1);
}

#[tokio::test]
async fn test_no_delivery_after_teardown() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://late");

    let mut handle = monitor.subscribe(id.clone()).await;
    assert_eq!(handle.next().await, Some(DownloadStatus::NotFetched));

    handle.cancel();
    source.set_status(&id, DownloadStatus::fetching(0.7));
    source.set_status(&id, DownloadStatus::Fetched);

    assert_eq!(handle.next().await, None);
    assert!(!monitor.is_tracking(&id));
}

#[tokio::test]
async fn test_delivered_progress_is_monotonic_and_ends_terminal() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://big.zip");

    let mut handle = monitor.subscribe(id.clone()).await;
    let mut delivered = vec![handle.next().await.unwrap()];

    source.set_status(&id, DownloadStatus::fetching(0.2));
    delivered.push(handle.next().await.unwrap());
    source.set_status(&id, DownloadStatus::fetching(0.6));
    delivered.push(handle.next().await.unwrap());

    // Out-of-order report from the backend is swallowed.
    source.set_status(&id, DownloadStatus::fetching(0.4));
    assert!(tokio::time::timeout(Duration::from_millis(50), handle.next())
        .await
        .is_err());

    source.set_status(&id, DownloadStatus::fetching(0.9));
    delivered.push(handle.next().await.unwrap());
    source.set_status(&id, DownloadStatus::Fetched);
    delivered.push(handle.next().await.unwrap());
    assert_eq!(handle.next().await, None);

    assert_eq!(
        delivered,
        vec![
            DownloadStatus::NotFetched,
            DownloadStatus::Fetching(0.2),
            DownloadStatus::Fetching(0.6),
            DownloadStatus::Fetching(0.9),
            DownloadStatus::Fetched,
        ]
    );
}

#[tokio::test]
async fn test_late_subscriber_starts_at_current_value() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://movie.mkv");

    let _first = monitor.subscribe(id.clone()).await;
    source.set_status(&id, DownloadStatus::fetching(0.45));

    let mut late = monitor.subscribe(id.clone()).await;
    let first_seen = tokio::time::timeout(STEP, late.next()).await.unwrap();
    assert_eq!(first_seen, Some(DownloadStatus::Fetching(0.45)));
    assert_eq!(source.watch_calls(), 1);
}

#[tokio::test]
async fn test_local_resource_does_not_trigger_fetch() {
    let source = InMemorySource::new();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_path("/home/user/notes.txt");

    let mut handle = monitor.subscribe(id.clone()).await;
    assert_eq!(handle.next().await, Some(DownloadStatus::Local));
    assert_eq!(handle.next().await, None);
    assert_eq!(source.begin_fetch_calls(), 0);
}

#[tokio::test]
async fn test_not_fetched_resource_requests_fetch_once() {
    let source = InMemorySource::with_default_status(DownloadStatus::NotFetched);
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://song.flac");

    let mut a = monitor.subscribe(id.clone()).await;
    let _b = monitor.subscribe(id.clone()).await;

    assert_eq!(source.begin_fetch_calls(), 1);
    let mut seen = Vec::new();
    while seen.last() != Some(&DownloadStatus::Fetching(0.0)) {
        seen.push(tokio::time::timeout(STEP, a.next()).await.unwrap().unwrap());
    }
}

/// Holds every status query until a permit is released.
struct GatedSource {
    inner: InMemorySource,
    gate: Semaphore,
}

#[async_trait]
impl DownloadStatusSource for GatedSource {
    async fn current_status(&self, id: &ResourceId) -> Result<DownloadStatus, SourceError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| SourceError::Backend(e.to_string()))?;
        self.inner.current_status(id).await
    }

    async fn begin_fetch(&self, id: &ResourceId) -> Result<(), SourceError> {
        self.inner.begin_fetch(id).await
    }

    fn watch(
        &self,
        id: &ResourceId,
        on_update: StatusCallback,
    ) -> Result<Box<dyn WatchHandle>, SourceError> {
        self.inner.watch(id, on_update)
    }
}

#[tokio::test]
async fn test_no_fetch_when_subscribers_leave_during_status_query() {
    let inner = remote_source();
    let source = Arc::new(GatedSource {
        inner: inner.clone(),
        gate: Semaphore::new(0),
    });
    let monitor = DownloadMonitor::new(source.clone(), MonitorConfig::default());
    let id = ResourceId::from_uri("cloud://abandoned");

    let pending = tokio::spawn({
        let monitor = monitor.clone();
        let id = id.clone();
        async move { monitor.subscribe(id).await }
    });
    tokio::time::timeout(STEP, async {
        while inner.watch_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());
    assert!(!monitor.is_tracking(&id));
    assert_eq!(inner.active_watches(&id), 0);

    source.gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(inner.begin_fetch_calls(), 0);
}

#[tokio::test]
async fn test_watch_error_fails_subscribers_and_allows_restart() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://flaky");

    let mut a = monitor.subscribe(id.clone()).await;
    let mut b = monitor.subscribe(id.clone()).await;
    assert_eq!(a.next().await, Some(DownloadStatus::NotFetched));

    source.fail(&id, SourceError::Unavailable("connection reset".into()));

    let terminal = a.next().await;
    assert!(matches!(terminal, Some(DownloadStatus::Failed(_))));
    assert_eq!(a.next().await, None);
    assert!(matches!(b.wait_terminal().await, Some(DownloadStatus::Failed(_))));
    assert!(!monitor.is_tracking(&id));

    // Old handles releasing late must not disturb a fresh entry.
    let _fresh = monitor.subscribe(id.clone()).await;
    drop(a);
    drop(b);
    assert_eq!(source.watch_calls(), 2);
    assert_eq!(monitor.subscriber_count(&id), 1);
}

#[tokio::test]
async fn test_unavailable_backend_is_reported_as_failed() {
    let source = remote_source();
    source.set_available(false);
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://offline");

    let mut handle = monitor.subscribe(id.clone()).await;
    assert!(matches!(handle.next().await, Some(DownloadStatus::Failed(_))));
    assert!(!monitor.is_tracking(&id));
}

#[tokio::test]
async fn test_throttle_holds_intermediate_but_not_terminal() {
    let source = remote_source();
    let monitor = DownloadMonitor::new(
        Arc::new(source.clone()),
        MonitorConfig::default().with_throttle_interval(Duration::from_secs(30)),
    );
    let id = ResourceId::from_uri("cloud://slow");

    let mut handle = monitor.subscribe(id.clone()).await;
    assert_eq!(handle.next().await, Some(DownloadStatus::NotFetched));

    source.set_status(&id, DownloadStatus::fetching(0.3));
    assert!(tokio::time::timeout(Duration::from_millis(50), handle.next())
        .await
        .is_err());

    source.set_status(&id, DownloadStatus::Fetched);
    let next = tokio::time::timeout(STEP, handle.next()).await.unwrap();
    assert_eq!(next, Some(DownloadStatus::Fetched));
}

fn throttled_monitor(source: &InMemorySource, interval: Duration) -> DownloadMonitor {
    DownloadMonitor::new(
        Arc::new(source.clone()),
        MonitorConfig::default().with_throttle_interval(interval),
    )
}

#[tokio::test]
async fn test_held_value_is_delivered_when_window_opens() {
    let source = remote_source();
    let monitor = throttled_monitor(&source, Duration::from_millis(200));
    let id = ResourceId::from_uri("cloud://held");

    let mut handle = monitor.subscribe(id.clone()).await;
    assert_eq!(handle.next().await, Some(DownloadStatus::NotFetched));

    let started = tokio::time::Instant::now();
    source.set_status(&id, DownloadStatus::fetching(0.3));
    let next = tokio::time::timeout(STEP, handle.next()).await.unwrap();
    assert_eq!(next, Some(DownloadStatus::Fetching(0.3)));
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn test_newer_value_replaces_held_one() {
    let source = remote_source();
    let monitor = throttled_monitor(&source, Duration::from_millis(200));
    let id = ResourceId::from_uri("cloud://coalesce");

    let mut handle = monitor.subscribe(id.clone()).await;
    assert_eq!(handle.next().await, Some(DownloadStatus::NotFetched));

    source.set_status(&id, DownloadStatus::fetching(0.3));
    let (next, _) = tokio::join!(handle.next(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.set_status(&id, DownloadStatus::fetching(0.6));
    });
    assert_eq!(next, Some(DownloadStatus::Fetching(0.6)));

    // 0.3 was superseded, not queued.
    source.set_status(&id, DownloadStatus::Fetched);
    let next = tokio::time::timeout(STEP, handle.next()).await.unwrap();
    assert_eq!(next, Some(DownloadStatus::Fetched));
}

#[tokio::test]
async fn test_held_value_survives_dropped_next() {
    let source = remote_source();
    let monitor = throttled_monitor(&source, Duration::from_millis(200));
    let id = ResourceId::from_uri("cloud://timer");

    let mut handle = monitor.subscribe(id.clone()).await;
    assert_eq!(handle.next().await, Some(DownloadStatus::NotFetched));

    source.set_status(&id, DownloadStatus::fetching(0.5));
    assert!(tokio::time::timeout(Duration::from_millis(10), handle.next())
        .await
        .is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let next = tokio::time::timeout(Duration::from_millis(500), handle.next())
        .await
        .unwrap();
    assert_eq!(next, Some(DownloadStatus::Fetching(0.5)));
}

#[tokio::test]
async fn test_progress_stream_ends_after_fetched() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let id = ResourceId::from_uri("cloud://stream");

    let (cancel, mut stream) = monitor.subscribe_progress(id.clone()).await;
    assert_eq!(stream.next().await, Some(0.0));

    source.set_status(&id, DownloadStatus::fetching(0.5));
    assert_eq!(stream.next().await, Some(0.5));
    source.set_status(&id, DownloadStatus::Fetched);
    assert_eq!(stream.next().await, Some(1.0));
    assert_eq!(stream.next().await, None);

    // The exhausted stream dropped its handle, which released the subscription.
    assert!(cancel.is_cancelled());
    assert!(!monitor.is_tracking(&id));
}

#[tokio::test]
async fn test_dropping_monitor_cancels_watches() {
    let source = remote_source();
    let monitor = monitor_over(&source);
    let handle = monitor.subscribe(ResourceId::from_uri("cloud://x")).await;

    drop(handle);
    let _kept = monitor.subscribe(ResourceId::from_uri("cloud://y")).await;
    assert_eq!(source.total_active_watches(), 1);

    drop(monitor);
    assert_eq!(source.total_active_watches(), 0);
}
