// SPDX-License-Identifier: LGPL-3.0-only
//! Subscriber-side view of a monitored resource.

use super::entry::StatusSlot;
use super::Shared;
use crate::progress::{MonotonicGate, ProgressThrottle, ThrottleDecision};
use crate::resource::ResourceId;
use crate::status::DownloadStatus;
use futures::stream::{BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

/// One reference on a registry entry. Released at most once.
struct Lease {
    shared: Weak<Shared>,
    id: ResourceId,
    generation: u64,
    released: AtomicBool,
    wake: Notify,
}

impl Lease {
    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.release(&self.id, self.generation);
        }
        self.wake.notify_waiters();
    }

    /// Hand the reference over to the registry's raw release path.
    fn detach(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.detach(&self.id, self.generation);
        }
        self.wake.notify_waiters();
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// Detached cancel token for a [`ProgressHandle`].
#[derive(Clone)]
pub struct ProgressCancel {
    lease: Arc<Lease>,
}

impl ProgressCancel {
    /// Release the subscription. Idempotent.
    pub fn cancel(&self) {
        self.lease.release();
    }

    /// Whether the subscription has been released.
    pub fn is_cancelled(&self) -> bool {
        self.lease.is_released()
    }
}

/// A subscription to the progress of one resource.
///
/// Yields statuses through [`next`](Self::next): the current status first,
/// then changes, rate limited and never regressing within a fetch attempt,
/// ending with exactly one terminal status. Dropping the handle unsubscribes.
pub struct ProgressHandle {
    lease: Arc<Lease>,
    rx: watch::Receiver<StatusSlot>,
    pending: Option<DownloadStatus>,
    gate: MonotonicGate,
    throttle: ProgressThrottle,
    finished: bool,
}

impl std::fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressHandle")
            .field("id", &self.lease.id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl ProgressHandle {
    pub(super) fn new(
        shared: Weak<Shared>,
        id: ResourceId,
        generation: u64,
        mut rx: watch::Receiver<StatusSlot>,
        throttle_interval: Duration,
    ) -> Self {
        let pending = rx.borrow_and_update().clone();
        Self {
            lease: Arc::new(Lease {
                shared,
                id,
                generation,
                released: AtomicBool::new(false),
                wake: Notify::new(),
            }),
            rx,
            pending,
            gate: MonotonicGate::new(),
            throttle: ProgressThrottle::new(throttle_interval),
            finished: false,
        }
    }

    /// The resource this handle follows.
    pub fn id(&self) -> &ResourceId {
        &self.lease.id
    }

    /// Wait for the next deliverable status.
    ///
    /// Returns `None` once a terminal status has been delivered, after the
    /// entry was torn down, or after the handle was cancelled.
    ///
    /// Cancel safe: a value held back by the throttle stays on the handle when
    /// the returned future is dropped and is delivered by a later call.
    pub async fn next(&mut self) -> Option<DownloadStatus> {
        loop {
            if self.finished || self.lease.is_released() {
                self.finished = true;
                return None;
            }

            if self.pending.is_none() {
                match wait_for_update(&mut self.rx, &self.lease).await {
                    Some(status) => self.pending = Some(status),
                    None => {
                        self.finished = true;
                        return None;
                    },
                }
            }
            let Some(candidate) = self.pending.as_ref() else {
                continue;
            };
            if !self.gate.admits(candidate) {
                self.pending = None;
                continue;
            }

            let now = Instant::now();
            let deadline = match self.throttle.check(candidate, now) {
                ThrottleDecision::Ready => match self.pending.take() {
                    Some(status) => return Some(self.emit(status, now)),
                    None => continue,
                },
                ThrottleDecision::Wait(deadline) => deadline,
            };

            // Hold the value until the window opens; a newer one replaces it.
            let newer = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => None,
                update = wait_for_update(&mut self.rx, &self.lease) => Some(update),
            };
            match newer {
                None => {},
                Some(Some(next)) => {
                    if self.gate.admits(&next) {
                        self.pending = Some(next);
                    }
                },
                Some(None) => {
                    self.finished = true;
                    return None;
                },
            }
        }
    }

    /// Drain the subscription and return its terminal status.
    pub async fn wait_terminal(&mut self) -> Option<DownloadStatus> {
        let mut last = None;
        while let Some(status) = self.next().await {
            last = Some(status);
        }
        last.filter(DownloadStatus::is_terminal)
    }

    /// Latest status held by the broadcaster, ignoring throttling.
    pub fn latest(&self) -> Option<DownloadStatus> {
        self.rx.borrow().clone()
    }

    /// Unsubscribe now. Idempotent; dropping the handle does the same.
    pub fn cancel(&self) {
        self.lease.release();
    }

    /// Give up the handle but keep the subscription alive.
    ///
    /// The reference is then owned by the caller and must be released with
    /// exactly one [`DownloadMonitor::unsubscribe`](super::DownloadMonitor::unsubscribe)
    /// for the returned id. If the entry was already torn down, there is
    /// nothing left to release and that call is a no-op.
    pub fn detach(self) -> ResourceId {
        self.lease.detach();
        self.lease.id.clone()
    }

    /// A token that can cancel this subscription from elsewhere.
    pub fn canceller(&self) -> ProgressCancel {
        ProgressCancel {
            lease: self.lease.clone(),
        }
    }

    /// Turn the handle into a stream of progress fractions.
    ///
    /// The stream ends after a terminal status; a failure ends it without
    /// yielding a value.
    pub fn into_progress_stream(self) -> BoxStream<'static, f64> {
        futures::stream::unfold(self, |mut handle| async move {
            let progress = handle.next().await?.progress()?;
            Some((progress, handle))
        })
        .boxed()
    }

    fn emit(&mut self, status: DownloadStatus, now: Instant) -> DownloadStatus {
        self.gate.record(&status);
        self.throttle.record(now);
        if status.is_terminal() {
            self.finished = true;
        }
        log::trace!("Delivering {} for {}", status, self.lease.id);
        status
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.lease.release();
    }
}

/// Wait for the broadcaster to publish a status.
///
/// `None` when the broadcaster is gone or the lease was released.
async fn wait_for_update(
    rx: &mut watch::Receiver<StatusSlot>,
    lease: &Lease,
) -> Option<DownloadStatus> {
    loop {
        let released = lease.wake.notified();
        tokio::pin!(released);
        released.as_mut().enable();
        if lease.is_released() {
            return None;
        }

        let changed = tokio::select! {
            result = rx.changed() => result.is_ok(),
            _ = &mut released => false,
        };
        if !changed {
            return None;
        }
        if let Some(status) = rx.borrow_and_update().clone() {
            return Some(status);
        }
    }
}
