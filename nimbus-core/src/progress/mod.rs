// SPDX-License-Identifier: LGPL-3.0-only
//! Per-subscriber shaping of progress updates.
//!
//! Every subscriber of the monitor runs its statuses through a
//! [`MonotonicGate`] (so progress never goes backwards within one fetch
//! attempt) and a [`ProgressThrottle`] (so a chatty backend cannot flood the UI).

mod gate;
mod throttle;

pub use gate::MonotonicGate;
pub use throttle::{ProgressThrottle, ThrottleDecision};
