// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry facade.
//!
//! Per the "global logger/metrics singletons" design note: the engine
//! takes a `Telemetry` implementation in its constructor rather than
//! reaching for a process-wide mutable global. `aeterna-daemon` supplies
//! a `prometheus-client`-backed implementation exposed over `/metrics`;
//! tests use `RecordingTelemetry`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Reload outcome label values, matching `restarts_total{reason=...}`
/// in `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestartReason {
    Success,
    Rollback,
    PreCheckFailed,
    Crash,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RestartReason::Success => "success",
            RestartReason::Rollback => "rollback",
            RestartReason::PreCheckFailed => "pre_check_failed",
            RestartReason::Crash => "crash",
        };
        f.write_str(s)
    }
}

/// Metrics/logging sink the orchestration engine is driven through.
pub trait Telemetry: Send + Sync + 'static {
    /// Record one handover duration observation (reload event to
    /// successful `DRAINING`), in seconds.
    fn record_handover(&self, duration: Duration);

    /// Increment `restarts_total{reason}` by one.
    fn record_restart(&self, reason: RestartReason);
}

/// No-op telemetry, useful for engine tests that do not assert on metrics.
#[derive(Debug, Clone, Default)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn record_handover(&self, _duration: Duration) {}
    fn record_restart(&self, _reason: RestartReason) {}
}

/// Recording telemetry for tests: remembers every observation so
/// assertions can inspect them.
#[derive(Clone, Default)]
pub struct RecordingTelemetry {
    inner: Arc<Mutex<RecordingTelemetryInner>>,
}

#[derive(Default)]
struct RecordingTelemetryInner {
    handovers: Vec<Duration>,
    restarts: Vec<RestartReason>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handovers(&self) -> Vec<Duration> {
        self.inner.lock().handovers.clone()
    }

    pub fn restarts(&self) -> Vec<RestartReason> {
        self.inner.lock().restarts.clone()
    }

    pub fn restart_count(&self, reason: RestartReason) -> usize {
        self.inner.lock().restarts.iter().filter(|r| **r == reason).count()
    }
}

impl Telemetry for RecordingTelemetry {
    fn record_handover(&self, duration: Duration) {
        self.inner.lock().handovers.push(duration);
    }

    fn record_restart(&self, reason: RestartReason) {
        self.inner.lock().restarts.push(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_telemetry_counts_by_reason() {
        let telemetry = RecordingTelemetry::new();
        telemetry.record_restart(RestartReason::Success);
        telemetry.record_restart(RestartReason::Rollback);
        telemetry.record_restart(RestartReason::Success);
        assert_eq!(telemetry.restart_count(RestartReason::Success), 2);
        assert_eq!(telemetry.restart_count(RestartReason::Rollback), 1);
        assert_eq!(telemetry.restart_count(RestartReason::Crash), 0);
    }

    #[test]
    fn recording_telemetry_keeps_handover_observations() {
        let telemetry = RecordingTelemetry::new();
        telemetry.record_handover(Duration::from_millis(250));
        assert_eq!(telemetry.handovers(), vec![Duration::from_millis(250)]);
    }
}
