//! Per-device results and the batch report.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};

use crate::error::FailureReason;

/// Outcome of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeviceStatus {
    Success,
    Failure(FailureReason),
}

impl DeviceStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DeviceStatus::Success)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            DeviceStatus::Success => None,
            DeviceStatus::Failure(reason) => Some(reason),
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Success => f.write_str("ok"),
            DeviceStatus::Failure(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Result produced exactly once per submitted target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceResult {
    host: String,
    status: DeviceStatus,
    #[serde(rename = "elapsed_ms", serialize_with = "duration_ms")]
    elapsed: Duration,
}

impl DeviceResult {
    pub fn new(host: impl Into<String>, status: DeviceStatus, elapsed: Duration) -> Self {
        Self {
            host: host.into(),
            status,
            elapsed,
        }
    }

    pub fn success(host: impl Into<String>, elapsed: Duration) -> Self {
        Self::new(host, DeviceStatus::Success, elapsed)
    }

    pub fn failure(host: impl Into<String>, reason: FailureReason, elapsed: Duration) -> Self {
        Self::new(host, DeviceStatus::Failure(reason), elapsed)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Aggregate counts of a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Finished {} devices in {:.2} second(s): {} succeeded, {} failed",
            self.total,
            self.elapsed.as_secs_f64(),
            self.succeeded,
            self.failed
        )
    }
}

/// Results of a batch, in completion order, with batch timing.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    started_at_ms: u128,
    finished_at_ms: u128,
    #[serde(rename = "elapsed_ms", serialize_with = "duration_ms")]
    elapsed: Duration,
    results: Vec<DeviceResult>,
}

impl BatchReport {
    /// Report of a batch that started at `started_at` and ran for `elapsed`.
    pub fn new(
        started_at: SystemTime,
        elapsed: Duration,
        results: Vec<DeviceResult>,
    ) -> Self {
        let started_at_ms = epoch_ms(started_at);
        Self {
            started_at_ms,
            finished_at_ms: started_at_ms + elapsed.as_millis(),
            elapsed,
            results,
        }
    }

    /// Report of a batch with no targets.
    pub fn empty() -> Self {
        Self::new(SystemTime::now(), Duration::ZERO, Vec::new())
    }

    /// Results in the order the devices completed.
    pub fn results(&self) -> &[DeviceResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Wall-clock time from dispatcher entry to the join barrier.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn started_at_ms(&self) -> u128 {
        self.started_at_ms
    }

    pub fn finished_at_ms(&self) -> u128 {
        self.finished_at_ms
    }

    pub fn result_for(&self, host: &str) -> Option<&DeviceResult> {
        self.results.iter().find(|result| result.host == host)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DeviceResult> {
        self.results.iter().filter(|result| !result.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(DeviceResult::is_success)
    }

    pub fn summary(&self) -> BatchSummary {
        let failed = self.failures().count();
        BatchSummary {
            total: self.results.len(),
            succeeded: self.results.len() - failed,
            failed,
            elapsed: self.elapsed,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Shared append-only sink that execution units record into.
///
/// Each unit appends exactly one entry; the mutex serializes appends so the vector ends up in
/// completion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReportCollector {
    results: Arc<Mutex<Vec<DeviceResult>>>,
}

impl ReportCollector {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Arc::new(Mutex::new(Vec::with_capacity(capacity))),
        }
    }

    pub(crate) fn record(&self, result: DeviceResult) {
        // A poisoned lock only means another unit panicked mid-push; the vector is still valid.
        let mut guard = self
            .results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.push(result);
    }

    pub(crate) fn contains(&self, host: &str) -> bool {
        let guard = self
            .results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.iter().any(|result| result.host == host)
    }

    /// Takes every recorded entry. Only called after the join barrier.
    pub(crate) fn drain(&self) -> Vec<DeviceResult> {
        let mut guard = self
            .results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *guard)
    }
}

fn epoch_ms(ts: SystemTime) -> u128 {
    ts.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn duration_ms<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u128(duration.as_millis())
}
