//! Bounded-concurrency batch dispatch.
//!
//! [`BoundedDispatcher`] submits targets in input order. Before each submission it takes one
//! permit from a [`Semaphore`] of capacity K, so at most K execution units exist at any time
//! and the submitting loop only ever waits for a free slot. Each unit runs the
//! [`SessionRunner`], records its [`DeviceResult`], then drops its permit. After the last
//! submission the dispatcher joins every unit before building the [`BatchReport`].

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use log::{debug, error, info};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::error::{DispatchError, FailureReason};
use crate::report::{BatchReport, DeviceResult, ReportCollector};
use crate::runner::{SessionConnector, SessionRunner};
use crate::target::DeviceTarget;

/// Runs a [`SessionRunner`] over a batch of targets with at most `capacity` in flight.
pub struct BoundedDispatcher<C> {
    runner: SessionRunner<C>,
    capacity: usize,
}

impl<C: SessionConnector> BoundedDispatcher<C> {
    /// Fails with [`DispatchError::InvalidCapacity`] when `capacity` is zero or larger than the
    /// limiter can represent.
    pub fn new(runner: SessionRunner<C>, capacity: usize) -> Result<Self, DispatchError> {
        if capacity == 0 || capacity > Semaphore::MAX_PERMITS {
            return Err(DispatchError::InvalidCapacity(capacity));
        }
        Ok(Self { runner, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Runs every target and returns one result per target, in completion order.
    ///
    /// Per-device failures are part of the report; this never returns early.
    pub async fn run_batch(&self, targets: Vec<DeviceTarget>) -> BatchReport {
        let started_at = SystemTime::now();
        let clock = Instant::now();
        let total = targets.len();
        if total == 0 {
            return BatchReport::new(started_at, clock.elapsed(), Vec::new());
        }

        info!(
            "Dispatching {} devices with up to {} concurrent sessions",
            total, self.capacity
        );

        let limiter = Arc::new(Semaphore::new(self.capacity));
        let collector = ReportCollector::with_capacity(total);
        let mut units: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(total);

        for target in targets {
            let host = target.host().to_string();
            // The limiter is owned here and never closed, so acquisition cannot fail.
            let permit = match Arc::clone(&limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    error!("{} limiter unavailable: {}", host, err);
                    collector.record(DeviceResult::failure(
                        host,
                        FailureReason::Aborted {
                            cause: format!("limiter unavailable: {err}"),
                        },
                        clock.elapsed(),
                    ));
                    continue;
                }
            };
            debug!("Processing {}", host);

            let runner = self.runner.clone();
            let mut unit = UnitGuard {
                host: host.clone(),
                collector: collector.clone(),
                started: Instant::now(),
                recorded: false,
                _permit: permit,
            };
            let handle = tokio::spawn(async move {
                let result = runner.run(&target).await;
                unit.finish(result);
            });
            units.push((host, handle));
        }

        // Join barrier. Units record their own aborts; this only covers a unit that never ran.
        for (host, handle) in units {
            if let Err(err) = handle.await {
                debug!("Execution unit for {} ended abnormally: {}", host, err);
                if !collector.contains(&host) {
                    collector.record(DeviceResult::failure(
                        host,
                        FailureReason::Aborted {
                            cause: err.to_string(),
                        },
                        clock.elapsed(),
                    ));
                }
            }
        }

        let report = BatchReport::new(started_at, clock.elapsed(), collector.drain());
        info!("{}", report.summary());
        report
    }
}

/// Holds a unit's limiter slot and guarantees the unit leaves exactly one result.
///
/// A unit that unwinds or is cancelled records [`FailureReason::Aborted`] as it is torn down,
/// so the entry keeps its place in completion order. The permit is released only after the
/// entry has been recorded.
struct UnitGuard {
    host: String,
    collector: ReportCollector,
    started: Instant,
    recorded: bool,
    _permit: OwnedSemaphorePermit,
}

impl UnitGuard {
    fn finish(mut self, result: DeviceResult) {
        self.collector.record(result);
        self.recorded = true;
    }
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        if self.recorded {
            return;
        }
        let cause = if std::thread::panicking() {
            "execution unit panicked"
        } else {
            "execution unit cancelled"
        };
        error!("{} {}", self.host, cause);
        self.collector.record(DeviceResult::failure(
            self.host.clone(),
            FailureReason::Aborted {
                cause: cause.to_string(),
            },
            self.started.elapsed(),
        ));
    }
}

/// Builds a dispatcher and runs one batch.
///
/// An invalid capacity is reported before the runner sees any target.
pub async fn run_batch<C: SessionConnector>(
    runner: SessionRunner<C>,
    targets: Vec<DeviceTarget>,
    capacity: usize,
) -> Result<BatchReport, DispatchError> {
    let dispatcher = BoundedDispatcher::new(runner, capacity)?;
    Ok(dispatcher.run_batch(targets).await)
}
