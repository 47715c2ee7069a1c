//! # netbatch - Bounded-concurrency SSH batch runner for network devices
//!
//! `netbatch` connects to a list of switches and routers over SSH, saves each device's running
//! configuration, runs a status command and appends everything the device printed to a
//! per-device log file. At most K devices are worked on at any moment; the rest wait for a
//! free slot and are started in input order.
//!
//! ## Features
//!
//! - **Bounded concurrency**: A semaphore of capacity K caps simultaneous sessions
//! - **Failure isolation**: Connect, command, timeout and log-write errors are recorded per device
//! - **Time-bounded steps**: Every network step runs under its own timeout
//! - **Device dialects**: Save/status commands and prompt patterns for common vendors
//! - **Maximum Compatibility**: Legacy SSH algorithm tiers for older switch firmware
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netbatch::dispatch::BoundedDispatcher;
//! use netbatch::profile::DeviceKind;
//! use netbatch::runner::{RunnerOptions, SessionRunner};
//! use netbatch::session::{ConnectionSecurityOptions, SshConnector};
//! use netbatch::target::{Credentials, TargetSet};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let targets = TargetSet::new(Credentials::new("admin", "secret"), DeviceKind::HpProcurve)
//!         .with_output_dir("logs")
//!         .build(["10.0.0.1", "10.0.0.2", "10.0.0.3"])?;
//!
//!     let connector = SshConnector::new(ConnectionSecurityOptions::legacy_compatible());
//!     let runner = SessionRunner::new(connector, RunnerOptions::default());
//!     let dispatcher = BoundedDispatcher::new(runner, 2)?;
//!
//!     let report = dispatcher.run_batch(targets).await;
//!     for result in report.results() {
//!         println!("{}: {}", result.host(), result.status());
//!     }
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`dispatch::BoundedDispatcher`] - Runs a batch with at most K sessions in flight
//! - [`runner::SessionRunner`] - The per-device save, status and log workflow
//! - [`report::BatchReport`] - One result per device plus batch timing
//! - [`session::SshConnector`] - SSH implementation of the session collaborator
//! - [`error::FailureReason`] - Why a single device failed
//! - [`config`] - Batch settings and SSH algorithm tiers

pub mod config;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod profile;
pub mod report;
pub mod runner;
pub mod session;
pub mod target;

pub use config::BatchConfig;
pub use dispatch::{BoundedDispatcher, run_batch};
pub use error::{ConnectError, DispatchError, FailureReason, WorkflowStep};
pub use report::{BatchReport, BatchSummary, DeviceResult, DeviceStatus};
pub use runner::{DeviceSession, RunnerOptions, SessionConnector, SessionRunner};
pub use target::{Credentials, DeviceTarget, TargetSet};
