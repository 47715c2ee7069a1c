//! Instrumented in-memory session collaborator shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use netbatch::error::ConnectError;
use netbatch::profile::DeviceKind;
use netbatch::runner::{DeviceSession, RunnerOptions, SessionConnector, SessionRunner};
use netbatch::target::{Credentials, DeviceTarget, TargetSet};

/// How the stub device behind a host behaves.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Answers every command after the given delay.
    Succeed(Duration),
    /// Refuses the connection.
    RefuseConnect,
    /// Rejects the save command.
    RejectSave,
    /// Never answers the status command.
    HangStatus,
    /// Panics while connecting.
    Panic,
}

/// Counters observed by the tests.
#[derive(Debug, Default)]
pub struct Probe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    closes: AtomicUsize,
    connects: Mutex<Vec<String>>,
}

impl Probe {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Hosts in the order their connection attempts started.
    pub fn connects(&self) -> Vec<String> {
        self.connects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn enter(self: &Arc<Self>, host: &str) -> ActiveGuard {
        self.connects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(host.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        ActiveGuard {
            probe: Arc::clone(self),
        }
    }
}

/// Counts one in-flight unit from connect until the session is dropped, unwinding included.
struct ActiveGuard {
    probe: Arc<Probe>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct StubConnector {
    probe: Arc<Probe>,
    default: Behavior,
    overrides: HashMap<String, Behavior>,
}

impl StubConnector {
    pub fn new(default: Behavior) -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_host(mut self, host: &str, behavior: Behavior) -> Self {
        self.overrides.insert(host.to_string(), behavior);
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }

    fn behavior_for(&self, host: &str) -> Behavior {
        self.overrides.get(host).copied().unwrap_or(self.default)
    }
}

pub struct StubSession {
    behavior: Behavior,
    probe: Arc<Probe>,
    _guard: ActiveGuard,
}

#[async_trait]
impl SessionConnector for StubConnector {
    type Session = StubSession;

    async fn connect(&self, target: &DeviceTarget) -> Result<StubSession, ConnectError> {
        let guard = self.probe.enter(target.host());
        let behavior = self.behavior_for(target.host());
        tokio::time::sleep(Duration::from_millis(5)).await;
        match behavior {
            Behavior::RefuseConnect => {
                Err(ConnectError::Transport("connection refused".to_string()))
            }
            Behavior::Panic => panic!("stub device {} crashed", target.host()),
            _ => Ok(StubSession {
                behavior,
                probe: Arc::clone(&self.probe),
                _guard: guard,
            }),
        }
    }
}

#[async_trait]
impl DeviceSession for StubSession {
    async fn save_config(&mut self) -> Result<String, ConnectError> {
        match self.behavior {
            Behavior::RejectSave => Err(ConnectError::CommandRejected {
                command: "write memory".to_string(),
                line: "Invalid input: write".to_string(),
            }),
            _ => Ok("write memory\nsw# ".to_string()),
        }
    }

    async fn send_command(&mut self, command: &str) -> Result<String, ConnectError> {
        match self.behavior {
            Behavior::Succeed(delay) => tokio::time::sleep(delay).await,
            Behavior::HangStatus => tokio::time::sleep(Duration::from_secs(3600)).await,
            _ => {}
        }
        Ok(format!("{command}\nPrimary Image 1432\nsw# "))
    }

    async fn close(&mut self) -> Result<(), ConnectError> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn options() -> RunnerOptions {
    RunnerOptions {
        connect_timeout: Duration::from_secs(2),
        command_timeout: Duration::from_millis(300),
        status_command: None,
    }
}

pub fn runner(connector: StubConnector) -> SessionRunner<StubConnector> {
    SessionRunner::new(connector, options())
}

pub fn targets(dir: &Path, hosts: &[&str]) -> Vec<DeviceTarget> {
    TargetSet::new(Credentials::new("admin", "pw"), DeviceKind::HpProcurve)
        .with_output_dir(dir)
        .build(hosts)
        .expect("unique hosts")
}
