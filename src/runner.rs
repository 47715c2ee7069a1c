//! The per-device workflow.
//!
//! [`SessionRunner`] opens a session through an injected [`SessionConnector`], saves the
//! running configuration, runs the status command, closes the session and appends everything
//! the device printed to the target's log. Every error along the way is turned into a
//! [`FailureReason`], so [`SessionRunner::run`] always yields a [`DeviceResult`].

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::config::BatchConfig;
use crate::error::{ConnectError, FailureReason, WorkflowStep};
use crate::report::{DeviceResult, DeviceStatus};
use crate::target::DeviceTarget;

/// An open interactive session to one device.
#[async_trait]
pub trait DeviceSession: Send {
    /// Persists the running configuration and returns the device's acknowledgement.
    async fn save_config(&mut self) -> Result<String, ConnectError>;

    /// Runs a command and returns its full transcript: echo, output and trailing prompt.
    async fn send_command(&mut self, command: &str) -> Result<String, ConnectError>;

    /// Ends the session. Called exactly once, whatever happened before.
    async fn close(&mut self) -> Result<(), ConnectError>;
}

/// Opens sessions to device targets.
#[async_trait]
pub trait SessionConnector: Send + Sync + 'static {
    type Session: DeviceSession + 'static;

    async fn connect(&self, target: &DeviceTarget) -> Result<Self::Session, ConnectError>;
}

/// Time bounds and command selection for the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    /// Overrides the status command of the target's dialect.
    pub status_command: Option<String>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

impl RunnerOptions {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            command_timeout: config.command_timeout(),
            status_command: config.status_command.clone(),
        }
    }
}

/// Runs the save-then-status workflow against one target at a time.
pub struct SessionRunner<C> {
    connector: Arc<C>,
    options: RunnerOptions,
}

impl<C> Clone for SessionRunner<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            options: self.options.clone(),
        }
    }
}

impl<C: SessionConnector> SessionRunner<C> {
    pub fn new(connector: C, options: RunnerOptions) -> Self {
        Self {
            connector: Arc::new(connector),
            options,
        }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Runs the workflow. Never fails: errors become the result's status.
    pub async fn run(&self, target: &DeviceTarget) -> DeviceResult {
        let started = Instant::now();
        let status = match self.execute(target).await {
            Ok(()) => {
                info!("{} done", target.host());
                DeviceStatus::Success
            }
            Err(reason) => {
                warn!("{} failed: {}", target.host(), reason);
                DeviceStatus::Failure(reason)
            }
        };
        DeviceResult::new(target.host(), status, started.elapsed())
    }

    async fn execute(&self, target: &DeviceTarget) -> Result<(), FailureReason> {
        let mut session = match timeout(
            self.options.connect_timeout,
            self.connector.connect(target),
        )
        .await
        {
            Err(_) => {
                return Err(FailureReason::Timeout {
                    step: WorkflowStep::Connect,
                });
            }
            Ok(Err(err)) => {
                return Err(FailureReason::Connect {
                    cause: err.to_string(),
                });
            }
            Ok(Ok(session)) => session,
        };
        debug!("{} session open", target.host());

        let mut transcript = String::new();
        let workflow = self
            .run_workflow(&mut session, target, &mut transcript)
            .await;

        self.close_session(&mut session, target).await;
        drop(session);

        let logged = if transcript.is_empty() {
            debug!("{} no output captured, log left untouched", target.host());
            Ok(())
        } else {
            append_log(target.log_destination(), &transcript).await
        };

        match (workflow, logged) {
            (Err(reason), Err(io_reason)) => {
                warn!("{} {}", target.host(), io_reason);
                Err(reason)
            }
            (Err(reason), Ok(())) => Err(reason),
            (Ok(()), logged) => logged,
        }
    }

    /// Output of completed steps is kept in `transcript` even when a later step fails.
    async fn run_workflow<S: DeviceSession>(
        &self,
        session: &mut S,
        target: &DeviceTarget,
        transcript: &mut String,
    ) -> Result<(), FailureReason> {
        let ack = self
            .bounded(WorkflowStep::SaveConfig, session.save_config())
            .await?;
        push_section(transcript, &ack);

        let status_command = self
            .options
            .status_command
            .as_deref()
            .unwrap_or_else(|| target.profile().status_command());
        let output = self
            .bounded(WorkflowStep::Status, session.send_command(status_command))
            .await?;
        push_section(transcript, &output);

        Ok(())
    }

    async fn bounded<F>(&self, step: WorkflowStep, step_future: F) -> Result<String, FailureReason>
    where
        F: Future<Output = Result<String, ConnectError>>,
    {
        match timeout(self.options.command_timeout, step_future).await {
            Err(_) => Err(FailureReason::Timeout { step }),
            Ok(Err(err)) => Err(FailureReason::Command {
                step,
                cause: err.to_string(),
            }),
            Ok(Ok(output)) => Ok(output),
        }
    }

    /// A failed close is logged and otherwise ignored; the session is dropped right after.
    async fn close_session<S: DeviceSession>(&self, session: &mut S, target: &DeviceTarget) {
        match timeout(self.options.command_timeout, session.close()).await {
            Ok(Ok(())) => debug!("{} session closed", target.host()),
            Ok(Err(err)) => debug!("{} error closing session: {}", target.host(), err),
            Err(_) => debug!("{} timed out closing session", target.host()),
        }
    }
}

fn push_section(transcript: &mut String, section: &str) {
    transcript.push_str(section);
    if !section.is_empty() && !section.ends_with('\n') {
        transcript.push('\n');
    }
}

/// Appends to the log, creating it if missing.
async fn append_log(path: &Path, text: &str) -> Result<(), FailureReason> {
    let io_failure = |err: std::io::Error| FailureReason::IoWrite {
        path: path.display().to_string(),
        cause: err.to_string(),
    };
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(io_failure)?;
    file.write_all(text.as_bytes()).await.map_err(io_failure)?;
    file.flush().await.map_err(io_failure)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::DeviceKind;
    use crate::target::Credentials;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Script {
        Ok,
        RefuseConnect,
        RejectSave,
        HangStatus,
    }

    struct ScriptedConnector {
        script: Script,
        closed: Arc<AtomicBool>,
        commands: Arc<AtomicUsize>,
    }

    struct ScriptedSession {
        script: Script,
        closed: Arc<AtomicBool>,
        commands: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SessionConnector for ScriptedConnector {
        type Session = ScriptedSession;

        async fn connect(&self, _target: &DeviceTarget) -> Result<ScriptedSession, ConnectError> {
            if let Script::RefuseConnect = self.script {
                return Err(ConnectError::Transport("connection refused".to_string()));
            }
            Ok(ScriptedSession {
                script: self.script,
                closed: Arc::clone(&self.closed),
                commands: Arc::clone(&self.commands),
            })
        }
    }

    #[async_trait]
    impl DeviceSession for ScriptedSession {
        async fn save_config(&mut self) -> Result<String, ConnectError> {
            self.commands.fetch_add(1, Ordering::SeqCst);
            if let Script::RejectSave = self.script {
                return Err(ConnectError::CommandRejected {
                    command: "write memory".to_string(),
                    line: "Invalid input: write".to_string(),
                });
            }
            Ok("write memory\nsw1# ".to_string())
        }

        async fn send_command(&mut self, command: &str) -> Result<String, ConnectError> {
            self.commands.fetch_add(1, Ordering::SeqCst);
            if let Script::HangStatus = self.script {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(format!("{command}\nImage A 1234\nsw1# "))
        }

        async fn close(&mut self) -> Result<(), ConnectError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn runner(script: Script) -> (SessionRunner<ScriptedConnector>, Arc<AtomicBool>, Arc<AtomicUsize>) {
        let closed = Arc::new(AtomicBool::new(false));
        let commands = Arc::new(AtomicUsize::new(0));
        let connector = ScriptedConnector {
            script,
            closed: Arc::clone(&closed),
            commands: Arc::clone(&commands),
        };
        let options = RunnerOptions {
            connect_timeout: Duration::from_millis(200),
            command_timeout: Duration::from_millis(100),
            status_command: None,
        };
        (SessionRunner::new(connector, options), closed, commands)
    }

    fn target(dir: &Path) -> DeviceTarget {
        DeviceTarget::new(
            "sw1",
            22,
            Arc::new(Credentials::new("admin", "pw")),
            DeviceKind::HpProcurve,
            dir,
        )
    }

    #[tokio::test]
    async fn successful_run_appends_both_outputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (runner, closed, commands) = runner(Script::Ok);
        let target = target(dir.path());
        std::fs::write(target.log_destination(), "previous run\n").expect("seed log");

        let result = runner.run(&target).await;

        assert!(result.is_success(), "{:?}", result.status());
        assert_eq!(result.host(), "sw1");
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(commands.load(Ordering::SeqCst), 2);
        let log = std::fs::read_to_string(target.log_destination()).expect("log");
        assert_eq!(
            log,
            "previous run\nwrite memory\nsw1# \nshow flash\nImage A 1234\nsw1# \n"
        );
    }

    #[tokio::test]
    async fn connect_failure_is_recorded_without_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (runner, closed, commands) = runner(Script::RefuseConnect);
        let target = target(dir.path());

        let result = runner.run(&target).await;

        match result.status().failure() {
            Some(FailureReason::Connect { cause }) => assert!(cause.contains("refused")),
            other => panic!("unexpected status: {other:?}"),
        }
        assert!(!closed.load(Ordering::SeqCst));
        assert_eq!(commands.load(Ordering::SeqCst), 0);
        assert!(!target.log_destination().exists());
    }

    #[tokio::test]
    async fn rejected_save_closes_session_and_skips_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (runner, closed, commands) = runner(Script::RejectSave);
        let target = target(dir.path());

        let result = runner.run(&target).await;

        assert!(matches!(
            result.status().failure(),
            Some(FailureReason::Command {
                step: WorkflowStep::SaveConfig,
                ..
            })
        ));
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(commands.load(Ordering::SeqCst), 1);
        assert!(!target.log_destination().exists());
    }

    #[tokio::test]
    async fn hung_status_command_times_out_and_keeps_save_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (runner, closed, _) = runner(Script::HangStatus);
        let target = target(dir.path());

        let result = runner.run(&target).await;

        assert_eq!(
            result.status().failure(),
            Some(&FailureReason::Timeout {
                step: WorkflowStep::Status
            })
        );
        assert!(closed.load(Ordering::SeqCst));
        assert!(result.elapsed() < Duration::from_secs(5));
        let log = std::fs::read_to_string(target.log_destination()).expect("log");
        assert_eq!(log, "write memory\nsw1# \n");
    }

    #[tokio::test]
    async fn unwritable_log_is_an_io_failure_after_close() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (runner, closed, _) = runner(Script::Ok);
        let target = target(&dir.path().join("missing-dir"));

        let result = runner.run(&target).await;

        assert!(matches!(
            result.status().failure(),
            Some(FailureReason::IoWrite { .. })
        ));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn status_command_override_is_used() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut runner, _, _) = runner(Script::Ok);
        runner.options.status_command = Some("show version".to_string());
        let target = target(dir.path());

        assert!(runner.run(&target).await.is_success());
        let log = std::fs::read_to_string(target.log_destination()).expect("log");
        assert!(log.contains("show version\n"));
        assert!(!log.contains("show flash"));
    }
}
