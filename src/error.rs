//! Error types for device sessions and batch dispatch.
//!
//! Three layers of errors live here:
//!
//! - [`ConnectError`] is raised by a session collaborator (SSH transport, prompt handling,
//!   device rejections). It never crosses the dispatcher boundary.
//! - [`FailureReason`] is the data form of a per-device failure, stored in a
//!   [`DeviceResult`](crate::report::DeviceResult).
//! - [`DispatchError`] covers the fatal setup errors raised before any device work starts.

use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// Errors that can occur while talking to a single device.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The SSH channel was disconnected while waiting for a prompt.
    ///
    /// This typically happens when the remote device closes the connection
    /// unexpectedly during login or in the middle of a command.
    #[error("channel disconnect on wait prompt")]
    ChannelDisconnectError,

    /// The shell went away before the device presented its first prompt.
    #[error("no prompt after login: {0}")]
    InitTimeout(String),

    /// The device printed an error line in response to a command.
    #[error("command '{command}' rejected: {line}")]
    CommandRejected { command: String, line: String },

    /// The prompt table of a dialect could not be compiled.
    #[error("invalid prompt configuration: {0}")]
    InvalidPromptConfig(String),

    /// Any other transport failure reported by a session collaborator.
    #[error("transport error: {0}")]
    Transport(String),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// Failed to send data through the channel.
    #[error("Failed to send data: {0}")]
    SendDataError(#[from] SendError<String>),
}

/// The step of the per-device workflow an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// Opening the SSH session and waiting for the first prompt.
    Connect,
    /// Persisting the running configuration.
    SaveConfig,
    /// Running the status/inventory command.
    Status,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowStep::Connect => "connect",
            WorkflowStep::SaveConfig => "save-config",
            WorkflowStep::Status => "status",
        };
        f.write_str(name)
    }
}

/// Why a device ended up as a failure in the batch report.
///
/// The host is carried by the enclosing [`DeviceResult`](crate::report::DeviceResult).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The transport could not be established.
    #[error("connect error: {cause}")]
    Connect { cause: String },

    /// One of the workflow commands failed after the session was open.
    #[error("command error in {step} step: {cause}")]
    Command { step: WorkflowStep, cause: String },

    /// A step exceeded its time bound.
    #[error("timed out in {step} step")]
    Timeout { step: WorkflowStep },

    /// The device log could not be written.
    #[error("failed to write log {path}: {cause}")]
    IoWrite { path: String, cause: String },

    /// The execution unit ended without producing a result (panic or cancellation).
    #[error("execution unit aborted: {cause}")]
    Aborted { cause: String },
}

impl FailureReason {
    /// Short machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::Connect { .. } => "connect",
            FailureReason::Command { .. } => "command",
            FailureReason::Timeout { .. } => "timeout",
            FailureReason::IoWrite { .. } => "io_write",
            FailureReason::Aborted { .. } => "aborted",
        }
    }
}

/// Fatal errors raised while setting a batch up.
///
/// None of these can happen once the first device has been submitted.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The concurrency capacity must be at least one.
    #[error("invalid capacity {0}: at least one concurrent session is required")]
    InvalidCapacity(usize),

    /// Any other invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A host appears more than once in the target list.
    #[error("duplicate host '{0}' in target list")]
    DuplicateHost(String),

    /// The requested device profile is not built in.
    #[error("unknown device profile '{0}'")]
    UnknownProfile(String),

    /// The address list could not be read.
    #[error("failed to read inventory {}: {source}", path.display())]
    Inventory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`BatchConfig`](crate::config::BatchConfig).
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_names_the_step() {
        let reason = FailureReason::Timeout {
            step: WorkflowStep::SaveConfig,
        };
        assert_eq!(reason.to_string(), "timed out in save-config step");
        assert_eq!(reason.kind(), "timeout");
    }

    #[test]
    fn failure_reason_serializes_with_kind_tag() {
        let reason = FailureReason::Command {
            step: WorkflowStep::Status,
            cause: "boom".to_string(),
        };
        let json = serde_json::to_value(&reason).expect("serialize");
        assert_eq!(json["kind"], "command");
        assert_eq!(json["step"], "status");
        assert_eq!(json["cause"], "boom");
    }

    #[test]
    fn invalid_capacity_message_mentions_value() {
        let err = DispatchError::InvalidCapacity(0);
        assert!(err.to_string().contains("invalid capacity 0"));
    }
}
