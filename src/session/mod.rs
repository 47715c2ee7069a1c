//! SSH implementation of the device session collaborator.
//!
//! This module opens an interactive shell on a network device, waits for its prompt and drives
//! commands through it, answering paging markers and confirmation questions along the way.
//!
//! # Main Components
//!
//! - [`SshConnector`] - [`SessionConnector`] opening one [`SshSession`] per target
//! - [`SshSession`] - Interactive shell with prompt tracking
//! - [`ConnectionSecurityOptions`] - Algorithm policy and host key checking

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use async_trait::async_trait;
use log::{debug, trace};
use russh::{ChannelMsg, Preferred};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

use crate::config;
use crate::error::ConnectError;
use crate::profile::{DeviceKind, IGNORE_START_LINE, LineKind, PromptMatcher, clean_output};
use crate::runner::{DeviceSession, SessionConnector};
use crate::target::DeviceTarget;

pub use security::{ConnectionSecurityOptions, SecurityLevel};

/// Opens SSH sessions with a fixed security policy.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    security: ConnectionSecurityOptions,
}

impl SshConnector {
    pub fn new(security: ConnectionSecurityOptions) -> Self {
        Self { security }
    }
}

/// Background task bridging the shell channel and the session queues.
///
/// The task owns the russh channel, which keeps the SSH connection alive on its own, so it is
/// aborted when dropped.
struct IoTask(JoinHandle<()>);

impl IoTask {
    /// Aborts the task and waits until it has released the channel.
    async fn stop(&mut self) {
        self.0.abort();
        let _ = (&mut self.0).await;
    }
}

impl Drop for IoTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// An interactive shell on one device.
pub struct SshSession {
    client: Client,
    io_task: IoTask,
    sender: Sender<String>,
    recv: Receiver<String>,
    matcher: PromptMatcher,
    profile: DeviceKind,
    /// Last prompt seen, e.g. `core-sw# `.
    prompt: String,
    device_addr: String,
}

mod client;
mod security;
