//! Device targets and the credentials shared by a batch.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::DispatchError;
use crate::profile::DeviceKind;

/// Login credentials applied to every device of a batch.
///
/// The password is only reachable through [`Credentials::password`]; `Debug` redacts it so
/// a target can be logged safely.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One device to contact. Immutable once built.
#[derive(Debug, Clone)]
pub struct DeviceTarget {
    host: String,
    port: u16,
    credentials: Arc<Credentials>,
    profile: DeviceKind,
    log_destination: PathBuf,
}

impl DeviceTarget {
    /// Builds a target whose log lives in `output_dir`.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        credentials: Arc<Credentials>,
        profile: DeviceKind,
        output_dir: &Path,
    ) -> Self {
        let host = host.into();
        let log_destination = log_path_for(output_dir, &host);
        Self {
            host,
            port,
            credentials,
            profile,
            log_destination,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn profile(&self) -> DeviceKind {
        self.profile
    }

    pub fn log_destination(&self) -> &Path {
        &self.log_destination
    }
}

/// Per-host log file: `<output_dir>/<host>_output.txt`.
///
/// Path separators and `:` (IPv6 literals) in the host are replaced by `_` so the file always
/// lands directly inside `output_dir`.
pub fn log_path_for(output_dir: &Path, host: &str) -> PathBuf {
    let sanitized: String = host
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    output_dir.join(format!("{sanitized}_output.txt"))
}

/// Builds the ordered target list of a batch from plain host names.
#[derive(Debug, Clone)]
pub struct TargetSet {
    port: u16,
    credentials: Arc<Credentials>,
    profile: DeviceKind,
    output_dir: PathBuf,
}

impl TargetSet {
    pub fn new(credentials: Credentials, profile: DeviceKind) -> Self {
        Self {
            port: crate::config::DEFAULT_PORT,
            credentials: Arc::new(credentials),
            profile,
            output_dir: PathBuf::from("."),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    /// One target per host, input order preserved. Hosts are the unique key of a batch, so a
    /// repeated host is rejected.
    pub fn build<I, S>(&self, hosts: I) -> Result<Vec<DeviceTarget>, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for host in hosts {
            let host = host.as_ref();
            if !seen.insert(host.to_string()) {
                return Err(DispatchError::DuplicateHost(host.to_string()));
            }
            targets.push(DeviceTarget::new(
                host,
                self.port,
                Arc::clone(&self.credentials),
                self.profile,
                &self.output_dir,
            ));
        }
        Ok(targets)
    }
}
