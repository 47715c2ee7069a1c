//! Batch configuration and SSH algorithm tiers.
//!
//! [`BatchConfig`] is the whole configuration surface of a batch: concurrency, time bounds,
//! device dialect and where logs go. It can be loaded from a JSON file and every field has a
//! default, so an empty object is a valid configuration.
//!
//! The algorithm lists below are grouped in three tiers that
//! [`SecurityLevel`](crate::session::SecurityLevel) selects from. The legacy tier covers
//! switch firmware whose SSH stack only speaks SHA-1 key exchange and CBC ciphers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::profile::DeviceKind;
use crate::session::SecurityLevel;

/// Default number of concurrently open sessions.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default bound for opening a session, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default bound for a single command round-trip, in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Everything a batch needs besides the target list and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Maximum number of devices worked on at the same time.
    pub concurrency: usize,

    /// Time bound for establishing a session, in seconds.
    pub connect_timeout_secs: u64,

    /// Time bound for each workflow command, in seconds.
    pub command_timeout_secs: u64,

    /// Device CLI dialect applied to every target.
    pub profile: DeviceKind,

    /// Overrides the dialect's status/inventory command.
    pub status_command: Option<String>,

    /// SSH port used for every target.
    pub port: u16,

    /// Directory receiving the `<host>_output.txt` logs.
    pub output_dir: PathBuf,

    /// SSH algorithm policy.
    pub security: SecurityLevel,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            profile: DeviceKind::default(),
            status_command: None,
            port: DEFAULT_PORT,
            output_dir: PathBuf::from("."),
            security: SecurityLevel::LegacyCompatible,
        }
    }
}

impl BatchConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, DispatchError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| DispatchError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Rejects values that would make the batch meaningless.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.concurrency == 0 {
            return Err(DispatchError::InvalidCapacity(self.concurrency));
        }
        if self.connect_timeout_secs == 0 {
            return Err(DispatchError::InvalidConfig(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(DispatchError::InvalidConfig(
                "command_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if matches!(&self.status_command, Some(cmd) if cmd.trim().is_empty()) {
            return Err(DispatchError::InvalidConfig(
                "status_command must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Status command to run: the configured override or the dialect default.
    pub fn effective_status_command(&self) -> String {
        self.status_command
            .clone()
            .unwrap_or_else(|| self.profile.status_command().to_string())
    }

    /// JSON schema of the configuration file, pretty printed.
    pub fn json_schema() -> Result<String, DispatchError> {
        let schema = schemars::schema_for!(BatchConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

/// Modern key exchange algorithms only.
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
];

/// AEAD and CTR ciphers.
pub const SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

/// SHA-2 MACs, encrypt-then-MAC first.
pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

/// Secure tier plus group-exchange and SHA-1 group 14.
pub const BALANCED_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA1,
];

pub const BALANCED_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_128_CBC,
];

pub const BALANCED_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const BALANCED_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
];

/// Every supported key exchange algorithm, legacy Diffie-Hellman included.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::DH_G17_SHA512,
    kex::DH_G18_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::NONE,
];

/// Every supported cipher, CBC modes and `none` included.
pub const LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::CLEAR,
    cipher::NONE,
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::CHACHA20_POLY1305,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::NONE,
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
];

pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Dsa,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Ed25519,
    Algorithm::Rsa { hash: None },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
];

/// Compression methods offered by every tier.
pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = BatchConfig::from_json_str("{}").expect("parse");
        assert_eq!(config, BatchConfig::default());
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.profile, DeviceKind::HpProcurve);
    }

    #[test]
    fn partial_config_overrides_selected_fields() {
        let config = BatchConfig::from_json_str(
            r#"{"concurrency": 12, "profile": "cisco_ios", "status_command": "show version"}"#,
        )
        .expect("parse");
        assert_eq!(config.concurrency, 12);
        assert_eq!(config.profile, DeviceKind::CiscoIos);
        assert_eq!(config.effective_status_command(), "show version");
        assert_eq!(config.command_timeout_secs, DEFAULT_COMMAND_TIMEOUT_SECS);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = BatchConfig::from_json_str(r#"{"concurency": 3}"#).expect_err("typo");
        assert!(matches!(err, DispatchError::ConfigParse(_)));
    }

    #[test]
    fn zero_concurrency_is_invalid_capacity() {
        let config = BatchConfig {
            concurrency: 0,
            ..BatchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DispatchError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let config = BatchConfig {
            command_timeout_secs: 0,
            ..BatchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DispatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn status_command_falls_back_to_dialect_default() {
        let config = BatchConfig::default();
        assert_eq!(config.effective_status_command(), "show flash");
    }

    #[test]
    fn schema_lists_config_fields() {
        let schema = BatchConfig::json_schema().expect("schema");
        assert!(schema.contains("concurrency"));
        assert!(schema.contains("command_timeout_secs"));
    }

    #[test]
    fn secure_tier_excludes_weak_algorithms() {
        assert!(!SECURE_KEX_ORDER.contains(&kex::DH_G1_SHA1));
        assert!(!SECURE_CIPHERS.contains(&cipher::NONE));
        assert!(!SECURE_MAC_ALGORITHMS.contains(&mac::HMAC_SHA1));
    }
}
