//! Error taxonomy for key resolution, key loading and signing
//!
//! Every failure a signing session can hit surfaces as one [`SignError`]
//! variant. Only [`SignError::KeyUnavailable`] is meant to be recovered
//! from (as a skip); everything else aborts the session.

use std::fmt;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for signing operations
pub type SignResult<T> = Result<T, SignError>;

/// Which key of a master/subkey pair a validity check rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Master,
    Subkey,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Master => write!(f, "master key"),
            KeyRole::Subkey => write!(f, "subkey"),
        }
    }
}

/// Errors from key material resolution, key ring loading and signing
#[derive(Debug, Error)]
pub enum SignError {
    /// Key id is not a 64-bit hex number
    #[error("Invalid keyId: {value}: {reason}")]
    InvalidKeyId { value: String, reason: String },

    /// No key bytes could be resolved from any source
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),

    /// The passphrase decryption collaborator rejected the value
    #[error("Invalid encrypted passphrase: {source}")]
    PassphraseDecrypt {
        #[source]
        source: anyhow::Error,
    },

    /// Key bytes are present but do not form an OpenPGP key ring
    #[error("malformed key ring: {0}")]
    MalformedKeyRing(String),

    /// No secret key matched the requested id (or the ring has none)
    #[error("Secret key not found{}", .key_id.map(|id| format!(": 0x{:016X}", id)).unwrap_or_default())]
    SecretKeyNotFound { key_id: Option<u64> },

    /// Encrypted secret key but no passphrase was supplied
    #[error("Secret key 0x{key_id:016X} is encrypted - keyPass is required")]
    PassphraseRequired { key_id: u64 },

    /// Selected key carries no usable private material
    #[error("Private key material missing for key 0x{key_id:016X}")]
    PrivateKeyMissing { key_id: u64 },

    /// Selected key, or the master it is bound to, has expired
    #[error("{description} was expired at: {expired_at}")]
    KeyExpired {
        role: KeyRole,
        description: String,
        expired_at: DateTime<Utc>,
    },

    /// Wrong passphrase or corrupt secret key material
    #[error("failed to decrypt secret key 0x{key_id:016X}: {source}")]
    KeyDecrypt {
        key_id: u64,
        #[source]
        source: anyhow::Error,
    },

    /// Stream, IO or crypto failure while producing a signature
    #[error("failed to sign into {}: {source}", .path.display())]
    Signing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A source artifact that has no file to sign
    #[error("Artifact: {0} has no file")]
    ArtifactWithoutFile(String),

    /// The variant capability failed for an artifact
    #[error("failed to enumerate variants of {artifact}: {source}")]
    Transform {
        artifact: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration could not be assembled
    #[error("configuration error: {0}")]
    Config(String),

    /// File system problem outside of signature generation
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SignError {
    /// True when the error only signals that no key material exists
    pub fn is_key_unavailable(&self) -> bool {
        matches!(self, SignError::KeyUnavailable(_))
    }

    /// I/O failure on `path`
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SignError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_key_id_formatting_in_messages() {
        let err = SignError::PassphraseRequired {
            key_id: 0xABCDEF,
        };
        assert_eq!(
            err.to_string(),
            "Secret key 0x0000000000ABCDEF is encrypted - keyPass is required"
        );

        let err = SignError::PrivateKeyMissing {
            key_id: 0x1122334455667788,
        };
        assert!(err.to_string().contains("0x1122334455667788"));
    }

    #[test]
    fn test_secret_key_not_found_with_and_without_id() {
        let err = SignError::SecretKeyNotFound { key_id: None };
        assert_eq!(err.to_string(), "Secret key not found");

        let err = SignError::SecretKeyNotFound {
            key_id: Some(0x10),
        };
        assert_eq!(err.to_string(), "Secret key not found: 0x0000000000000010");
    }

    #[test]
    fn test_key_expired_names_key_and_instant() {
        let expired_at = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let err = SignError::KeyExpired {
            role: KeyRole::Master,
            description: "KeyId: 0xAABB".to_string(),
            expired_at,
        };
        assert_eq!(
            err.to_string(),
            "KeyId: 0xAABB was expired at: 2020-01-02 03:04:05 UTC"
        );
    }

    #[test]
    fn test_only_key_unavailable_is_recoverable() {
        assert!(SignError::KeyUnavailable("none".into()).is_key_unavailable());
        assert!(!SignError::SecretKeyNotFound { key_id: None }.is_key_unavailable());
        assert!(!SignError::Config("x".into()).is_key_unavailable());
    }

    #[test]
    fn test_io_error_names_path() {
        let err = SignError::io(
            "/tmp/missing.jar",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.jar"));
    }
}
