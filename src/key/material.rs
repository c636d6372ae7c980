//! Key material resolution
//!
//! Each of key id, passphrase and key bytes is resolved independently with
//! the precedence environment > configuration > settings store. When a
//! server id is configured the settings record replaces the explicit
//! configuration fields entirely; environment overrides still win.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::SettingsStore;
use crate::env::{Environment, SIGN_KEY_ENV, SIGN_KEY_ID_ENV, SIGN_KEY_PASS_ENV};
use crate::error::{SignError, SignResult};

/// Passphrase held in memory that is wiped on drop
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the plain text
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Zeroizing<String>> for Passphrase {
    fn from(value: Zeroizing<String>) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Passphrase([REDACTED])")
    }
}

/// What a configured key file that does not exist means
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingKeyFile {
    /// No key bytes; the session decides whether to skip
    #[default]
    Unavailable,
    /// Fail with [`SignError::KeyUnavailable`] naming the path
    Error,
}

/// Turns an encrypted-at-rest passphrase into its plain form
pub trait PassphraseDecryptor: Send + Sync {
    fn decrypt(&self, value: &str) -> anyhow::Result<Zeroizing<String>>;
}

/// Key inputs from configuration, supplied once per execution
#[derive(Debug, Clone, Default)]
pub struct KeyMaterialRequest {
    /// Settings-store server id
    pub server_id: Option<String>,

    /// Key id as hex, `0x` prefix allowed
    pub key_id: Option<String>,

    pub passphrase: Option<Passphrase>,

    /// Key file path, `~/` is expanded
    pub key_file: Option<String>,
}

/// Outcome of key material resolution
pub struct ResolvedKeyMaterial {
    pub key_id: Option<u64>,
    pub passphrase: Option<Passphrase>,
    /// Raw key ring bytes, empty when no key is available
    pub key_bytes: Zeroizing<Vec<u8>>,
    /// Expanded key file path that was consulted; `None` for `SIGN_KEY`
    /// content or when no file is configured
    pub key_file: Option<PathBuf>,
}

impl ResolvedKeyMaterial {
    pub fn is_key_available(&self) -> bool {
        !self.key_bytes.is_empty()
    }

    /// [`SignError::KeyUnavailable`] naming where the key was looked for
    pub fn unavailable_error(&self) -> SignError {
        match &self.key_file {
            Some(path) => {
                SignError::KeyUnavailable(format!("key file: {} not found", path.display()))
            }
            None => SignError::KeyUnavailable(format!(
                "{} is not set and no key file is configured",
                SIGN_KEY_ENV
            )),
        }
    }
}

impl fmt::Debug for ResolvedKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedKeyMaterial")
            .field("key_id", &self.key_id.map(|id| format!("0x{:016X}", id)))
            .field("passphrase", &self.passphrase)
            .field(
                "key_bytes",
                &format_args!("[REDACTED; {} bytes]", self.key_bytes.len()),
            )
            .field("key_file", &self.key_file)
            .finish()
    }
}

/// Parse a hex key id, with optional `0x` prefix, into its 64-bit value
pub fn parse_key_id(value: &str) -> SignResult<u64> {
    let invalid = |reason: &str| SignError::InvalidKeyId {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(invalid("empty key id"));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("not a hexadecimal number"));
    }

    u64::from_str_radix(digits, 16).map_err(|e| invalid(&e.to_string()))
}

/// Expand a leading `~/` to `home`
pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match home {
        Some(home) if path == "~" => home.to_path_buf(),
        Some(home) => match path.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// Merges environment, configuration and settings store into one triple
pub struct KeyMaterialResolver<'a> {
    env: &'a Environment,
    settings: Option<&'a dyn SettingsStore>,
    decryptor: Option<&'a dyn PassphraseDecryptor>,
    missing_key_file: MissingKeyFile,
}

impl<'a> KeyMaterialResolver<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self {
            env,
            settings: None,
            decryptor: None,
            missing_key_file: MissingKeyFile::default(),
        }
    }

    pub fn with_settings(mut self, settings: &'a dyn SettingsStore) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_decryptor(mut self, decryptor: &'a dyn PassphraseDecryptor) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    pub fn missing_key_file(mut self, policy: MissingKeyFile) -> Self {
        self.missing_key_file = policy;
        self
    }

    /// Resolve key id, passphrase and key bytes for `request`
    pub fn resolve(&self, request: &KeyMaterialRequest) -> SignResult<ResolvedKeyMaterial> {
        let (key_id, passphrase, key_file) = match &request.server_id {
            Some(server_id) => {
                let record = self.settings.and_then(|s| s.server(server_id));
                if record.is_some() {
                    debug!("server id: {} found - reading key info from settings", server_id);
                } else {
                    debug!("server id: {} not found in settings", server_id);
                }
                let record = record.unwrap_or_default();
                (record.username, record.passphrase, record.private_key)
            }
            None => (
                request.key_id.clone(),
                request.passphrase.clone(),
                request.key_file.clone(),
            ),
        };

        let key_id = self.resolve_key_id(key_id)?;
        let passphrase = self.resolve_passphrase(passphrase)?;
        let (key_bytes, key_file) = self.resolve_key(key_file.as_deref())?;

        Ok(ResolvedKeyMaterial {
            key_id,
            passphrase,
            key_bytes,
            key_file,
        })
    }

    fn resolve_key_id(&self, configured: Option<String>) -> SignResult<Option<u64>> {
        self.env
            .get(SIGN_KEY_ID_ENV)
            .or(configured)
            .filter(|id| !id.trim().is_empty())
            .map(|id| parse_key_id(&id))
            .transpose()
    }

    fn resolve_passphrase(&self, configured: Option<Passphrase>) -> SignResult<Option<Passphrase>> {
        let passphrase = self
            .env
            .get_secret(SIGN_KEY_PASS_ENV)
            .map(Passphrase::from)
            .or(configured);

        match (passphrase, self.decryptor) {
            (Some(passphrase), Some(decryptor)) => decryptor
                .decrypt(passphrase.expose())
                .map(|plain| Some(Passphrase::from(plain)))
                .map_err(|source| SignError::PassphraseDecrypt { source }),
            (passphrase, _) => Ok(passphrase),
        }
    }

    /// Key bytes, and the file they were read from (or looked for)
    fn resolve_key(
        &self,
        key_file: Option<&str>,
    ) -> SignResult<(Zeroizing<Vec<u8>>, Option<PathBuf>)> {
        if let Some(content) = self.env.get_secret(SIGN_KEY_ENV) {
            let bytes = content
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect();
            return Ok((Zeroizing::new(bytes), None));
        }

        let Some(key_file) = key_file.filter(|f| !f.trim().is_empty()) else {
            debug!("Key file not provided");
            return Ok((Zeroizing::new(Vec::new()), None));
        };

        let path = expand_home(key_file, self.env.home_dir().as_deref());
        match fs::read(&path) {
            Ok(bytes) => {
                debug!("Read key from file: {}", path.display());
                Ok((Zeroizing::new(bytes), Some(path)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => match self.missing_key_file {
                MissingKeyFile::Unavailable => {
                    debug!("Key file: {} does not exist", path.display());
                    Ok((Zeroizing::new(Vec::new()), Some(path)))
                }
                MissingKeyFile::Error => Err(SignError::KeyUnavailable(format!(
                    "key file: {} not found",
                    path.display()
                ))),
            },
            Err(e) => Err(SignError::io(path, e)),
        }
    }
}
