//! Settings store with per-server key records
//!
//! A server record groups the key id (stored as the username), the
//! passphrase and the key file path under one identifier, so build
//! configuration can refer to a key without carrying its secrets.
//!
//! ```toml
//! [servers.release]
//! username = "0123456789ABCDEF"
//! passphrase = "..."
//! private_key = "~/.keys/release.asc"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::effective::ConfigError;
use crate::key::Passphrase;

/// Key-related fields of one server entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerRecord {
    /// Key id as hex
    pub username: Option<String>,

    pub passphrase: Option<Passphrase>,

    /// Path to the secret key file
    pub private_key: Option<String>,
}

/// Lookup of server records by id
pub trait SettingsStore: Send + Sync {
    fn server(&self, id: &str) -> Option<ServerRecord>;
}

impl SettingsStore for HashMap<String, ServerRecord> {
    fn server(&self, id: &str) -> Option<ServerRecord> {
        self.get(id).cloned()
    }
}

/// Settings store backed by a TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlSettingsStore {
    #[serde(default)]
    servers: HashMap<String, ServerRecord>,
}

impl TomlSettingsStore {
    /// Parse settings from TOML text
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl SettingsStore for TomlSettingsStore {
    fn server(&self, id: &str) -> Option<ServerRecord> {
        self.servers.server(id)
    }
}
