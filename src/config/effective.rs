//! Effective configuration with full provenance
//!
//! The merged configuration is kept twice: as a typed [`SignConfig`] with
//! the real values, and as a JSON view with secrets redacted, suitable for
//! printing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use crate::artifact::ExcludeRules;
use crate::env::Environment;
use crate::error::SignError;
use crate::key::{KeyMaterialRequest, MissingKeyFile, Passphrase};

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "artifact-sign/effective_config@1";

/// Project-level config file, relative to the working directory
pub const PROJECT_CONFIG_FILE: &str = ".artifact-sign.toml";

/// Keys that contain secrets and should be redacted
const SECRET_KEYS: &[&str] = &["pass", "secret", "token", "private_key", "credential"];

/// Per-user config file location
pub fn user_config_path(env: &Environment) -> Option<PathBuf> {
    env.home_dir()
        .map(|home| home.join(".config").join("artifact-sign").join("config.toml"))
}

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    Project,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// `[key]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Settings-store server id; when set, id/pass/file come from that record
    pub server_id: Option<String>,

    /// Key id as hex
    pub id: Option<String>,

    pub pass: Option<Passphrase>,

    /// Path to the secret key, `~/` is expanded
    pub file: Option<String>,
}

impl KeyConfig {
    /// Request for the key material resolver
    pub fn to_request(&self) -> KeyMaterialRequest {
        KeyMaterialRequest {
            server_id: self.server_id.clone(),
            key_id: self.id.clone(),
            passphrase: self.pass.clone(),
            key_file: self.file.clone(),
        }
    }
}

/// Typed signing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignConfig {
    /// Skip signing entirely
    pub skip: bool,

    /// Treat a missing key as a skip rather than an error
    pub skip_no_key: bool,

    pub missing_key_file: MissingKeyFile,

    /// Put the version segment into signature file names
    pub include_version: bool,

    /// Directory receiving signature files
    pub output_dir: PathBuf,

    /// Glob patterns of artifact files that are not signed
    pub exclude: Vec<String>,

    /// Signing threads, 0 = CPU count
    pub workers: usize,

    pub key: KeyConfig,
}

impl Default for SignConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            skip: defaults.skip,
            skip_no_key: defaults.skip_no_key,
            missing_key_file: defaults.missing_key_file,
            include_version: defaults.include_version,
            output_dir: PathBuf::from(defaults.output_dir),
            exclude: Vec::new(),
            workers: defaults.workers,
            key: KeyConfig {
                file: Some(defaults.key_file),
                ..KeyConfig::default()
            },
        }
    }
}

/// Effective configuration with full provenance
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,

    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// The merged configuration object, secrets redacted
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,

    /// Redacted key paths
    pub redactions: Vec<String>,

    #[serde(skip)]
    settings: SignConfig,
}

impl EffectiveConfig {
    /// Build effective config from layers; absent files are skipped
    pub fn build(
        user_config_path: Option<&Path>,
        project_config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        let files = [
            (ConfigOrigin::User, user_config_path),
            (ConfigOrigin::Project, project_config_path),
        ];
        for (origin, path) in files {
            let Some(path) = path.filter(|p| p.exists()) else {
                continue;
            };
            let (value, digest) = load_toml_file(path)?;
            tracing::debug!("Loaded {:?} config from {}", origin, path.display());
            layers.push(value);
            sources.push(ConfigSource {
                origin,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let mut merged = merge_layers(layers);

        let settings: SignConfig = serde_json::from_value(merged.clone())
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))?;
        validate_config(&settings)?;

        let redactions = redact_secrets(&mut merged);

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merged,
            sources,
            redactions,
            settings,
        })
    }

    /// Typed configuration with unredacted values
    pub fn settings(&self) -> &SignConfig {
        &self.settings
    }

    /// Serialize the redacted view to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes).map_err(|e| {
        ConfigError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e))
    })?;

    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

    Ok((toml_to_json(toml_value), digest))
}

pub(crate) fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Redact secrets in place, returning the list of redacted paths
fn redact_secrets(value: &mut Value) -> Vec<String> {
    let mut redactions = Vec::new();
    redact_recursive(value, String::new(), &mut redactions);
    redactions
}

fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let current_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };

                let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));

                if is_secret && !val.is_null() && !val.is_object() && !val.is_array() {
                    *val = Value::String("[REDACTED]".to_string());
                    redactions.push(current_path);
                } else {
                    redact_recursive(val, current_path, redactions);
                }
            }
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter_mut().enumerate() {
                redact_recursive(val, format!("{}[{}]", path, i), redactions);
            }
        }
        _ => {}
    }
}

fn validate_config(config: &SignConfig) -> Result<(), ConfigError> {
    if config.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "output_dir must not be empty".to_string(),
        ));
    }

    ExcludeRules::new(&config.exclude)
        .map_err(|e| ConfigError::ValidationError(format!("exclude: {}", e)))?;

    Ok(())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for SignError {
    fn from(err: ConfigError) -> Self {
        SignError::Config(err.to_string())
    }
}
