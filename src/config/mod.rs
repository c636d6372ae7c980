//! Layered signing configuration
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. User config (~/.config/artifact-sign/config.toml)
//! 3. Project config (.artifact-sign.toml)
//! 4. CLI flags
//!
//! Server records (key id, passphrase, key file per server id) live in a
//! separate settings file, see [`SettingsStore`].

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::{BuiltinDefaults, DEFAULT_KEY_FILE};
pub use effective::{
    user_config_path, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, KeyConfig,
    SignConfig, PROJECT_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers};
pub use settings::{ServerRecord, SettingsStore, TomlSettingsStore};
