//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

use crate::key::MissingKeyFile;

/// Default location of the armored secret key
pub const DEFAULT_KEY_FILE: &str = "~/.config/artifact-sign/sign-key.asc";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Skip signing entirely (default: false)
    pub skip: bool,

    /// Skip instead of failing when no key is available (default: true)
    pub skip_no_key: bool,

    /// What a configured but absent key file means (default: unavailable)
    pub missing_key_file: MissingKeyFile,

    /// Put the version segment into signature file names (default: false)
    pub include_version: bool,

    /// Directory receiving signature files (default: "target")
    pub output_dir: String,

    /// Worker threads for signing, 0 = CPU count
    pub workers: usize,

    /// Key file path (default: ~/.config/artifact-sign/sign-key.asc)
    pub key_file: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            skip: false,
            skip_no_key: true,
            missing_key_file: MissingKeyFile::Unavailable,
            include_version: false,
            output_dir: "target".to_string(),
            workers: 0,
            key_file: DEFAULT_KEY_FILE.to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "skip": self.skip,
            "skip_no_key": self.skip_no_key,
            "missing_key_file": self.missing_key_file,
            "include_version": self.include_version,
            "output_dir": self.output_dir,
            "exclude": [],
            "workers": self.workers,
            "key": {
                "file": self.key_file
            }
        })
    }
}
