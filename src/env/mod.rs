//! Environment variable access
//!
//! All lookups of process environment go through an [`EnvSource`], so
//! tests can substitute a map instead of mutating the real environment.
//!
//! Values that are empty or the literal text `null` are treated as unset;
//! some invoking tools export unset properties that way.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;
use zeroize::Zeroizing;

/// Key id override (hex)
pub const SIGN_KEY_ID_ENV: &str = "SIGN_KEY_ID";

/// Literal ASCII-armored key content
pub const SIGN_KEY_ENV: &str = "SIGN_KEY";

/// Passphrase override
pub const SIGN_KEY_PASS_ENV: &str = "SIGN_KEY_PASS";

/// Raw access to environment variables
pub trait EnvSource: Send + Sync {
    /// Value of `name` exactly as set, or `None`
    fn raw(&self, name: &str) -> Option<String>;
}

/// Reads the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn raw(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed set of variables
#[derive(Debug, Default, Clone)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }
}

impl EnvSource for MapEnv {
    fn raw(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Filtered view over an [`EnvSource`]
pub struct Environment {
    source: Box<dyn EnvSource>,
}

impl Environment {
    pub fn new(source: impl EnvSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Environment backed by the running process
    pub fn process() -> Self {
        Self::new(ProcessEnv)
    }

    /// Trimmed value of `name`; empty and `"null"` count as unset
    pub fn get(&self, name: &str) -> Option<String> {
        self.get_secret(name).map(|v| v.to_string())
    }

    /// Like [`Environment::get`], for values that must be wiped after use
    pub fn get_secret(&self, name: &str) -> Option<Zeroizing<String>> {
        let value = self
            .source
            .raw(name)
            .map(Zeroizing::new)
            .map(|raw| Zeroizing::new(raw.trim().to_string()))
            .filter(|v| !v.is_empty() && v.as_str() != "null");

        if value.is_some() {
            debug!("Retrieved {} configuration from environment variable", name);
        } else {
            debug!("No {} set as environment variable", name);
        }

        value
    }

    /// Home directory of the current user, if known
    pub fn home_dir(&self) -> Option<PathBuf> {
        ["HOME", "USERPROFILE"]
            .iter()
            .filter_map(|name| self.source.raw(name))
            .find(|v| !v.is_empty())
            .map(PathBuf::from)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::process()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment").finish_non_exhaustive()
    }
}
