//! Signing key handling
//!
//! - [`KeyMaterialResolver`]: picks key id, passphrase and key bytes from
//!   environment, configuration and the settings store
//! - [`KeyRingCollection`]: parsed key rings with master/subkey lookups
//! - [`KeyRingLoader`]: selects, validates and unlocks one signing key

mod loader;
mod material;
mod ring;

pub use loader::{format_fingerprint, format_key_id, KeyRingLoader, LoadedSigningKey};
pub use material::{
    expand_home, parse_key_id, KeyMaterialRequest, KeyMaterialResolver, MissingKeyFile,
    Passphrase, PassphraseDecryptor, ResolvedKeyMaterial,
};
pub use ring::{KeyEntry, KeyRingCollection, PrivateMaterial};
