//! Artifact Sign - detached OpenPGP signatures for build outputs
//!
//! Resolves a secret signing key from environment, configuration and a
//! settings store, validates it, and writes an ASCII-armored detached
//! signature next to every build artifact (or every variant a transformer
//! derives from it).

pub mod artifact;
pub mod config;
pub mod env;
pub mod error;
pub mod key;
pub mod session;
pub mod signer;

pub use artifact::{
    ArtifactSigningPipeline, ArtifactVariant, ContentSource, NamingPolicy, NoTransform,
    SignatureResult, SourceArtifact, VariantTransformer,
};
pub use config::{EffectiveConfig, SignConfig};
pub use env::Environment;
pub use error::{KeyRole, SignError, SignResult};
pub use key::{
    KeyMaterialRequest, KeyMaterialResolver, KeyRingLoader, LoadedSigningKey, Passphrase,
    ResolvedKeyMaterial,
};
pub use session::{SessionOutcome, SigningSession, SkipReason};
pub use signer::SignatureEngine;
