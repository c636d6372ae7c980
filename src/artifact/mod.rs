//! Artifact signing pipeline
//!
//! - [`SourceArtifact`] / [`ArtifactVariant`]: what gets signed
//! - [`VariantTransformer`]: optional fan-out of one artifact into derived
//!   variants
//! - [`NamingPolicy`]: signature file names
//! - [`ArtifactSigningPipeline`]: drives the signature engine per variant

mod exclude;
mod naming;
mod pipeline;
mod variant;

pub use exclude::{ExcludeError, ExcludeRules};
pub use naming::{NamingPolicy, SignatureResult, SIGNATURE_EXTENSION};
pub use pipeline::ArtifactSigningPipeline;
pub use variant::{ArtifactVariant, ContentSource, NoTransform, SourceArtifact, VariantTransformer};
