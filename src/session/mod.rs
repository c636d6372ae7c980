//! One signing execution end to end
//!
//! Resolves the key material once, loads the signing key once, then signs
//! every artifact with it. A missing key is either a skip or an error,
//! depending on `skip_no_key`.

use serde::Serialize;
use tracing::info;

use crate::artifact::{
    ArtifactSigningPipeline, ExcludeRules, NamingPolicy, NoTransform, SignatureResult,
    SourceArtifact, VariantTransformer,
};
use crate::config::{SettingsStore, SignConfig};
use crate::env::Environment;
use crate::error::{SignError, SignResult};
use crate::key::{
    KeyMaterialResolver, KeyRingLoader, LoadedSigningKey, PassphraseDecryptor,
    ResolvedKeyMaterial,
};
use crate::signer::SignatureEngine;

/// Why nothing was signed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// `skip` is set
    Disabled,
    /// No key material and `skip_no_key` is set
    NoKey,
}

/// Result of [`SigningSession::run`]
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Skipped { reason: SkipReason },
    Signed { signatures: Vec<SignatureResult> },
}

impl SessionOutcome {
    pub fn signatures(&self) -> &[SignatureResult] {
        match self {
            SessionOutcome::Signed { signatures } => signatures,
            SessionOutcome::Skipped { .. } => &[],
        }
    }
}

/// Signing execution over one configuration
pub struct SigningSession<'a> {
    config: &'a SignConfig,
    env: &'a Environment,
    settings: Option<&'a dyn SettingsStore>,
    decryptor: Option<&'a dyn PassphraseDecryptor>,
    transformer: &'a dyn VariantTransformer,
}

impl<'a> SigningSession<'a> {
    pub fn new(config: &'a SignConfig, env: &'a Environment) -> Self {
        Self {
            config,
            env,
            settings: None,
            decryptor: None,
            transformer: &NoTransform,
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

    pub fn with_transformer(mut self, transformer: &'a dyn VariantTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    fn resolve(&self) -> SignResult<ResolvedKeyMaterial> {
        let mut resolver =
            KeyMaterialResolver::new(self.env).missing_key_file(self.config.missing_key_file);
        if let Some(settings) = self.settings {
            resolver = resolver.with_settings(settings);
        }
        if let Some(decryptor) = self.decryptor {
            resolver = resolver.with_decryptor(decryptor);
        }
        resolver.resolve(&self.config.key.to_request())
    }

    /// Resolve and load the signing key; a missing key is an error here
    pub fn load_key(&self) -> SignResult<LoadedSigningKey> {
        let material = self.resolve()?;
        KeyRingLoader::new().load(&material)
    }

    /// Sign `artifacts`, or report why signing was skipped
    pub fn run(&self, artifacts: &[SourceArtifact]) -> SignResult<SessionOutcome> {
        if self.config.skip {
            info!("Sign is skipped");
            return Ok(SessionOutcome::Skipped {
                reason: SkipReason::Disabled,
            });
        }

        let material = self.resolve()?;
        if !material.is_key_available() {
            if self.config.skip_no_key {
                info!("No signing key available - sign is skipped");
                return Ok(SessionOutcome::Skipped {
                    reason: SkipReason::NoKey,
                });
            }
            return Err(material.unavailable_error());
        }

        let key = KeyRingLoader::new().load(&material)?;
        drop(material);

        let exclude = ExcludeRules::new(&self.config.exclude)
            .map_err(|e| SignError::Config(format!("exclude: {}", e)))?;

        let signatures = ArtifactSigningPipeline::new(
            SignatureEngine::new(&key),
            self.config.output_dir.clone(),
        )
        .with_transformer(self.transformer)
        .with_naming(NamingPolicy::new(self.config.include_version))
        .with_exclude(exclude)
        .with_workers(self.config.workers)
        .sign_all(artifacts)?;

        info!("{} signature(s) created", signatures.len());
        Ok(SessionOutcome::Signed { signatures })
    }
}
