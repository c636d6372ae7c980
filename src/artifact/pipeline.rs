//! Per-artifact signing
//!
//! Each source artifact is fanned out through the [`VariantTransformer`];
//! when that yields nothing the artifact itself is signed. Signatures of
//! one artifact are produced in transformer order. Distinct artifacts are
//! independent and [`ArtifactSigningPipeline::sign_all`] spreads them over
//! worker threads, stopping at the first failure.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use tracing::{debug, info};

use super::exclude::ExcludeRules;
use super::naming::{NamingPolicy, SignatureResult};
use super::variant::{ArtifactVariant, NoTransform, SourceArtifact, VariantTransformer};
use crate::error::{SignError, SignResult};
use crate::signer::SignatureEngine;

/// Drives the signature engine once per artifact variant
pub struct ArtifactSigningPipeline<'a> {
    engine: SignatureEngine<'a>,
    transformer: &'a dyn VariantTransformer,
    naming: NamingPolicy,
    exclude: ExcludeRules,
    output_dir: PathBuf,
    workers: usize,
}

impl<'a> ArtifactSigningPipeline<'a> {
    pub fn new(engine: SignatureEngine<'a>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            transformer: &NoTransform,
            naming: NamingPolicy::default(),
            exclude: ExcludeRules::none(),
            output_dir: output_dir.into(),
            workers: 0,
        }
    }

    pub fn with_transformer(mut self, transformer: &'a dyn VariantTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_naming(mut self, naming: NamingPolicy) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_exclude(mut self, exclude: ExcludeRules) -> Self {
        self.exclude = exclude;
        self
    }

    /// Worker threads for [`Self::sign_all`], 0 = CPU count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Sign one source artifact, or each of its derived variants
    pub fn sign_artifact(&self, artifact: &SourceArtifact) -> SignResult<Vec<SignatureResult>> {
        let file = artifact.require_file()?;

        if self.exclude.is_excluded(file) {
            debug!("Artifact {} excluded from signing", artifact);
            return Ok(Vec::new());
        }

        let mut variants = self
            .transformer
            .variants_for(artifact)
            .map_err(|source| SignError::Transform {
                artifact: artifact.to_string(),
                source,
            })?;
        if variants.is_empty() {
            variants.push(ArtifactVariant::identity(artifact)?);
        }

        variants
            .into_iter()
            .map(|variant| self.sign_variant(artifact, variant))
            .collect()
    }

    fn sign_variant(
        &self,
        artifact: &SourceArtifact,
        variant: ArtifactVariant,
    ) -> SignResult<SignatureResult> {
        let name = self.naming.signature_file_name(
            &variant.artifact_id,
            artifact.version.as_deref(),
            variant.classifier.as_deref(),
            &variant.extension,
        );
        let output = self.signature_path(artifact, &name)?;

        let source = variant.content.describe();
        info!("Signing {} ({})", source.display(), artifact);
        let content = variant
            .content
            .open()
            .map_err(|e| SignError::io(source, e))?;

        self.engine.sign(content, &output)?;
        info!("Signature {} created", output.display());

        Ok(SignatureResult::new(
            variant.classifier,
            &variant.extension,
            output,
        ))
    }

    /// `name` under the output directory; it must be one plain file name
    fn signature_path(&self, artifact: &SourceArtifact, name: &str) -> SignResult<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None)
                if part == OsStr::new(name) && !name.contains(['/', '\\']) =>
            {
                Ok(self.output_dir.join(name))
            }
            _ => Err(SignError::Config(format!(
                "signature name {:?} of {} is not a plain file name",
                name, artifact
            ))),
        }
    }

    /// Sign many artifacts in parallel.
    ///
    /// Results are returned in input order, each artifact's signatures in
    /// variant order. The first failure stops the remaining work; signatures
    /// already written stay in place.
    pub fn sign_all(&self, artifacts: &[SourceArtifact]) -> SignResult<Vec<SignatureResult>> {
        let workers = self.worker_count(artifacts.len());
        if workers <= 1 {
            let mut results = Vec::new();
            for artifact in artifacts {
                results.extend(self.sign_artifact(artifact)?);
            }
            return Ok(results);
        }

        let next = &AtomicUsize::new(0);
        let stop = &AtomicBool::new(false);

        let outcomes = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        while !stop.load(Ordering::Relaxed) {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(artifact) = artifacts.get(index) else {
                                break;
                            };
                            match self.sign_artifact(artifact) {
                                Ok(results) => done.push((index, results)),
                                Err(e) => {
                                    stop.store(true, Ordering::Relaxed);
                                    return Err((index, e));
                                }
                            }
                        }
                        Ok(done)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(outcome) => outcome,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect::<Vec<_>>()
        });

        let mut signed = Vec::with_capacity(artifacts.len());
        let mut failure: Option<(usize, SignError)> = None;
        for outcome in outcomes {
            match outcome {
                Ok(done) => signed.extend(done),
                Err((index, e)) => {
                    if failure.as_ref().map_or(true, |(first, _)| index < *first) {
                        failure = Some((index, e));
                    }
                }
            }
        }
        if let Some((_, e)) = failure {
            return Err(e);
        }

        signed.sort_by_key(|(index, _)| *index);
        Ok(signed.into_iter().flat_map(|(_, results)| results).collect())
    }

    fn worker_count(&self, jobs: usize) -> usize {
        let workers = match self.workers {
            0 => thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };
        workers.min(jobs)
    }
}
