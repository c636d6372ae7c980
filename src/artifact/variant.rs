//! Source artifacts, their signable variants and the fan-out capability

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{SignError, SignResult};

/// A build output to be signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArtifact {
    pub artifact_id: String,
    pub version: Option<String>,
    pub classifier: Option<String>,
    pub extension: String,
    /// File holding the content, `None` when the build produced none
    pub file: Option<PathBuf>,
}

impl SourceArtifact {
    pub fn new(artifact_id: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            version: None,
            classifier: None,
            extension: extension.into(),
            file: None,
        }
    }

    /// Artifact backed by `path`, extension taken from the file name
    pub fn from_file(artifact_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(artifact_id, extension).with_file(path)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// File of the artifact, or [`SignError::ArtifactWithoutFile`]
    pub fn require_file(&self) -> SignResult<&Path> {
        self.file
            .as_deref()
            .ok_or_else(|| SignError::ArtifactWithoutFile(self.to_string()))
    }
}

impl fmt::Display for SourceArtifact {
    /// `id:extension[:classifier][:version]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.artifact_id, self.extension)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        if let Some(version) = &self.version {
            write!(f, ":{}", version)?;
        }
        Ok(())
    }
}

/// Where a variant's bytes come from
pub enum ContentSource {
    File(PathBuf),
    Bytes(Vec<u8>),
    Reader(Box<dyn Read + Send>),
}

impl ContentSource {
    pub fn open(self) -> io::Result<Box<dyn Read + Send>> {
        Ok(match self {
            ContentSource::File(path) => Box::new(File::open(path)?),
            ContentSource::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            ContentSource::Reader(reader) => reader,
        })
    }

    /// Path for error messages
    pub fn describe(&self) -> PathBuf {
        match self {
            ContentSource::File(path) => path.clone(),
            ContentSource::Bytes(_) => PathBuf::from("<memory>"),
            ContentSource::Reader(_) => PathBuf::from("<stream>"),
        }
    }
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ContentSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            ContentSource::Reader(_) => write!(f, "Reader"),
        }
    }
}

/// One physical output to sign
#[derive(Debug)]
pub struct ArtifactVariant {
    pub artifact_id: String,
    pub classifier: Option<String>,
    pub extension: String,
    pub content: ContentSource,
}

impl ArtifactVariant {
    pub fn new(
        artifact_id: impl Into<String>,
        classifier: Option<String>,
        extension: impl Into<String>,
        content: ContentSource,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            classifier,
            extension: extension.into(),
            content,
        }
    }

    /// The source artifact itself as its only variant
    pub fn identity(artifact: &SourceArtifact) -> SignResult<Self> {
        let file = artifact.require_file()?;
        Ok(Self::new(
            artifact.artifact_id.clone(),
            artifact.classifier.clone(),
            artifact.extension.clone(),
            ContentSource::File(file.to_path_buf()),
        ))
    }
}

/// Derived variants of a source artifact.
///
/// An empty list means the source artifact is signed as is.
pub trait VariantTransformer: Send + Sync {
    fn variants_for(&self, artifact: &SourceArtifact) -> anyhow::Result<Vec<ArtifactVariant>>;
}

impl<F> VariantTransformer for F
where
    F: Fn(&SourceArtifact) -> anyhow::Result<Vec<ArtifactVariant>> + Send + Sync,
{
    fn variants_for(&self, artifact: &SourceArtifact) -> anyhow::Result<Vec<ArtifactVariant>> {
        self(artifact)
    }
}

/// Transformer that never derives anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransform;

impl VariantTransformer for NoTransform {
    fn variants_for(&self, _artifact: &SourceArtifact) -> anyhow::Result<Vec<ArtifactVariant>> {
        Ok(Vec::new())
    }
}
