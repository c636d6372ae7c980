//! Signature file naming

use serde::Serialize;
use std::path::PathBuf;

/// Suffix appended to the signed file's extension
pub const SIGNATURE_EXTENSION: &str = "asc";

/// How signature file names are built:
/// `<artifactId>[-<version>][-<classifier>].<extension>.asc`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamingPolicy {
    /// Insert the version segment when the artifact has one
    pub include_version: bool,
}

impl NamingPolicy {
    pub fn new(include_version: bool) -> Self {
        Self { include_version }
    }

    pub fn signature_file_name(
        &self,
        artifact_id: &str,
        version: Option<&str>,
        classifier: Option<&str>,
        extension: &str,
    ) -> String {
        let mut name = artifact_id.to_string();

        if self.include_version {
            if let Some(version) = version.filter(|v| !v.is_empty()) {
                name.push('-');
                name.push_str(version);
            }
        }

        if let Some(classifier) = classifier.filter(|c| !c.is_empty()) {
            name.push('-');
            name.push_str(classifier);
        }

        format!("{}.{}.{}", name, extension, SIGNATURE_EXTENSION)
    }
}

/// One produced signature file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureResult {
    pub classifier: Option<String>,

    /// Extension of the signature file, `<original-extension>.asc`
    pub extension: String,

    pub file: PathBuf,
}

impl SignatureResult {
    pub fn new(classifier: Option<String>, original_extension: &str, file: PathBuf) -> Self {
        Self {
            classifier,
            extension: format!("{}.{}", original_extension, SIGNATURE_EXTENSION),
            file,
        }
    }
}
