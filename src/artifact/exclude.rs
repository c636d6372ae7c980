//! Exclusion rules for artifact files
//!
//! Artifacts whose file path matches one of the configured globs are not
//! signed.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Errors for exclusion rules
#[derive(Debug, thiserror::Error)]
pub enum ExcludeError {
    #[error("Glob pattern error: {0}")]
    GlobError(#[from] globset::Error),
}

/// Exclusion rules for filtering artifact files
#[derive(Debug, Clone)]
pub struct ExcludeRules {
    glob_set: GlobSet,
    patterns: Vec<String>,
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self::none()
    }
}

impl ExcludeRules {
    /// Rules that exclude nothing
    pub fn none() -> Self {
        Self {
            glob_set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Compile `patterns`; blank entries are ignored
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ExcludeError> {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();

        for pattern in patterns.iter().map(|p| p.as_ref().trim()) {
            if !pattern.is_empty() {
                builder.add(Glob::new(pattern)?);
                kept.push(pattern.to_string());
            }
        }

        Ok(Self {
            glob_set: builder.build()?,
            patterns: kept,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.glob_set.is_match(path_str.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_excludes_nothing() {
        let rules = ExcludeRules::none();
        assert!(!rules.is_excluded(Path::new("target/app.jar")));
        assert!(rules.patterns().is_empty());
    }

    #[test]
    fn test_patterns_match_paths() {
        let rules = ExcludeRules::new(&["**/*.pom", "target/docs/**"]).unwrap();

        assert!(rules.is_excluded(Path::new("target/app-1.0.pom")));
        assert!(rules.is_excluded(Path::new("/work/project/target/app.pom")));
        assert!(rules.is_excluded(Path::new("target/docs/index.html")));
        assert!(!rules.is_excluded(Path::new("target/app-1.0.jar")));
    }

    #[test]
    fn test_blank_patterns_ignored() {
        let rules = ExcludeRules::new(&["", "  ", "*.zip"]).unwrap();
        assert_eq!(rules.patterns(), &["*.zip".to_string()]);
        assert!(rules.is_excluded(Path::new("dist.zip")));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = ExcludeRules::new(&["target/[unclosed"]).unwrap_err();
        assert!(err.to_string().contains("Glob pattern error"));
    }
}
