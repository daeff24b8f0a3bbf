//! Resolving which artifact a piece of evidence is about.
//!
//! The subject can come from a registry path, from an explicit digest, or from
//! the statement inside a Sigstore bundle. Combinations are checked for
//! consistency before anything is signed or uploaded.

use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use crate::registry::ArtifactRegistry;
use crate::sigstore::{self, SigstoreBundle};
use log::debug;

/// The subject inputs a caller supplied.
#[derive(Clone, Debug, Default)]
pub struct SubjectRequest<'a> {
    pub repo_path: Option<&'a str>,
    pub sha256: Option<&'a str>,
    pub bundle: Option<&'a SigstoreBundle>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSubject {
    pub name: String,
    /// Lowercase hex sha256.
    pub sha256: String,
}

pub struct SubjectResolver<'a> {
    registry: Option<&'a dyn ArtifactRegistry>,
}

impl<'a> SubjectResolver<'a> {
    pub fn new(registry: Option<&'a dyn ArtifactRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve the subject name and digest.
    ///
    /// # Errors
    ///
    /// - `Validation` if both a bundle and an explicit digest are given
    /// - `SubjectResolutionFailed` if the subject cannot be determined, the
    ///   registry lookup fails, or the registry digest disagrees with the given one
    ///
    /// A bundle digest is checked against the registry artifact at
    /// `repo_path` when both are given. Without a registry, a path plus a
    /// digest is taken as given.
    pub fn resolve(&self, request: &SubjectRequest<'_>) -> Result<ResolvedSubject> {
        if request.bundle.is_some() && request.sha256.is_some() {
            return Err(Error::Validation(
                "a subject digest cannot be combined with a Sigstore bundle".to_string(),
            ));
        }

        if let Some(bundle) = request.bundle {
            let (name, sha256) = sigstore::extract_subject_from_bundle(bundle)?;
            if !sha256.is_empty() {
                if let Some(repo_path) = request.repo_path {
                    debug!("Checking bundle subject '{name}' against '{repo_path}'");
                    return self.lookup(repo_path, Some(sha256.as_str()));
                }
                debug!("Subject '{name}' taken from Sigstore bundle");
                return Ok(ResolvedSubject {
                    name,
                    sha256: sha256.to_ascii_lowercase(),
                });
            }

            let repo_path = request.repo_path.ok_or_else(|| {
                Error::SubjectResolutionFailed(format!(
                    "bundle subject '{name}' has no sha256 and no registry path was given"
                ))
            })?;
            return self.lookup(repo_path, None);
        }

        match request.repo_path {
            Some(repo_path) => self.lookup(repo_path, request.sha256),
            None => Err(Error::SubjectResolutionFailed(
                "a registry path or a Sigstore bundle is required".to_string(),
            )),
        }
    }

    fn lookup(&self, repo_path: &str, expected_sha256: Option<&str>) -> Result<ResolvedSubject> {
        if let Some(expected) = expected_sha256 {
            if !hash::is_valid_digest(expected, &HashAlgorithm::Sha256) {
                return Err(Error::SubjectResolutionFailed(format!(
                    "'{expected}' is not a valid sha256 digest"
                )));
            }
        }

        let registry = match (self.registry, expected_sha256) {
            (Some(registry), _) => registry,
            (None, Some(expected)) => {
                debug!("No registry configured, using the given digest for '{repo_path}'");
                return Ok(ResolvedSubject {
                    name: repo_path.trim_start_matches('/').to_string(),
                    sha256: expected.to_ascii_lowercase(),
                });
            }
            (None, None) => {
                return Err(Error::SubjectResolutionFailed(format!(
                    "no registry configured to look up '{repo_path}'"
                )));
            }
        };

        let info = registry.file_info(repo_path).map_err(|e| {
            Error::SubjectResolutionFailed(format!("lookup of '{repo_path}' failed: {e}"))
        })?;

        if let Some(expected) = expected_sha256 {
            if !hash::digests_equal(&info.sha256, expected) {
                return Err(Error::SubjectResolutionFailed(format!(
                    "sha256 mismatch for '{repo_path}': registry has {}, expected {expected}",
                    info.sha256
                )));
            }
        }

        Ok(ResolvedSubject {
            name: info.path,
            sha256: info.sha256.to_ascii_lowercase(),
        })
    }
}
