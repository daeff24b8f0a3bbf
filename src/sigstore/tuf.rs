//! TUF client for the Sigstore trusted root.
//!
//! `trusted_root.json` is fetched as a TUF target. Every metadata role is
//! verified by `tough`, starting from a bootstrap `root.json` the operator
//! supplies. Signatures, thresholds, versions and expiry are all checked
//! before the target is read.
//!
//! ```no_run
//! use evidence_cli::sigstore::{TrustedRoot, TufConfig};
//!
//! let config = TufConfig::new("sigstore-root.json").with_cache_dir("/var/cache/evidence/tuf");
//! let root = TrustedRoot::from_tuf(&config).unwrap();
//! println!("{} transparency log(s)", root.tlogs.len());
//! ```

use crate::error::{Error, Result};
use crate::utils::read_file_bytes;

use log::{debug, info};
use reqwest::Url;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tough::{HttpTransport, IntoVec, RepositoryLoader, TargetName};

use super::trust_root::TrustedRoot;

/// Sigstore production TUF repository.
pub const DEFAULT_TUF_URL: &str = "https://tuf-repo-cdn.sigstore.dev";

/// Name of the trusted root target in the Sigstore TUF repository.
pub const TRUSTED_ROOT_TARGET: &str = "trusted_root.json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TufConfig {
    /// Repository base URL; metadata lives at its root, targets under `targets/`.
    pub url: String,
    /// Bootstrap `root.json` that anchors trust in the repository.
    pub root: PathBuf,
    /// Where verified metadata is cached between runs.
    pub cache_dir: Option<PathBuf>,
}

impl TufConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            url: DEFAULT_TUF_URL.to_string(),
            root: root.into(),
            cache_dir: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(path.into());
        self
    }
}

fn tuf_error(reason: impl Into<String>) -> Error {
    Error::FailedToLoadTrustRoot(reason.into())
}

/// Parse the repository URL; only HTTPS repositories are accepted.
pub(crate) fn repository_url(url: &str) -> Result<Url> {
    let mut parsed =
        Url::parse(url).map_err(|e| tuf_error(format!("invalid TUF repository URL '{url}': {e}")))?;
    if parsed.scheme() != "https" {
        return Err(tuf_error(format!(
            "TUF repository URL must use https: {url}"
        )));
    }
    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}

fn bootstrap_root(path: &Path) -> Result<Vec<u8>> {
    let data = read_file_bytes(path)
        .map_err(|e| tuf_error(format!("cannot read TUF root {}: {e}", path.display())))?;

    let document: Value = serde_json::from_slice(&data)
        .map_err(|e| tuf_error(format!("TUF root {} is not JSON: {e}", path.display())))?;
    if document["signed"]["_type"] != "root" {
        return Err(tuf_error(format!(
            "{} is not TUF root metadata",
            path.display()
        )));
    }

    Ok(data)
}

fn fetch_target(config: &TufConfig, target: &str) -> Result<Vec<u8>> {
    let metadata_url = repository_url(&config.url)?;
    let targets_url = metadata_url
        .join("targets/")
        .map_err(|e| tuf_error(format!("invalid TUF targets URL: {e}")))?;
    let root = bootstrap_root(&config.root)?;

    if let Some(cache_dir) = &config.cache_dir {
        std::fs::create_dir_all(cache_dir).map_err(|e| {
            tuf_error(format!(
                "cannot create TUF cache {}: {e}",
                cache_dir.display()
            ))
        })?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| tuf_error(format!("cannot start TUF client runtime: {e}")))?;

    info!("Loading TUF repository {metadata_url}");
    runtime.block_on(async {
        let mut loader = RepositoryLoader::new(&root, metadata_url, targets_url)
            .transport(HttpTransport::default());
        if let Some(cache_dir) = &config.cache_dir {
            loader = loader.datastore(cache_dir.clone());
        }

        let repository = loader
            .load()
            .await
            .map_err(|e| tuf_error(format!("TUF repository load failed: {e}")))?;
        debug!("TUF metadata verified");

        let name = TargetName::new(target)
            .map_err(|e| tuf_error(format!("invalid TUF target name '{target}': {e}")))?;
        let stream = repository
            .read_target(&name)
            .await
            .map_err(|e| tuf_error(format!("cannot read TUF target {target}: {e}")))?
            .ok_or_else(|| tuf_error(format!("TUF repository has no target {target}")))?;

        stream
            .into_vec()
            .await
            .map_err(|e| tuf_error(format!("cannot read TUF target {target}: {e}")))
    })
}

impl TrustedRoot {
    /// Fetch `trusted_root.json` through TUF.
    ///
    /// # Errors
    ///
    /// `FailedToLoadTrustRoot` for a non-HTTPS repository, an unreadable or
    /// non-root bootstrap file, any TUF verification failure, or a trusted
    /// root document that does not parse.
    pub fn from_tuf(config: &TufConfig) -> Result<Self> {
        let data = fetch_target(config, TRUSTED_ROOT_TARGET)?;
        Self::from_json(&data)
    }
}
