//! Tool configuration, loaded from YAML or JSON and overridden by CLI flags.
//!
//! ```yaml
//! registry:
//!   registry_type: http
//!   url: https://registry.example.test
//!   token: "..."
//! tuf_root_file: ./sigstore-tuf-root.json
//! tuf_url: https://tuf-repo-cdn.sigstore.dev
//! tuf_cache_dir: ~/.cache/evidence-cli/tuf
//! provider_id: ci-pipeline
//! encoding: json
//! show_progress: false
//! ```

use crate::error::{Error, Result};
use crate::sigstore::tuf::repository_url;
use crate::sigstore::{TrustRootSource, TufConfig};
use crate::utils::read_file_bytes;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_REGISTRY_PATH: &str = "./evidence-store";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryType {
    #[default]
    LocalFs,
    Http,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputEncoding {
    #[default]
    Json,
    Cbor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub registry_type: RegistryType,
    /// Directory (local-fs) or base URL (http)
    pub url: String,
    /// Bearer token for the http registry
    pub token: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_type: RegistryType::LocalFs,
            url: DEFAULT_REGISTRY_PATH.to_string(),
            token: None,
        }
    }
}

/// CLI configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    /// Local Sigstore `trusted_root.json`; overrides TUF
    pub trusted_root_file: Option<PathBuf>,
    /// Bootstrap `root.json` for the Sigstore TUF repository
    pub tuf_root_file: Option<PathBuf>,
    /// TUF repository URL; Sigstore production when unset
    pub tuf_url: Option<String>,
    /// Cache for verified TUF metadata
    pub tuf_cache_dir: Option<PathBuf>,
    /// Recorded with every uploaded evidence document
    pub provider_id: Option<String>,
    pub encoding: OutputEncoding,
    /// Whether to show progress bars
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            trusted_root_file: None,
            tuf_root_file: None,
            tuf_url: None,
            tuf_cache_dir: None,
            provider_id: None,
            encoding: OutputEncoding::Json,
            show_progress: true,
        }
    }
}

impl Config {
    /// Load a configuration file; `.yaml`/`.yml` is read as YAML, anything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = read_file_bytes(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let config: Config = if is_yaml {
            serde_yaml::from_slice(&data)
                .map_err(|e| Error::Config(format!("invalid YAML in {}: {e}", path.display())))?
        } else {
            serde_json::from_slice(&data)
                .map_err(|e| Error::Config(format!("invalid JSON in {}: {e}", path.display())))?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry.url.trim().is_empty() {
            return Err(Error::Config("registry url cannot be empty".to_string()));
        }
        self.trust_root_source().map(|_| ())
    }

    /// The configured trusted root, if any.
    ///
    /// A local `trusted_root_file` wins over TUF. TUF needs a bootstrap
    /// `tuf_root_file`, and its repository URL must be HTTPS.
    pub fn trust_root_source(&self) -> Result<Option<TrustRootSource>> {
        if let Some(url) = &self.tuf_url {
            repository_url(url).map_err(|e| Error::Config(format!("tuf_url: {e}")))?;
        }

        if let Some(path) = &self.trusted_root_file {
            return Ok(Some(TrustRootSource::File(path.clone())));
        }

        match (&self.tuf_root_file, &self.tuf_url) {
            (Some(root), url) => {
                let mut tuf = TufConfig::new(root);
                if let Some(url) = url {
                    tuf = tuf.with_url(url);
                }
                if let Some(cache_dir) = &self.tuf_cache_dir {
                    tuf = tuf.with_cache_dir(cache_dir);
                }
                Ok(Some(TrustRootSource::Tuf(tuf)))
            }
            (None, Some(_)) => Err(Error::Config(
                "tuf_url requires tuf_root_file to bootstrap trust".to_string(),
            )),
            (None, None) => Ok(None),
        }
    }
}
