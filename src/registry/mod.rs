//! Artifact registry collaborators: where subject checksums come from and
//! where evidence documents are stored.

pub mod filesystem;
pub mod http;
pub mod traits;

use crate::config::{RegistryConfig, RegistryType};
use crate::error::Result;

pub use filesystem::FilesystemRegistry;
pub use http::HttpRegistry;
pub use traits::{ArtifactRegistry, EvidenceUpload, FileInfo};

/// Build the registry described by `config`.
pub fn create_registry(config: &RegistryConfig) -> Result<Box<dyn ArtifactRegistry>> {
    match config.registry_type {
        RegistryType::LocalFs => Ok(Box::new(FilesystemRegistry::new(&config.url)?)),
        RegistryType::Http => Ok(Box::new(HttpRegistry::new(
            &config.url,
            config.token.clone(),
        )?)),
    }
}
