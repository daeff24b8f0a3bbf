//! # Evidence CLI
//!
//! Supply-chain evidence manager
//!
//! A command-line tool and library for creating and verifying signed evidence
//! about artifacts in an artifact registry. Evidence is an in-toto statement
//! wrapped in a DSSE envelope and signed with ECDSA, RSA-PSS or Ed25519 keys.
//! Keyless Sigstore bundles are verified against an explicitly configured
//! Sigstore trusted root.
//!
//! ## Quick Start
//!
//! Create evidence for an artifact in a local registry:
//! ```bash
//! evidence-cli create \
//!     --predicate=test-results.json \
//!     --predicate-type=https://in-toto.io/attestation/test-result/v0.1 \
//!     --key=private.pem \
//!     --subject-repo-path=generic-local/app.bin \
//!     --registry-url=./evidence-store
//! ```
//!
//! Verify it:
//! ```bash
//! evidence-cli verify --subject-path=generic-local/app.bin --public-key=public.pem
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod evidence;
pub mod hash;
pub mod in_toto;
pub mod registry;
pub mod signing;
pub mod sigstore;
#[cfg(test)]
mod tests;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};

/// Initialize logging for the CLI
///
/// # Examples
///
/// ```
/// use evidence_cli::init_logging;
///
/// // Fails if a logger is already installed
/// let result = init_logging();
/// assert!(result.is_ok() || result.is_err());
/// ```
pub fn init_logging() -> Result<()> {
    env_logger::try_init().map_err(|e| Error::InitializationError(e.to_string()))
}

pub use evidence::{EvidenceVerifier, VerificationResult};
pub use registry::ArtifactRegistry;
