use crate::config::OutputEncoding;
use crate::error::{Error, Result};
use crate::evidence::MediaType;
use crate::evidence::subject::{ResolvedSubject, SubjectRequest, SubjectResolver};
use crate::in_toto::{self, StatementInput};
use crate::registry::{ArtifactRegistry, EvidenceUpload};
use crate::signing::{create_signers, load_key_from_source};
use crate::sigstore;
use crate::utils::read_file_bytes;

use chrono::Utc;
use log::{debug, info};
use serde_json::Value;
use std::path::PathBuf;

/// Everything needed to create one piece of evidence.
#[derive(Debug, Clone, Default)]
pub struct EvidenceCreationConfig {
    /// Predicate JSON file; not used with a Sigstore bundle.
    pub predicate: Option<PathBuf>,
    pub predicate_type: Option<String>,
    /// Private key path or literal.
    pub key: Option<String>,
    /// Overrides the key id recorded with the signature.
    pub key_alias: Option<String>,
    pub markdown: Option<PathBuf>,
    pub stage: Option<String>,
    pub subject_repo_path: Option<String>,
    pub subject_sha256: Option<String>,
    /// Pre-signed Sigstore bundle to store instead of a new envelope.
    pub sigstore_bundle: Option<PathBuf>,
    pub provider_id: Option<String>,
    pub created_by: String,
    /// Only return the document; nothing is uploaded.
    pub print: bool,
}

#[derive(Debug, Clone)]
pub struct CreatedEvidence {
    pub subject: ResolvedSubject,
    pub media_type: MediaType,
    /// The evidence document as JSON.
    pub document: Vec<u8>,
    /// Set when the document was uploaded.
    pub evidence_id: Option<String>,
}

/// Create evidence for a subject and upload it unless `print` is set or no
/// registry is available.
///
/// Every input is read and the document fully built and signed before the
/// registry is contacted, so a failure never leaves partial evidence behind.
pub fn create_evidence(
    config: &EvidenceCreationConfig,
    registry: Option<&dyn ArtifactRegistry>,
) -> Result<CreatedEvidence> {
    let resolver = SubjectResolver::new(registry);

    let (subject, media_type, document) = match &config.sigstore_bundle {
        Some(bundle_path) => {
            if config.predicate.is_some() || config.key.is_some() {
                return Err(Error::Validation(
                    "--predicate and --key cannot be used with a Sigstore bundle".to_string(),
                ));
            }
            if registry.is_some() && !config.print && config.subject_repo_path.is_none() {
                return Err(Error::Validation(
                    "storing a Sigstore bundle requires --subject-repo-path (or use --print)"
                        .to_string(),
                ));
            }

            let document = read_file_bytes(bundle_path).map_err(|e| {
                Error::BundleParseFailed(format!("cannot read {}: {e}", bundle_path.display()))
            })?;
            let bundle = sigstore::parse_bundle(&document)?;
            sigstore::extract_dsse_envelope(&bundle)?;

            let subject = resolver.resolve(&SubjectRequest {
                repo_path: config.subject_repo_path.as_deref(),
                sha256: config.subject_sha256.as_deref(),
                bundle: Some(&bundle),
            })?;
            (subject, MediaType::SigstoreBundle, document)
        }
        None => {
            let subject = resolver.resolve(&SubjectRequest {
                repo_path: config.subject_repo_path.as_deref(),
                sha256: config.subject_sha256.as_deref(),
                bundle: None,
            })?;
            let document = sign_statement(config, &subject)?;
            (subject, MediaType::SimpleDsse, document)
        }
    };

    let evidence_id = match registry {
        Some(registry) if !config.print => {
            let upload = EvidenceUpload {
                subject_uri: config
                    .subject_repo_path
                    .clone()
                    .ok_or_else(|| {
                        Error::Validation("storing evidence requires a registry path".to_string())
                    })?,
                dsse_file_raw: document.clone(),
                provider_id: config.provider_id.clone(),
            };
            let id = registry.upload_evidence(&upload)?;
            info!("Uploaded evidence {id} for '{}' to {}", upload.subject_uri, registry.base_uri());
            Some(id)
        }
        _ => None,
    };

    Ok(CreatedEvidence {
        subject,
        media_type,
        document,
        evidence_id,
    })
}

fn sign_statement(config: &EvidenceCreationConfig, subject: &ResolvedSubject) -> Result<Vec<u8>> {
    let predicate_path = config
        .predicate
        .as_ref()
        .ok_or_else(|| Error::Validation("a predicate file is required".to_string()))?;
    let predicate_type = config
        .predicate_type
        .as_ref()
        .ok_or_else(|| Error::Validation("a predicate type is required".to_string()))?;
    let key_source = config
        .key
        .as_deref()
        .ok_or_else(|| Error::Validation("a signing key is required".to_string()))?;

    let predicate = in_toto::read_predicate(predicate_path)?;
    let markdown = config
        .markdown
        .as_deref()
        .map(in_toto::read_markdown)
        .transpose()?;

    let mut key = load_key_from_source(key_source)?;
    if let Some(alias) = config.key_alias.as_deref().filter(|a| !a.is_empty()) {
        key = key.with_key_id(alias);
    }
    let signers = create_signers(&key)?;
    debug!("Signing statement with {} key {}", key.algorithm(), key.key_id());

    let input = StatementInput {
        subject_name: subject.name.clone(),
        subject_sha256: subject.sha256.clone(),
        predicate_type: predicate_type.clone(),
        predicate,
        created_by: config.created_by.clone(),
        created_at: Some(Utc::now()),
        markdown,
        stage: config.stage.clone(),
    };

    in_toto::generate_signed_statement(&input, &signers)?.to_json()
}

/// Encode a JSON evidence document for export.
pub fn encode_document(document: &[u8], encoding: OutputEncoding) -> Result<Vec<u8>> {
    match encoding {
        OutputEncoding::Json => {
            let value: Value = serde_json::from_slice(document)?;
            let mut pretty = serde_json::to_vec_pretty(&value)?;
            pretty.push(b'\n');
            Ok(pretty)
        }
        OutputEncoding::Cbor => {
            let value: Value = serde_json::from_slice(document)?;
            serde_cbor::to_vec(&value).map_err(|e| Error::Serialization(e.to_string()))
        }
    }
}
