//! # in-toto Statement Generation
//!
//! This module builds in-toto v1 statements that describe a single artifact
//! and wraps them in DSSE envelopes (see [`dsse`]).
//!
//! Statements are serialized as canonical JSON: object keys are sorted at every
//! level and no insignificant whitespace is emitted, so the same inputs always
//! produce the same bytes and therefore the same signatures.
//!
//! ## Key Components
//!
//! - **Resource Descriptors**: the statement subject, a name plus a digest set
//! - **Statement Construction**: [`build_statement`] from a [`StatementInput`]
//! - **Signing**: [`generate_signed_statement`] produces a signed [`dsse::Envelope`]
//!
//! ## Examples
//!
//! ```no_run
//! use evidence_cli::in_toto::{StatementInput, generate_signed_statement, read_predicate};
//! use evidence_cli::signing::{create_signers, load_key_from_source};
//! use std::path::Path;
//!
//! let predicate = read_predicate(Path::new("predicate.json")).unwrap();
//! let input = StatementInput {
//!     subject_name: "generic-local/app.bin".to_string(),
//!     subject_sha256: "a".repeat(64),
//!     predicate_type: "https://slsa.dev/provenance/v1".to_string(),
//!     predicate,
//!     created_by: "ci-bot".to_string(),
//!     ..Default::default()
//! };
//!
//! let key = load_key_from_source("private_key.pem").unwrap();
//! let envelope = generate_signed_statement(&input, &create_signers(&key).unwrap()).unwrap();
//! println!("{}", envelope.to_json_pretty().unwrap());
//! ```

use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use crate::signing::signable::Signable;
use crate::signing::signer::Signer;
use crate::utils::read_file_bytes;

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub mod dsse;

use dsse::Envelope;

/// Payload type recorded in every DSSE envelope wrapping a statement.
pub const DSSE_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// `_type` of an in-toto v1 statement.
pub const STATEMENT_TYPE_V1: &str = "https://in-toto.io/Statement/v1";

/// The artifact a statement is about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub digest: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    /// Descriptor with a single `sha256` digest entry.
    pub fn with_sha256(name: &str, sha256: &str) -> Self {
        Self {
            name: name.to_string(),
            uri: None,
            digest: BTreeMap::from([(
                HashAlgorithm::Sha256.as_str().to_string(),
                sha256.to_lowercase(),
            )]),
        }
    }

    /// Name of the subject, falling back to `uri` when no name is recorded.
    pub fn identity(&self) -> &str {
        if self.name.is_empty() {
            self.uri.as_deref().unwrap_or_default()
        } else {
            &self.name
        }
    }

    pub fn sha256(&self) -> Option<&str> {
        self.digest
            .get(HashAlgorithm::Sha256.as_str())
            .map(String::as_str)
    }
}

/// An in-toto v1 statement with the evidence annotations carried alongside
/// the predicate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    pub subject: Vec<ResourceDescriptor>,
    pub predicate_type: String,
    #[serde(default)]
    pub predicate: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl Statement {
    /// Decode a statement from (canonical or not) JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| Error::Serialization(format!("Failed to parse in-toto statement: {e}")))
    }

    /// The first subject, which is the only one this crate ever produces.
    pub fn primary_subject(&self) -> Option<&ResourceDescriptor> {
        self.subject.first()
    }

    /// Serialize with keys sorted at every level and no whitespace.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        let value = serde_json::to_value(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize statement: {e}")))?;
        serde_json::to_vec(&canonicalize(value))
            .map_err(|e| Error::Serialization(format!("Failed to serialize statement: {e}")))
    }
}

/// Everything needed to describe one artifact in a statement.
#[derive(Clone, Debug, Default)]
pub struct StatementInput {
    pub subject_name: String,
    /// Lowercase or uppercase hex; normalised to lowercase in the output.
    pub subject_sha256: String,
    pub predicate_type: String,
    /// Raw predicate document; must be valid JSON.
    pub predicate: Vec<u8>,
    pub created_by: String,
    pub created_at: Option<DateTime<Utc>>,
    pub markdown: Option<String>,
    pub stage: Option<String>,
}

/// Build the [`Statement`] described by `input`.
///
/// # Errors
///
/// - `SubjectResolutionFailed` if the subject name is empty or the digest is not 64 hex characters
/// - `Validation` if the predicate type is empty
/// - `InvalidPredicateFile` if the predicate bytes are not JSON
pub fn statement_from_input(input: &StatementInput) -> Result<Statement> {
    if input.subject_name.trim().is_empty() {
        return Err(Error::SubjectResolutionFailed(
            "subject name cannot be empty".to_string(),
        ));
    }

    if !hash::is_valid_digest(&input.subject_sha256, &HashAlgorithm::Sha256) {
        return Err(Error::SubjectResolutionFailed(format!(
            "'{}' is not a valid sha256 digest",
            input.subject_sha256
        )));
    }

    if input.predicate_type.trim().is_empty() {
        return Err(Error::Validation(
            "predicate type cannot be empty".to_string(),
        ));
    }

    let predicate: Value = serde_json::from_slice(&input.predicate)
        .map_err(|e| Error::InvalidPredicateFile(format!("predicate is not valid JSON: {e}")))?;

    Ok(Statement {
        statement_type: STATEMENT_TYPE_V1.to_string(),
        subject: vec![ResourceDescriptor::with_sha256(
            &input.subject_name,
            &input.subject_sha256,
        )],
        predicate_type: input.predicate_type.clone(),
        predicate,
        created_at: input
            .created_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        created_by: input.created_by.clone(),
        markdown: input.markdown.clone(),
        stage: input.stage.clone(),
    })
}

/// Build the canonical JSON bytes of the statement described by `input`.
///
/// The output is deterministic: identical inputs give byte-identical output.
pub fn build_statement(input: &StatementInput) -> Result<Vec<u8>> {
    statement_from_input(input)?.to_canonical_json()
}

/// Builds a statement and signs it into a DSSE envelope with every signer, in order.
pub fn generate_signed_statement(
    input: &StatementInput,
    signers: &[Box<dyn Signer>],
) -> Result<Envelope> {
    let statement = build_statement(input)?;
    debug!(
        "Built statement for '{}' ({} bytes, predicate type {})",
        input.subject_name,
        statement.len(),
        input.predicate_type
    );

    let mut envelope = Envelope::new(&statement, DSSE_PAYLOAD_TYPE);
    envelope.sign(signers)?;

    Ok(envelope)
}

/// Read a predicate file and check that it holds JSON.
///
/// # Errors
///
/// `InvalidPredicateFile` if the file cannot be read or is not valid JSON.
pub fn read_predicate(path: &Path) -> Result<Vec<u8>> {
    let bytes = read_file_bytes(path).map_err(|e| {
        Error::InvalidPredicateFile(format!("cannot read {}: {e}", path.display()))
    })?;

    serde_json::from_slice::<Value>(&bytes).map_err(|e| {
        Error::InvalidPredicateFile(format!("{} is not valid JSON: {e}", path.display()))
    })?;

    Ok(bytes)
}

/// Read a markdown annotation file. Only `.md` files are accepted.
pub fn read_markdown(path: &Path) -> Result<String> {
    let is_markdown = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"));
    if !is_markdown {
        return Err(Error::Validation(format!(
            "markdown file must have a .md extension: {}",
            path.display()
        )));
    }

    let bytes = read_file_bytes(path)?;
    String::from_utf8(bytes)
        .map_err(|e| Error::Validation(format!("{} is not UTF-8: {e}", path.display())))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
