//! # Evidence
//!
//! Stored evidence is either a plain DSSE envelope or a Sigstore bundle. This
//! module recognises which one a document is and routes it to the matching
//! verifier.
//!
//! Recognition tries the Sigstore bundle form first and plain DSSE second;
//! each attempt is followed by a structural check so a document that merely
//! deserializes is not mistaken for the other format. A document whose
//! `mediaType` declares a Sigstore bundle never falls back to DSSE.
//!
//! ## Examples
//!
//! ```no_run
//! use evidence_cli::evidence::EvidenceVerifier;
//! use evidence_cli::signing::load_key_from_source;
//!
//! let key = load_key_from_source("public_key.pem").unwrap();
//! let verifier = EvidenceVerifier::new().with_public_keys(&[key]).unwrap();
//!
//! let document = std::fs::read("app.bin.evd").unwrap();
//! let result = verifier.verify(&document, None).unwrap();
//! println!("{}", serde_json::to_string_pretty(&result).unwrap());
//! ```

use crate::error::{Error, Result};
use crate::hash;
use crate::in_toto::Statement;
use crate::in_toto::dsse::Envelope;
use crate::signing::{CanonicalKey, Verifier, create_verifiers};
use crate::sigstore::{self, SigstoreBundle, SigstoreVerifier};

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Value, json};
use std::borrow::Cow;

pub mod create;
pub mod subject;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaType {
    SimpleDsse,
    SigstoreBundle,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::SimpleDsse => "simple-dsse",
            MediaType::SigstoreBundle => "sigstore-bundle",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
}

/// Outcome of verifying one evidence document.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub media_type: MediaType,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_verifier_output: Option<Value>,
}

impl VerificationResult {
    pub fn success(media_type: MediaType) -> Self {
        Self {
            media_type,
            status: Status::Success,
            failure_reason: None,
            key_source: None,
            raw_verifier_output: None,
        }
    }

    pub fn failed(media_type: MediaType, reason: impl Into<String>) -> Self {
        Self {
            media_type,
            status: Status::Failed,
            failure_reason: Some(reason.into()),
            key_source: None,
            raw_verifier_output: None,
        }
    }

    pub fn with_key_source(mut self, key_source: impl Into<String>) -> Self {
        self.key_source = Some(key_source.into());
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.raw_verifier_output = Some(output);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredEvidence {
    Dsse(Envelope),
    Sigstore(SigstoreBundle),
}

impl StoredEvidence {
    pub fn media_type(&self) -> MediaType {
        match self {
            StoredEvidence::Dsse(_) => MediaType::SimpleDsse,
            StoredEvidence::Sigstore(_) => MediaType::SigstoreBundle,
        }
    }

    /// The DSSE envelope, whichever container it came in.
    pub fn envelope(&self) -> Result<Envelope> {
        match self {
            StoredEvidence::Dsse(envelope) => Ok(envelope.clone()),
            StoredEvidence::Sigstore(bundle) => sigstore::extract_dsse_envelope(bundle),
        }
    }

    /// Decode the in-toto statement carried by the envelope.
    pub fn statement(&self) -> Result<Statement> {
        Statement::from_json(&self.envelope()?.payload_bytes()?)
    }
}

/// Recognise a stored evidence document.
///
/// Documents exported with CBOR encoding are accepted and read as their JSON
/// equivalent.
///
/// # Errors
///
/// - `BundleParseFailed` if the document declares a Sigstore `mediaType` but is not a valid bundle
/// - `UnrecognizedEvidenceFormat` if it is neither a bundle nor a well-formed DSSE envelope
pub fn parse_stored_evidence(data: &[u8]) -> Result<StoredEvidence> {
    let data = json_document(data);
    let data = data.as_ref();

    let declares_bundle = serde_json::from_slice::<Value>(data)
        .map(|document| sigstore::declares_bundle_media_type(&document))
        .unwrap_or(false);

    match sigstore::parse_bundle(data) {
        Ok(bundle) => return Ok(StoredEvidence::Sigstore(bundle)),
        Err(e) if declares_bundle => return Err(e),
        Err(e) => debug!("Not a Sigstore bundle: {e}"),
    }

    match Envelope::from_json(data) {
        Ok(envelope) if envelope.validate() => return Ok(StoredEvidence::Dsse(envelope)),
        Ok(_) => debug!("DSSE envelope failed structural validation"),
        Err(e) => debug!("Not a DSSE envelope: {e}"),
    }

    Err(Error::UnrecognizedEvidenceFormat(
        "document is neither a Sigstore bundle nor a signed DSSE envelope".to_string(),
    ))
}

// CBOR maps are converted to JSON; anything else is returned untouched.
fn json_document(data: &[u8]) -> Cow<'_, [u8]> {
    if serde_json::from_slice::<Value>(data).is_ok() {
        return Cow::Borrowed(data);
    }

    match serde_cbor::from_slice::<Value>(data) {
        Ok(document @ Value::Object(_)) => match serde_json::to_vec(&document) {
            Ok(json) => {
                debug!("Read CBOR encoded evidence document");
                Cow::Owned(json)
            }
            Err(_) => Cow::Borrowed(data),
        },
        _ => Cow::Borrowed(data),
    }
}

/// Routes evidence to the DSSE or Sigstore verifier.
///
/// DSSE evidence is checked against the configured public keys, matched to
/// signatures by position. Sigstore evidence requires a [`SigstoreVerifier`].
#[derive(Default)]
pub struct EvidenceVerifier {
    verifiers: Vec<Box<dyn Verifier>>,
    key_ids: Vec<String>,
    sigstore: Option<SigstoreVerifier>,
}

impl EvidenceVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one verifier per key, in order.
    pub fn with_public_keys(mut self, keys: &[CanonicalKey]) -> Result<Self> {
        for key in keys {
            self.verifiers.extend(create_verifiers(key)?);
            self.key_ids.push(key.key_id().to_string());
        }
        Ok(self)
    }

    pub fn with_sigstore(mut self, verifier: SigstoreVerifier) -> Self {
        self.sigstore = Some(verifier);
        self
    }

    /// Parse and verify one document.
    pub fn verify(&self, data: &[u8], expected_sha256: Option<&str>) -> Result<VerificationResult> {
        let evidence = parse_stored_evidence(data)?;
        self.verify_evidence(&evidence, expected_sha256)
    }

    /// Verify already-parsed evidence.
    ///
    /// `expected_sha256` is required for Sigstore bundles; for DSSE evidence it
    /// is optional and, when given, the statement subject must match it.
    pub fn verify_evidence(
        &self,
        evidence: &StoredEvidence,
        expected_sha256: Option<&str>,
    ) -> Result<VerificationResult> {
        match evidence {
            StoredEvidence::Dsse(envelope) => self.verify_dsse(envelope, expected_sha256),
            StoredEvidence::Sigstore(bundle) => {
                let verifier = self.sigstore.as_ref().ok_or_else(|| {
                    Error::FailedToLoadTrustRoot(
                        "a trusted root is required to verify Sigstore bundles".to_string(),
                    )
                })?;
                let expected = expected_sha256.ok_or_else(|| {
                    Error::Validation(
                        "an expected subject sha256 is required to verify Sigstore bundles"
                            .to_string(),
                    )
                })?;
                verifier.verify(bundle, expected)
            }
        }
    }

    /// Verify many documents; one result per input, in order.
    ///
    /// A document that cannot be parsed or checked yields an `Err` in its slot
    /// and does not stop the remaining documents from being verified.
    pub fn verify_batch<'a, I>(
        &self,
        documents: I,
        expected_sha256: Option<&str>,
    ) -> Vec<Result<VerificationResult>>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        documents
            .into_iter()
            .enumerate()
            .map(|(index, data)| {
                let result = self.verify(data, expected_sha256);
                if let Err(e) = &result {
                    warn!("Evidence item {index} could not be verified: {e}");
                }
                result
            })
            .collect()
    }

    fn verify_dsse(
        &self,
        envelope: &Envelope,
        expected_sha256: Option<&str>,
    ) -> Result<VerificationResult> {
        if self.verifiers.is_empty() {
            return Err(Error::Validation(
                "at least one public key is required to verify DSSE evidence".to_string(),
            ));
        }

        let key_source = self.key_ids.join(",");
        let failed = |reason: String| {
            warn!("DSSE evidence verification failed: {reason}");
            Ok(VerificationResult::failed(MediaType::SimpleDsse, reason)
                .with_key_source(key_source.clone()))
        };

        match envelope.verify(&self.verifiers) {
            Ok(()) => {}
            Err(Error::SignatureVerificationFailed(reason)) => return failed(reason),
            Err(e) => return Err(e),
        }

        let statement = match Statement::from_json(&envelope.payload_bytes()?) {
            Ok(statement) => statement,
            Err(e) => return failed(format!("payload is not an in-toto statement: {e}")),
        };
        let subject = statement.primary_subject();
        let attested = subject.and_then(|s| s.sha256()).unwrap_or_default();

        if let Some(expected) = expected_sha256 {
            if !hash::digests_equal(attested, expected) {
                return failed(format!(
                    "subject digest mismatch: expected {expected}, evidence attests '{attested}'"
                ));
            }
        }

        info!(
            "DSSE evidence verified with {} signature(s)",
            envelope.signatures().len()
        );
        Ok(VerificationResult::success(MediaType::SimpleDsse)
            .with_key_source(key_source)
            .with_output(json!({
                "payloadType": envelope.payload_type(),
                "signatures": envelope
                    .signatures()
                    .iter()
                    .map(|s| s.keyid())
                    .collect::<Vec<_>>(),
                "subject": {
                    "name": subject.map(|s| s.identity()).unwrap_or_default(),
                    "sha256": attested,
                },
                "predicateType": statement.predicate_type,
            })))
    }
}
