//! # Sigstore Bundles
//!
//! Parsing of keyless Sigstore bundles (v0.1, v0.2 and v0.3) into one
//! version-independent [`SigstoreBundle`], plus helpers to pull the DSSE
//! envelope and the attested subject out of a bundle.
//!
//! Verification against a trusted root lives in [`verify`]; the trusted root
//! document itself in [`trust_root`], fetched through [`tuf`].

use crate::error::{Error, Result};
use crate::in_toto::Statement;
use crate::in_toto::dsse::Envelope;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::base64::Base64;
use serde_with::{DisplayFromStr, PickFirst, serde_as};

mod rekor;
pub mod trust_root;
pub mod tuf;
pub mod verify;

pub use trust_root::{TrustRootSource, TrustedRoot};
pub use tuf::TufConfig;
pub use verify::{SigstoreVerifier, VerificationPolicy};

/// Prefix shared by every Sigstore bundle media type.
pub const BUNDLE_MEDIA_TYPE_PREFIX: &str = "application/vnd.dev.sigstore.bundle";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BundleVersion {
    #[serde(rename = "0.1")]
    V0_1,
    #[serde(rename = "0.2")]
    V0_2,
    #[serde(rename = "0.3")]
    V0_3,
}

impl BundleVersion {
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            "application/vnd.dev.sigstore.bundle+json;version=0.1" => Some(Self::V0_1),
            "application/vnd.dev.sigstore.bundle+json;version=0.2" => Some(Self::V0_2),
            "application/vnd.dev.sigstore.bundle.v0.3+json"
            | "application/vnd.dev.sigstore.bundle+json;version=0.3" => Some(Self::V0_3),
            _ => None,
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::V0_1 => "application/vnd.dev.sigstore.bundle+json;version=0.1",
            Self::V0_2 => "application/vnd.dev.sigstore.bundle+json;version=0.2",
            Self::V0_3 => "application/vnd.dev.sigstore.bundle.v0.3+json",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogId {
    /// Base64 of the SHA-256 of the log's public key.
    pub key_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindVersion {
    pub kind: String,
    pub version: String,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionPromise {
    #[serde_as(as = "Base64")]
    pub signed_entry_timestamp: Vec<u8>,
}

/// A Rekor transparency log entry as carried in a bundle.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlogEntry {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub log_index: i64,
    pub log_id: LogId,
    #[serde(default)]
    pub kind_version: Option<KindVersion>,
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    pub integrated_time: Option<i64>,
    #[serde(default)]
    pub inclusion_promise: Option<InclusionPromise>,
    /// Base64 entry body, kept as stored since the SET covers this exact text.
    #[serde(default)]
    pub canonicalized_body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationMaterial {
    /// DER certificates, leaf first.
    pub certificate_chain: Vec<Vec<u8>>,
    pub tlog_entries: Vec<TlogEntry>,
}

impl VerificationMaterial {
    pub fn leaf_certificate(&self) -> Option<&[u8]> {
        self.certificate_chain.first().map(Vec::as_slice)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BundleContent {
    Dsse(Envelope),
    MessageSignature,
}

/// A parsed bundle, independent of the wire version it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigstoreBundle {
    pub media_type: String,
    pub version: BundleVersion,
    pub verification_material: VerificationMaterial,
    pub content: BundleContent,
}

impl SigstoreBundle {
    pub fn envelope(&self) -> Option<&Envelope> {
        match &self.content {
            BundleContent::Dsse(envelope) => Some(envelope),
            BundleContent::MessageSignature => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBundle {
    media_type: String,
    verification_material: RawVerificationMaterial,
    #[serde(default)]
    dsse_envelope: Option<Envelope>,
    #[serde(default)]
    message_signature: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerificationMaterial {
    #[serde(default)]
    x509_certificate_chain: Option<RawCertificateChain>,
    #[serde(default)]
    certificate: Option<RawCertificate>,
    #[serde(default)]
    tlog_entries: Vec<TlogEntry>,
}

#[derive(Deserialize)]
struct RawCertificateChain {
    #[serde(default)]
    certificates: Vec<RawCertificate>,
}

#[serde_as]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCertificate {
    #[serde_as(as = "Base64")]
    raw_bytes: Vec<u8>,
}

/// Whether a JSON document claims to be a Sigstore bundle through its `mediaType`.
pub fn declares_bundle_media_type(document: &Value) -> bool {
    document
        .get("mediaType")
        .and_then(Value::as_str)
        .is_some_and(|media_type| media_type.starts_with(BUNDLE_MEDIA_TYPE_PREFIX))
}

/// Parse a Sigstore bundle of any supported version.
///
/// Certificate material is taken from `x509CertificateChain` or `certificate`,
/// whichever is present, regardless of the declared version.
///
/// # Errors
///
/// `BundleParseFailed` for malformed JSON, an unsupported media type, or a
/// bundle carrying neither a DSSE envelope nor a message signature.
pub fn parse_bundle(data: &[u8]) -> Result<SigstoreBundle> {
    let raw: RawBundle = serde_json::from_slice(data)
        .map_err(|e| Error::BundleParseFailed(format!("invalid bundle JSON: {e}")))?;

    let version = BundleVersion::from_media_type(&raw.media_type).ok_or_else(|| {
        Error::BundleParseFailed(format!("unsupported media type '{}'", raw.media_type))
    })?;

    let material = raw.verification_material;
    let certificate_chain: Vec<Vec<u8>> = match (material.x509_certificate_chain, material.certificate)
    {
        (Some(chain), _) if !chain.certificates.is_empty() => {
            chain.certificates.into_iter().map(|c| c.raw_bytes).collect()
        }
        (_, Some(certificate)) => vec![certificate.raw_bytes],
        _ => vec![],
    };

    let content = match (raw.dsse_envelope, raw.message_signature) {
        (Some(envelope), _) => BundleContent::Dsse(envelope),
        (None, Some(_)) => BundleContent::MessageSignature,
        (None, None) => {
            return Err(Error::BundleParseFailed(
                "bundle has neither a DSSE envelope nor a message signature".to_string(),
            ));
        }
    };

    debug!(
        "Parsed Sigstore bundle {:?} with {} certificate(s) and {} tlog entr(ies)",
        version,
        certificate_chain.len(),
        material.tlog_entries.len()
    );

    Ok(SigstoreBundle {
        media_type: raw.media_type,
        version,
        verification_material: VerificationMaterial {
            certificate_chain,
            tlog_entries: material.tlog_entries,
        },
        content,
    })
}

/// The DSSE envelope carried by a bundle.
///
/// # Errors
///
/// `NoDsseEnvelope` if the bundle holds a plain message signature.
pub fn extract_dsse_envelope(bundle: &SigstoreBundle) -> Result<Envelope> {
    bundle.envelope().cloned().ok_or(Error::NoDsseEnvelope)
}

/// Name and sha256 digest of the first subject of the bundle's statement.
///
/// The name falls back to the subject `uri`; the digest is an empty string
/// when the subject records no `sha256`.
pub fn extract_subject_from_bundle(bundle: &SigstoreBundle) -> Result<(String, String)> {
    let envelope = extract_dsse_envelope(bundle)?;
    let payload = envelope
        .payload_bytes()
        .map_err(|e| Error::BundleParseFailed(format!("bundle payload is not base64: {e}")))?;
    let statement = Statement::from_json(&payload)
        .map_err(|e| Error::BundleParseFailed(format!("bundle payload is not a statement: {e}")))?;

    let subject = statement.primary_subject().ok_or_else(|| {
        Error::BundleParseFailed("bundle statement has no subject".to_string())
    })?;

    Ok((
        subject.identity().to_string(),
        subject.sha256().unwrap_or_default().to_string(),
    ))
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::in_toto::{DSSE_PAYLOAD_TYPE, STATEMENT_TYPE_V1};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    pub fn statement_payload(name: &str, sha256: Option<&str>) -> Vec<u8> {
        let digest = match sha256 {
            Some(sha256) => json!({ "sha256": sha256 }),
            None => json!({}),
        };
        serde_json::to_vec(&json!({
            "_type": STATEMENT_TYPE_V1,
            "subject": [{ "name": name, "digest": digest }],
            "predicateType": "https://slsa.dev/provenance/v1",
            "predicate": { "builder": { "id": "https://github.com/actions/runner" } }
        }))
        .unwrap()
    }

    pub fn envelope_json(envelope: &Envelope) -> Value {
        serde_json::from_slice(&envelope.to_json().unwrap()).unwrap()
    }

    /// Bundle JSON in the given wire version, carrying `chain` and optional tlog entry.
    pub fn bundle_json(
        version: BundleVersion,
        chain: &[Vec<u8>],
        envelope: &Envelope,
        tlog_entry: Option<Value>,
    ) -> Value {
        let mut material = match version {
            BundleVersion::V0_3 => json!({
                "certificate": { "rawBytes": STANDARD.encode(&chain[0]) },
            }),
            _ => json!({
                "x509CertificateChain": {
                    "certificates": chain
                        .iter()
                        .map(|der| json!({ "rawBytes": STANDARD.encode(der) }))
                        .collect::<Vec<_>>()
                },
            }),
        };
        material["tlogEntries"] = json!(tlog_entry.into_iter().collect::<Vec<_>>());

        json!({
            "mediaType": version.media_type(),
            "verificationMaterial": material,
            "dsseEnvelope": envelope_json(envelope),
        })
    }

    pub fn unsigned_envelope(name: &str, sha256: Option<&str>) -> Envelope {
        Envelope::new(&statement_payload(name, sha256), DSSE_PAYLOAD_TYPE)
    }
}
