//! Rekor entry bodies and their binding to the bundle that carries them.
//!
//! A Signed Entry Timestamp only proves that Rekor logged `canonicalizedBody`.
//! The body must also describe this bundle: its payload hash has to match the
//! envelope payload, and its signature list has to match the envelope
//! signatures together with the signing certificate.
//!
//! Supported entry kinds are `dsse` v0.0.1 and `intoto` v0.0.2.

use crate::error::{Error, Result};
use crate::hash;
use crate::in_toto::dsse::Envelope;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use openssl::x509::X509;
use serde::Deserialize;
use serde_json::Value;

use super::TlogEntry;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntryBody {
    api_version: String,
    kind: String,
    spec: Value,
}

#[derive(Deserialize)]
struct HashValue {
    #[serde(default)]
    algorithm: String,
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DsseV001Spec {
    payload_hash: HashValue,
    #[serde(default)]
    signatures: Vec<DsseV001Signature>,
}

#[derive(Deserialize)]
struct DsseV001Signature {
    /// Base64 signature bytes.
    signature: String,
    /// Base64 of the signer's PEM certificate.
    verifier: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntotoV002Spec {
    content: IntotoV002Content,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntotoV002Content {
    envelope: IntotoEnvelope,
    #[serde(default)]
    payload_hash: Option<HashValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntotoEnvelope {
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    signatures: Vec<IntotoSignature>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntotoSignature {
    sig: String,
    #[serde(default)]
    public_key: Option<String>,
}

// A logged signature: raw signature bytes and the signer certificate as DER.
struct LoggedSignature {
    signature: Vec<u8>,
    certificate: Option<Vec<u8>>,
}

enum EntryBody {
    DsseV001(DsseV001Spec),
    IntotoV002(IntotoV002Spec),
}

fn failed(reason: impl Into<String>) -> Error {
    Error::SignatureVerificationFailed(reason.into())
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| failed(format!("entry {field} is not base64: {e}")))
}

fn certificate_der(field: &str, encoded_pem: &str) -> Result<Vec<u8>> {
    let pem = decode(field, encoded_pem)?;
    let certificate = X509::from_pem(&pem)
        .map_err(|e| failed(format!("entry {field} is not a PEM certificate: {e}")))?;
    Ok(certificate.to_der()?)
}

fn parse_body(entry: &TlogEntry) -> Result<EntryBody> {
    let raw = decode("body", &entry.canonicalized_body)?;
    let body: RawEntryBody = serde_json::from_slice(&raw)
        .map_err(|e| failed(format!("entry body is not a Rekor entry: {e}")))?;

    if let Some(kind_version) = &entry.kind_version {
        if kind_version.kind != body.kind || kind_version.version != body.api_version {
            return Err(failed(format!(
                "entry is declared as {} v{} but its body is {} v{}",
                kind_version.kind, kind_version.version, body.kind, body.api_version
            )));
        }
    }

    let spec = match (body.kind.as_str(), body.api_version.as_str()) {
        ("dsse", "0.0.1") => EntryBody::DsseV001(
            serde_json::from_value(body.spec)
                .map_err(|e| failed(format!("invalid dsse v0.0.1 entry: {e}")))?,
        ),
        ("intoto", "0.0.2") => EntryBody::IntotoV002(
            serde_json::from_value(body.spec)
                .map_err(|e| failed(format!("invalid intoto v0.0.2 entry: {e}")))?,
        ),
        (kind, version) => {
            return Err(failed(format!(
                "unsupported transparency log entry {kind} v{version}"
            )));
        }
    };
    Ok(spec)
}

fn check_payload_hash(expected: &HashValue, payload: &[u8]) -> Result<()> {
    if !expected.algorithm.is_empty() && !expected.algorithm.eq_ignore_ascii_case("sha256") {
        return Err(failed(format!(
            "unsupported entry payload hash algorithm '{}'",
            expected.algorithm
        )));
    }

    let computed = hash::calculate_hash(payload);
    if !hash::digests_equal(&computed, &expected.value) {
        return Err(failed(format!(
            "entry payload hash {} does not match envelope payload {computed}",
            expected.value
        )));
    }
    Ok(())
}

/// Require that `entry` was logged for `envelope` signed under `leaf_der`.
///
/// # Errors
///
/// `SignatureVerificationFailed` when the body cannot be decoded, is of an
/// unsupported kind, or does not match the envelope and certificate.
pub(crate) fn verify_entry_body(
    entry: &TlogEntry,
    envelope: &Envelope,
    leaf_der: &[u8],
) -> Result<()> {
    let payload = envelope
        .payload_bytes()
        .map_err(|e| failed(format!("envelope payload is not base64: {e}")))?;

    let logged = match parse_body(entry)? {
        EntryBody::DsseV001(spec) => {
            check_payload_hash(&spec.payload_hash, &payload)?;
            spec.signatures
                .iter()
                .map(|s| {
                    Ok(LoggedSignature {
                        signature: decode("signature", &s.signature)?,
                        certificate: Some(certificate_der("verifier", &s.verifier)?),
                    })
                })
                .collect::<Result<Vec<_>>>()?
        }
        EntryBody::IntotoV002(spec) => {
            let content = spec.content;
            if let Some(expected) = &content.payload_hash {
                check_payload_hash(expected, &payload)?;
            }
            if let Some(logged_payload) = &content.envelope.payload {
                if decode("payload", logged_payload)? != payload {
                    return Err(failed("entry payload does not match envelope payload"));
                }
            }
            if content.payload_hash.is_none() && content.envelope.payload.is_none() {
                return Err(failed("intoto entry records neither payload nor payload hash"));
            }
            content
                .envelope
                .signatures
                .iter()
                .map(|s| {
                    Ok(LoggedSignature {
                        signature: decode("sig", &s.sig)?,
                        certificate: s
                            .public_key
                            .as_deref()
                            .map(|key| certificate_der("publicKey", key))
                            .transpose()?,
                    })
                })
                .collect::<Result<Vec<_>>>()?
        }
    };

    if logged.len() != envelope.signatures().len() {
        return Err(failed(format!(
            "envelope has {} signature(s) but the log entry records {}",
            envelope.signatures().len(),
            logged.len()
        )));
    }

    for (index, signature) in envelope.signatures().iter().enumerate() {
        let sig = signature
            .sig_bytes()
            .map_err(|_| failed(format!("signature {index} is not valid base64")))?;
        let recorded = logged.iter().any(|entry| {
            entry.signature == sig
                && entry
                    .certificate
                    .as_deref()
                    .is_none_or(|certificate| certificate == leaf_der)
        });
        if !recorded {
            return Err(failed(format!(
                "signature {index} and signing certificate are not recorded in the log entry"
            )));
        }
    }

    debug!("Log index {} is bound to the bundle envelope", entry.log_index);
    Ok(())
}
