//! # DSSE Envelope
//!
//! Dead Simple Signing Envelope construction and verification.
//!
//! Signatures are computed over the Pre-Authentication Encoding (PAE):
//!
//! ```text
//! "DSSEv1" SP LEN(type) SP type SP LEN(payload) SP payload
//! ```
//!
//! where `LEN` is the decimal byte length of the field that follows. The
//! envelope keeps `payload` exactly as it was stored (base64 text), and
//! verification always re-derives PAE from that stored text.
//!
//! ## Signature matching
//!
//! [`Envelope::verify`] matches signatures to verifiers by position:
//! `signatures[i]` is checked with `verifiers[i]`, and the two lists must have
//! the same length. `keyid` is informational and not used for matching.
//!
//! Signatures are kept as their base64 text and decoded when verified, so a
//! malformed `sig` fails verification instead of failing to parse.

use crate::error::{Error, Result};
use crate::signing::signable::Signable;
use crate::signing::signer::{Signer, Verifier};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    keyid: String,
    sig: String,
}

impl Signature {
    fn new(sig: &[u8], keyid: String) -> Self {
        Self {
            keyid,
            sig: STANDARD.encode(sig),
        }
    }

    pub fn keyid(&self) -> &str {
        &self.keyid
    }

    /// The signature exactly as stored (base64 text).
    pub fn sig(&self) -> &str {
        &self.sig
    }

    /// Decode the stored signature. Standard and URL-safe base64 are accepted.
    pub fn sig_bytes(&self) -> Result<Vec<u8>> {
        decode_base64(&self.sig)
    }
}

fn decode_base64(text: &str) -> Result<Vec<u8>> {
    match STANDARD.decode(text) {
        Ok(bytes) => Ok(bytes),
        Err(standard_err) => URL_SAFE
            .decode(text)
            .map_err(|_| Error::Base64Decode(standard_err)),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    payload: String,
    payload_type: String,
    #[serde(default)]
    signatures: Vec<Signature>,
}

/// Pre-Authentication Encoding of `payload_type` and `payload`.
///
/// ```
/// use evidence_cli::in_toto::dsse::pae;
///
/// assert_eq!(
///     pae("application/vnd.in-toto+json", b"hello"),
///     b"DSSEv1 28 application/vnd.in-toto+json 5 hello".to_vec()
/// );
/// ```
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = format!(
        "DSSEv1 {} {} {} ",
        payload_type.len(),
        payload_type,
        payload.len()
    );

    let mut encoded = Vec::with_capacity(header.len() + payload.len());
    encoded.extend_from_slice(header.as_bytes());
    encoded.extend_from_slice(payload);
    encoded
}

impl Envelope {
    /// Create an unsigned envelope around `payload`.
    pub fn new(payload: &[u8], payload_type: impl Into<String>) -> Self {
        Self {
            payload: STANDARD.encode(payload),
            payload_type: payload_type.into(),
            signatures: vec![],
        }
    }

    /// Parse an envelope from its JSON form.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// The payload exactly as stored (base64 text).
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn payload_type(&self) -> &str {
        &self.payload_type
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Decode the stored payload. Standard and URL-safe base64 are accepted.
    pub fn payload_bytes(&self) -> Result<Vec<u8>> {
        decode_base64(&self.payload)
    }

    /// PAE bytes derived from the stored `payload` and `payloadType`.
    pub fn pae_bytes(&self) -> Result<Vec<u8>> {
        Ok(pae(&self.payload_type, &self.payload_bytes()?))
    }

    pub fn add_signature(&mut self, sig: Vec<u8>, keyid: String) -> Result<()> {
        if sig.is_empty() {
            return Err(Error::Signing("DSSE signature cannot be empty".to_string()));
        }

        self.signatures.push(Signature::new(&sig, keyid));
        Ok(())
    }

    /// Structural check: required fields are present and every signature is
    /// non-empty. Signature encoding is left to [`Envelope::verify`].
    pub fn validate(&self) -> bool {
        if self.payload.is_empty() || self.payload_type.is_empty() || self.signatures.is_empty() {
            return false;
        }

        if self.payload_bytes().is_err() {
            return false;
        }

        self.signatures.iter().all(|s| !s.sig.is_empty())
    }

    /// Verify every signature against the verifier at the same index.
    ///
    /// # Errors
    ///
    /// `SignatureVerificationFailed` when the number of verifiers differs from
    /// the number of signatures (checked before any cryptography), or when any
    /// signature is not valid base64 or does not verify.
    pub fn verify(&self, verifiers: &[Box<dyn Verifier>]) -> Result<()> {
        if verifiers.len() != self.signatures.len() {
            return Err(Error::SignatureVerificationFailed(format!(
                "envelope has {} signature(s) but {} verifier(s) were supplied",
                self.signatures.len(),
                verifiers.len()
            )));
        }

        if self.signatures.is_empty() {
            return Err(Error::SignatureVerificationFailed(
                "envelope carries no signatures".to_string(),
            ));
        }

        let pae_bytes = self.pae_bytes()?;

        for (index, (signature, verifier)) in self.signatures.iter().zip(verifiers).enumerate() {
            debug!(
                "Verifying DSSE signature {index} (keyid '{}') with key {}",
                signature.keyid,
                verifier.key_id()
            );
            let sig = signature.sig_bytes().map_err(|_| {
                Error::SignatureVerificationFailed(format!(
                    "signature {index} is not valid base64"
                ))
            })?;
            verifier.verify(&pae_bytes, &sig).map_err(|e| match e {
                Error::SignatureVerificationFailed(reason) => Error::SignatureVerificationFailed(
                    format!("signature {index}: {reason}"),
                ),
                other => other,
            })?;
        }

        Ok(())
    }
}

impl Signable for Envelope {
    fn sign(&mut self, signers: &[Box<dyn Signer>]) -> Result<()> {
        if signers.is_empty() {
            return Err(Error::Signing(
                "At least one signer is required to sign a DSSE envelope".to_string(),
            ));
        }

        let pae_bytes = self.pae_bytes()?;

        let mut produced = Vec::with_capacity(signers.len());
        for signer in signers {
            produced.push((signer.sign(&pae_bytes)?, signer.key_id().to_string()));
        }

        for (sig, keyid) in produced {
            self.add_signature(sig, keyid)?;
        }

        Ok(())
    }
}
