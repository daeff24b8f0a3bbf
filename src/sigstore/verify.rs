//! Keyless verification of Sigstore bundles.
//!
//! A bundle verifies when:
//!
//! 1. one of its transparency log entries carries a Signed Entry Timestamp
//!    that verifies under a Rekor key from the trusted root,
//! 2. the signing certificate chains to a Fulcio CA from the trusted root,
//!    evaluated at that entry's integrated time,
//! 3. the entry body records this envelope's payload hash and signatures,
//!    made with that certificate,
//! 4. the DSSE signature verifies with the certificate's public key, and
//! 5. the attested subject digest equals the expected digest.
//!
//! Certificate identity (SAN and OIDC issuer) is not checked.

use crate::error::{Error, Result};
use crate::evidence::{MediaType, VerificationResult};
use crate::hash::{self, HashAlgorithm};
use crate::in_toto::Statement;
use crate::in_toto::dsse::Envelope;
use crate::signing::{CanonicalKey, create_verifiers};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info, warn};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::verify::X509VerifyParam;
use openssl::x509::{X509, X509NameRef, X509StoreContext};
use serde::Serialize;
use serde_json::{Value, json};

use super::rekor::verify_entry_body;
use super::trust_root::{TrustRootSource, TrustedRoot};
use super::{SigstoreBundle, TlogEntry, extract_dsse_envelope};

/// What a bundle must satisfy beyond its signatures.
#[derive(Clone, Debug)]
pub struct VerificationPolicy {
    /// Hex sha256 the statement subject must carry.
    pub expected_sha256: String,
    /// Certificate identity is never checked; must stay `true`.
    pub skip_identity: bool,
}

impl VerificationPolicy {
    pub fn new(expected_sha256: impl Into<String>) -> Self {
        Self {
            expected_sha256: expected_sha256.into(),
            skip_identity: true,
        }
    }
}

#[derive(Serialize)]
struct SignedEntryTimestampPayload<'a> {
    body: &'a str,
    #[serde(rename = "integratedTime")]
    integrated_time: i64,
    #[serde(rename = "logID")]
    log_id: &'a str,
    #[serde(rename = "logIndex")]
    log_index: i64,
}

// Fields are declared in lexicographic key order, so this is the canonical form.
fn signed_entry_timestamp_payload(
    body: &str,
    integrated_time: i64,
    log_id_hex: &str,
    log_index: i64,
) -> Result<Vec<u8>> {
    serde_json::to_vec(&SignedEntryTimestampPayload {
        body,
        integrated_time,
        log_id: log_id_hex,
        log_index,
    })
    .map_err(|e| Error::Serialization(e.to_string()))
}

fn failed(reason: impl Into<String>) -> Error {
    Error::SignatureVerificationFailed(reason.into())
}

fn describe_name(name: &X509NameRef) -> String {
    name.entries()
        .filter_map(|entry| {
            let key = entry.object().nid().short_name().ok()?;
            let value = entry.data().as_utf8().ok()?;
            Some(format!("{key}={}", &*value))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct SigstoreVerifier {
    trusted_root: TrustedRoot,
}

impl SigstoreVerifier {
    /// Wrap a trusted root; its CA certificates must all parse.
    pub fn new(trusted_root: TrustedRoot) -> Result<Self> {
        trusted_root.fulcio_certificates()?;
        Ok(Self { trusted_root })
    }

    pub fn from_source(source: &TrustRootSource) -> Result<Self> {
        Self::new(TrustedRoot::load(source)?)
    }

    pub fn trusted_root(&self) -> &TrustedRoot {
        &self.trusted_root
    }

    /// Verify `bundle` with the default policy for `expected_sha256`.
    pub fn verify(
        &self,
        bundle: &SigstoreBundle,
        expected_sha256: &str,
    ) -> Result<VerificationResult> {
        self.verify_with_policy(bundle, &VerificationPolicy::new(expected_sha256))
    }

    /// Verify `bundle` under `policy`.
    ///
    /// Checks that run and fail produce a `Failed` result. Errors are reserved
    /// for inputs that cannot be checked at all: a message-signature bundle
    /// (`NoDsseEnvelope`), a malformed expected digest, or unusable trust material.
    pub fn verify_with_policy(
        &self,
        bundle: &SigstoreBundle,
        policy: &VerificationPolicy,
    ) -> Result<VerificationResult> {
        if !policy.skip_identity {
            return Err(Error::Validation(
                "certificate identity verification is not supported".to_string(),
            ));
        }

        if !hash::is_valid_digest(&policy.expected_sha256, &HashAlgorithm::Sha256) {
            return Err(Error::Validation(format!(
                "expected subject digest '{}' is not a sha256 hex digest",
                policy.expected_sha256
            )));
        }

        let envelope = extract_dsse_envelope(bundle)?;

        match self.run_checks(bundle, &envelope, policy) {
            Ok(output) => {
                info!("Sigstore bundle verified");
                Ok(VerificationResult::success(MediaType::SigstoreBundle)
                    .with_key_source("sigstore-certificate")
                    .with_output(output))
            }
            Err(Error::SignatureVerificationFailed(reason)) => {
                warn!("Sigstore bundle verification failed: {reason}");
                Ok(VerificationResult::failed(MediaType::SigstoreBundle, reason)
                    .with_key_source("sigstore-certificate"))
            }
            Err(e) => Err(e),
        }
    }

    fn run_checks(
        &self,
        bundle: &SigstoreBundle,
        envelope: &Envelope,
        policy: &VerificationPolicy,
    ) -> Result<Value> {
        let material = &bundle.verification_material;

        let entry = self.verify_tlog_entries(&material.tlog_entries)?;
        let integrated_time = entry.integrated_time.unwrap_or_default();

        let leaf = self.verify_certificate_chain(&material.certificate_chain, integrated_time)?;
        verify_entry_body(entry, envelope, &leaf.to_der()?)?;

        let signing_key = CanonicalKey::from_public_key(leaf.public_key()?)
            .map_err(|e| failed(format!("unusable certificate key: {e}")))?;
        envelope.verify(&create_verifiers(&signing_key)?)?;

        let statement = Statement::from_json(&envelope.payload_bytes()?)
            .map_err(|e| failed(format!("bundle payload is not an in-toto statement: {e}")))?;
        let subject = statement
            .primary_subject()
            .ok_or_else(|| failed("bundle statement has no subject"))?;
        let attested = subject.sha256().unwrap_or_default();
        if !hash::digests_equal(attested, &policy.expected_sha256) {
            return Err(failed(format!(
                "subject digest mismatch: expected {}, bundle attests '{attested}'",
                policy.expected_sha256
            )));
        }

        Ok(json!({
            "bundleMediaType": bundle.media_type,
            "certificate": {
                "subject": describe_name(leaf.subject_name()),
                "issuer": describe_name(leaf.issuer_name()),
            },
            "tlogEntry": {
                "logIndex": entry.log_index,
                "logId": entry.log_id.key_id,
                "integratedTime": integrated_time,
            },
            "subject": {
                "name": subject.identity(),
                "sha256": attested,
            },
            "predicateType": statement.predicate_type,
        }))
    }

    /// The first entry whose Signed Entry Timestamp verifies.
    fn verify_tlog_entries<'a>(&self, entries: &'a [TlogEntry]) -> Result<&'a TlogEntry> {
        if entries.is_empty() {
            return Err(failed("bundle has no transparency log entries"));
        }

        let mut last_reason = String::new();
        for entry in entries {
            match self.verify_signed_entry_timestamp(entry) {
                Ok(()) => {
                    debug!("Signed entry timestamp verified for log index {}", entry.log_index);
                    return Ok(entry);
                }
                Err(Error::SignatureVerificationFailed(reason)) => {
                    debug!("Log index {}: {reason}", entry.log_index);
                    last_reason = reason;
                }
                Err(e) => return Err(e),
            }
        }

        Err(failed(format!(
            "no transparency log entry has a valid signed entry timestamp ({last_reason})"
        )))
    }

    fn verify_signed_entry_timestamp(&self, entry: &TlogEntry) -> Result<()> {
        let promise = entry
            .inclusion_promise
            .as_ref()
            .ok_or_else(|| failed("entry has no inclusion promise"))?;
        let integrated_time = entry
            .integrated_time
            .ok_or_else(|| failed("entry has no integrated time"))?;

        let log_key = self
            .trusted_root
            .rekor_key_for_log(&entry.log_id.key_id, integrated_time)?
            .ok_or_else(|| {
                failed(format!(
                    "no trusted key for transparency log '{}' at integrated time {integrated_time}",
                    entry.log_id.key_id
                ))
            })?;

        let log_id = STANDARD
            .decode(&entry.log_id.key_id)
            .map_err(|e| failed(format!("log id is not base64: {e}")))?;

        let payload = signed_entry_timestamp_payload(
            &entry.canonicalized_body,
            integrated_time,
            &hex::encode(log_id),
            entry.log_index,
        )?;

        let verifiers = create_verifiers(&CanonicalKey::from_public_key(log_key)?)?;
        for verifier in &verifiers {
            verifier
                .verify(&payload, &promise.signed_entry_timestamp)
                .map_err(|_| failed("signed entry timestamp does not verify"))?;
        }

        Ok(())
    }

    fn verify_certificate_chain(&self, chain: &[Vec<u8>], at: i64) -> Result<X509> {
        let leaf_der = chain
            .first()
            .ok_or_else(|| failed("bundle carries no signing certificate"))?;
        let leaf = X509::from_der(leaf_der)
            .map_err(|e| failed(format!("invalid signing certificate: {e}")))?;

        let authorities = self.trusted_root.fulcio_certificates_at(at)?;
        if authorities.is_empty() {
            return Err(failed(format!(
                "trusted root lists no certificate authority valid at integrated time {at}"
            )));
        }

        let mut store = X509StoreBuilder::new()?;
        for authority in authorities {
            store.add_cert(authority)?;
        }
        let mut params = X509VerifyParam::new()?;
        params.set_time(at as _);
        store.set_param(&params)?;
        let store = store.build();

        let mut untrusted: Stack<X509> = Stack::new()?;
        for der in chain.iter().skip(1) {
            let certificate = X509::from_der(der)
                .map_err(|e| failed(format!("invalid chain certificate: {e}")))?;
            untrusted.push(certificate)?;
        }

        let mut context = X509StoreContext::new()?;
        let rejection = context.init(&store, &leaf, &untrusted, |ctx| {
            let valid = ctx.verify_cert()?;
            Ok((!valid).then(|| ctx.error().error_string().to_string()))
        })?;

        match rejection {
            Some(reason) => Err(failed(format!(
                "certificate does not chain to a trusted CA: {reason}"
            ))),
            None => Ok(leaf),
        }
    }
}
