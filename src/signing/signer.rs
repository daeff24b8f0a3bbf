//! # Signer/Verifier Factory
//!
//! Builds the algorithm-specific signer or verifier for a [`CanonicalKey`].
//! Dispatch is an exhaustive match over [`KeyAlgorithm`], so every supported
//! family is handled at compile time:
//!
//! | Family  | Scheme                         | Digest                        |
//! |---------|--------------------------------|-------------------------------|
//! | RSA     | RSASSA-PSS, salt = digest len  | SHA-256                       |
//! | ECDSA   | ASN.1 DER signature            | by curve (P-256/384/521)      |
//! | Ed25519 | pure EdDSA                     | none                          |

use crate::error::{Error, Result};
use crate::signing::SecurePrivateKey;
use crate::signing::keys::{CanonicalKey, KeyAlgorithm};

use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Public};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Signer as OpensslSigner, Verifier as OpensslVerifier};
use std::sync::Arc;

/// Produces signatures over arbitrary bytes.
pub trait Signer {
    /// Identifier attached to every signature this signer produces.
    fn key_id(&self) -> &str;

    fn algorithm(&self) -> KeyAlgorithm;

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Checks signatures over arbitrary bytes.
pub trait Verifier {
    fn key_id(&self) -> &str;

    fn algorithm(&self) -> KeyAlgorithm;

    /// Returns `SignatureVerificationFailed` when the signature does not match
    /// or cannot be decoded.
    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()>;
}

/// Create the signers for a key. Exactly one signer is produced per key.
///
/// # Errors
///
/// `UnsupportedKeyType` if the key carries no private material or its scheme
/// has no signer.
pub fn create_signers(key: &CanonicalKey) -> Result<Vec<Box<dyn Signer>>> {
    let private = key.shared_private_key().ok_or_else(|| {
        Error::UnsupportedKeyType(format!(
            "{} key {} has no private material and cannot sign",
            key.algorithm(),
            key.key_id()
        ))
    })?;

    let signer: Box<dyn Signer> = match key.algorithm() {
        KeyAlgorithm::Ecdsa => Box::new(EcdsaSignerVerifier::new(key, Some(private))?),
        KeyAlgorithm::Rsa => Box::new(RsaPssSignerVerifier::new(key, Some(private))),
        KeyAlgorithm::Ed25519 => Box::new(Ed25519SignerVerifier::new(key, Some(private))),
    };

    Ok(vec![signer])
}

/// Create the verifiers for a key. Exactly one verifier is produced per key.
pub fn create_verifiers(key: &CanonicalKey) -> Result<Vec<Box<dyn Verifier>>> {
    let verifier: Box<dyn Verifier> = match key.algorithm() {
        KeyAlgorithm::Ecdsa => Box::new(EcdsaSignerVerifier::new(key, None)?),
        KeyAlgorithm::Rsa => Box::new(RsaPssSignerVerifier::new(key, None)),
        KeyAlgorithm::Ed25519 => Box::new(Ed25519SignerVerifier::new(key, None)),
    };

    Ok(vec![verifier])
}

fn ecdsa_digest(scheme: &str) -> Result<MessageDigest> {
    match scheme {
        "ecdsa-sha2-nistp256" => Ok(MessageDigest::sha256()),
        "ecdsa-sha2-nistp384" => Ok(MessageDigest::sha384()),
        "ecdsa-sha2-nistp521" => Ok(MessageDigest::sha512()),
        other => Err(Error::UnsupportedKeyType(format!(
            "unsupported ECDSA scheme {other}"
        ))),
    }
}

fn missing_private(key_id: &str) -> Error {
    Error::UnsupportedKeyType(format!("key {key_id} was loaded for verification only"))
}

fn verification_outcome(
    key_id: &str,
    outcome: std::result::Result<bool, openssl::error::ErrorStack>,
) -> Result<()> {
    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::SignatureVerificationFailed(format!(
            "signature does not match key {key_id}"
        ))),
        Err(e) => Err(Error::SignatureVerificationFailed(format!(
            "malformed signature for key {key_id}: {e}"
        ))),
    }
}

pub struct EcdsaSignerVerifier {
    key_id: String,
    digest: MessageDigest,
    public: PKey<Public>,
    private: Option<Arc<SecurePrivateKey>>,
}

impl EcdsaSignerVerifier {
    fn new(key: &CanonicalKey, private: Option<Arc<SecurePrivateKey>>) -> Result<Self> {
        Ok(Self {
            key_id: key.key_id().to_string(),
            digest: ecdsa_digest(key.scheme())?,
            public: key.public_key().clone(),
            private,
        })
    }
}

impl Signer for EcdsaSignerVerifier {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Ecdsa
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| missing_private(&self.key_id))?;

        let mut signer = OpensslSigner::new(self.digest, private.as_pkey())
            .map_err(|e| Error::Signing(format!("Failed to create signer: {e}")))?;
        signer
            .update(data)
            .map_err(|e| Error::Signing(format!("Failed to update signer: {e}")))?;
        signer
            .sign_to_vec()
            .map_err(|e| Error::Signing(format!("Failed to sign data: {e}")))
    }
}

impl Verifier for EcdsaSignerVerifier {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Ecdsa
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let mut verifier = OpensslVerifier::new(self.digest, &self.public)?;
        verifier.update(data)?;
        verification_outcome(&self.key_id, verifier.verify(signature))
    }
}

pub struct RsaPssSignerVerifier {
    key_id: String,
    public: PKey<Public>,
    private: Option<Arc<SecurePrivateKey>>,
}

impl RsaPssSignerVerifier {
    fn new(key: &CanonicalKey, private: Option<Arc<SecurePrivateKey>>) -> Self {
        Self {
            key_id: key.key_id().to_string(),
            public: key.public_key().clone(),
            private,
        }
    }
}

impl Signer for RsaPssSignerVerifier {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Rsa
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| missing_private(&self.key_id))?;

        let mut signer = OpensslSigner::new(MessageDigest::sha256(), private.as_pkey())
            .map_err(|e| Error::Signing(format!("Failed to create signer: {e}")))?;
        signer.set_rsa_padding(Padding::PKCS1_PSS)?;
        signer.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
        signer
            .update(data)
            .map_err(|e| Error::Signing(format!("Failed to update signer: {e}")))?;
        signer
            .sign_to_vec()
            .map_err(|e| Error::Signing(format!("Failed to sign data: {e}")))
    }
}

impl Verifier for RsaPssSignerVerifier {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Rsa
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let mut verifier = OpensslVerifier::new(MessageDigest::sha256(), &self.public)?;
        verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
        verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
        verifier.update(data)?;
        verification_outcome(&self.key_id, verifier.verify(signature))
    }
}

pub struct Ed25519SignerVerifier {
    key_id: String,
    public: PKey<Public>,
    private: Option<Arc<SecurePrivateKey>>,
}

impl Ed25519SignerVerifier {
    fn new(key: &CanonicalKey, private: Option<Arc<SecurePrivateKey>>) -> Self {
        Self {
            key_id: key.key_id().to_string(),
            public: key.public_key().clone(),
            private,
        }
    }
}

impl Signer for Ed25519SignerVerifier {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Ed25519
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| missing_private(&self.key_id))?;

        let mut signer = OpensslSigner::new_without_digest(private.as_pkey())
            .map_err(|e| Error::Signing(format!("Failed to create signer: {e}")))?;
        signer
            .sign_oneshot_to_vec(data)
            .map_err(|e| Error::Signing(format!("Failed to sign data: {e}")))
    }
}

impl Verifier for Ed25519SignerVerifier {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Ed25519
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        let mut verifier = OpensslVerifier::new_without_digest(&self.public)?;
        verification_outcome(&self.key_id, verifier.verify_oneshot(signature, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::keys::load_key;
    use crate::signing::test_utils::{ALL_ALGORITHMS, generate_canonical_key, generate_pkey};

    #[test]
    fn test_sign_and_verify_each_algorithm() -> Result<()> {
        let data = b"test data for sign and verify";

        for algorithm in ALL_ALGORITHMS {
            let key = generate_canonical_key(algorithm)?;
            let signers = create_signers(&key)?;
            let verifiers = create_verifiers(&key)?;

            assert_eq!(signers.len(), 1);
            assert_eq!(verifiers.len(), 1);
            assert_eq!(signers[0].algorithm(), algorithm);

            let signature = signers[0].sign(data)?;
            assert!(!signature.is_empty());
            verifiers[0].verify(data, &signature)?;
        }
        Ok(())
    }

    #[test]
    fn test_verify_rejects_other_data() -> Result<()> {
        for algorithm in ALL_ALGORITHMS {
            let key = generate_canonical_key(algorithm)?;
            let signature = create_signers(&key)?[0].sign(b"original")?;

            let result = create_verifiers(&key)?[0].verify(b"tampered", &signature);
            assert!(
                matches!(result, Err(Error::SignatureVerificationFailed(_))),
                "{algorithm} accepted a signature over different data"
            );
        }
        Ok(())
    }

    #[test]
    fn test_verify_rejects_other_key() -> Result<()> {
        let signing_key = generate_canonical_key(KeyAlgorithm::Ecdsa)?;
        let other_key = generate_canonical_key(KeyAlgorithm::Ecdsa)?;
        let signature = create_signers(&signing_key)?[0].sign(b"payload")?;

        let result = create_verifiers(&other_key)?[0].verify(b"payload", &signature);
        assert!(matches!(result, Err(Error::SignatureVerificationFailed(_))));
        Ok(())
    }

    #[test]
    fn test_garbage_signature_is_verification_failure() -> Result<()> {
        for algorithm in ALL_ALGORITHMS {
            let key = generate_canonical_key(algorithm)?;
            let result = create_verifiers(&key)?[0].verify(b"payload", b"\x01\x02\x03");
            assert!(matches!(result, Err(Error::SignatureVerificationFailed(_))));
        }
        Ok(())
    }

    #[test]
    fn test_key_id_follows_override() -> Result<()> {
        let key = generate_canonical_key(KeyAlgorithm::Rsa)?.with_key_id("alias-1");
        assert_eq!(create_signers(&key)?[0].key_id(), "alias-1");
        assert_eq!(create_verifiers(&key)?[0].key_id(), "alias-1");
        Ok(())
    }

    #[test]
    fn test_public_key_cannot_sign() -> Result<()> {
        let pkey = generate_pkey(KeyAlgorithm::Ed25519)?;
        let key = load_key(&pkey.public_key_to_pem()?)?;
        assert!(matches!(
            create_signers(&key),
            Err(Error::UnsupportedKeyType(_))
        ));
        Ok(())
    }

    #[test]
    fn test_rsa_pss_is_randomized_ed25519_is_not() -> Result<()> {
        let rsa = generate_canonical_key(KeyAlgorithm::Rsa)?;
        let rsa_signers = create_signers(&rsa)?;
        let rsa_signer = &rsa_signers[0];
        assert_ne!(rsa_signer.sign(b"data")?, rsa_signer.sign(b"data")?);

        let ed = generate_canonical_key(KeyAlgorithm::Ed25519)?;
        let ed_signers = create_signers(&ed)?;
        let ed_signer = &ed_signers[0];
        assert_eq!(ed_signer.sign(b"data")?, ed_signer.sign(b"data")?);
        Ok(())
    }
}
