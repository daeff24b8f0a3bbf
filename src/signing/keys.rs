//! # Key Material Loader
//!
//! Parses caller-supplied key material into a [`CanonicalKey`]. Accepted inputs:
//!
//! - PEM private keys (PKCS#8, PKCS#1 RSA, SEC1 EC)
//! - PEM public keys (SubjectPublicKeyInfo) and PEM certificates
//! - raw strings: base64 DER (private or public), or a 32-byte Ed25519 public
//!   key in hex or base64
//!
//! The public half is always derived, so a signing key can describe itself in
//! output key descriptors.
//!
//! ## Examples
//!
//! ```no_run
//! use evidence_cli::signing::keys::load_key_from_source;
//!
//! let key = load_key_from_source("signing_key.pem")
//!     .unwrap()
//!     .with_key_id("release-key");
//!
//! assert_eq!(key.key_id(), "release-key");
//! ```

use crate::error::{Error, Result};
use crate::signing::SecurePrivateKey;
use crate::utils::read_path_or_literal;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, Id, PKey, PKeyRef, Public};
use openssl::x509::X509;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

const PEM_PREFIX: &str = "-----BEGIN";

/// Supported signature algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Ecdsa,
    Rsa,
    Ed25519,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Ecdsa => write!(f, "ECDSA"),
            KeyAlgorithm::Rsa => write!(f, "RSA"),
            KeyAlgorithm::Ed25519 => write!(f, "ED25519"),
        }
    }
}

/// A parsed key together with its algorithm family, signing scheme and key id.
///
/// The key id defaults to the hex SHA-256 of the DER public key and can be
/// replaced with [`CanonicalKey::with_key_id`]; every signature produced with
/// this key carries that id.
#[derive(Clone)]
pub struct CanonicalKey {
    algorithm: KeyAlgorithm,
    scheme: String,
    key_id: String,
    public: PKey<Public>,
    private: Option<Arc<SecurePrivateKey>>,
}

impl fmt::Debug for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalKey")
            .field("algorithm", &self.algorithm)
            .field("scheme", &self.scheme)
            .field("key_id", &self.key_id)
            .field("has_private", &self.private.is_some())
            .finish()
    }
}

impl CanonicalKey {
    /// Build a verification-only key from an openssl public key.
    pub fn from_public_key(public: PKey<Public>) -> Result<Self> {
        let (algorithm, scheme) = classify(&public)?;
        let key_id = fingerprint(&public)?;

        Ok(Self {
            algorithm,
            scheme,
            key_id,
            public,
            private: None,
        })
    }

    /// Build a signing key; the public half is derived from the private key.
    pub fn from_private_key(private: SecurePrivateKey) -> Result<Self> {
        let (algorithm, scheme) = classify(private.as_pkey())?;
        let public_der = private.as_pkey().public_key_to_der()?;
        let public = PKey::public_key_from_der(&public_der)?;
        let key_id = fingerprint(&public)?;

        Ok(Self {
            algorithm,
            scheme,
            key_id,
            public,
            private: Some(Arc::new(private)),
        })
    }

    /// Replace the key id. An empty id leaves the current one in place.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        let key_id = key_id.into();
        if !key_id.is_empty() {
            self.key_id = key_id;
        }
        self
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn public_key(&self) -> &PKey<Public> {
        &self.public
    }

    pub fn private_key(&self) -> Option<&SecurePrivateKey> {
        self.private.as_deref()
    }

    pub(crate) fn shared_private_key(&self) -> Option<Arc<SecurePrivateKey>> {
        self.private.clone()
    }

    pub fn is_private(&self) -> bool {
        self.private.is_some()
    }
}

/// Parse key bytes into a [`CanonicalKey`].
///
/// # Errors
///
/// - `InvalidPem` when the input is PEM that openssl cannot read, or is not any
///   recognised raw encoding
/// - `UnknownKeyType` when the key parses but is not RSA (including RSA-PSS
///   keys), ECDSA (P-256/384/521) or Ed25519
pub fn load_key(bytes: &[u8]) -> Result<CanonicalKey> {
    let text = std::str::from_utf8(bytes).ok().map(str::trim);

    match text {
        Some(text) if text.starts_with(PEM_PREFIX) => load_pem(text),
        Some(text) => load_raw_text(text),
        None => load_der(bytes),
    }
}

/// Load a key from a filesystem path, or parse the value itself when it does
/// not name a file.
pub fn load_key_from_source(source: &str) -> Result<CanonicalKey> {
    let (bytes, from_file) = read_path_or_literal(source)?;
    if from_file {
        debug!("Loading key material from file {source}");
    } else {
        debug!("Key source is not a file, parsing it as literal key material");
    }
    load_key(&bytes)
}

fn load_pem(text: &str) -> Result<CanonicalKey> {
    let data = text.as_bytes();

    if text.contains("PRIVATE KEY-----") {
        let private = SecurePrivateKey::from_pem(data.to_vec())?;
        return CanonicalKey::from_private_key(private);
    }

    if text.contains("CERTIFICATE-----") {
        let cert = X509::from_pem(data)
            .map_err(|e| Error::InvalidPem(format!("Failed to parse certificate: {e}")))?;
        let public = cert
            .public_key()
            .map_err(|e| Error::InvalidPem(format!("Failed to read certificate key: {e}")))?;
        return CanonicalKey::from_public_key(public);
    }

    let public = PKey::public_key_from_pem(data)
        .map_err(|e| Error::InvalidPem(format!("Failed to load public key: {e}")))?;
    CanonicalKey::from_public_key(public)
}

fn load_raw_text(text: &str) -> Result<CanonicalKey> {
    if text.len() == 64 && text.chars().all(|c| c.is_ascii_hexdigit()) {
        let raw = hex::decode(text)?;
        return load_raw_ed25519(&raw);
    }

    let decoded = STANDARD.decode(text).map_err(|_| {
        Error::InvalidPem("Key material is neither PEM, hex nor base64 encoded".to_string())
    })?;

    if decoded.len() == 32 {
        return load_raw_ed25519(&decoded);
    }

    load_der(&decoded)
}

fn load_raw_ed25519(raw: &[u8]) -> Result<CanonicalKey> {
    let public = PKey::public_key_from_raw_bytes(raw, Id::ED25519)
        .map_err(|e| Error::InvalidPem(format!("Invalid raw Ed25519 public key: {e}")))?;
    CanonicalKey::from_public_key(public)
}

fn load_der(der: &[u8]) -> Result<CanonicalKey> {
    if let Ok(private) = SecurePrivateKey::from_der(der.to_vec()) {
        return CanonicalKey::from_private_key(private);
    }

    let public = PKey::public_key_from_der(der)
        .map_err(|e| Error::InvalidPem(format!("Failed to parse DER key material: {e}")))?;
    CanonicalKey::from_public_key(public)
}

fn classify<T: HasPublic>(pkey: &PKeyRef<T>) -> Result<(KeyAlgorithm, String)> {
    let id = pkey.id();

    if id == Id::RSA || id == Id::RSA_PSS {
        return Ok((KeyAlgorithm::Rsa, "rsassa-pss-sha256".to_string()));
    }

    if id == Id::ED25519 {
        return Ok((KeyAlgorithm::Ed25519, "ed25519".to_string()));
    }

    if id == Id::EC {
        let ec = pkey.ec_key()?;
        let scheme = match ec.group().curve_name() {
            Some(nid) if nid == Nid::X9_62_PRIME256V1 => "ecdsa-sha2-nistp256",
            Some(nid) if nid == Nid::SECP384R1 => "ecdsa-sha2-nistp384",
            Some(nid) if nid == Nid::SECP521R1 => "ecdsa-sha2-nistp521",
            Some(nid) => {
                return Err(Error::UnknownKeyType(format!(
                    "unsupported elliptic curve {}",
                    nid.short_name().unwrap_or("unknown")
                )));
            }
            None => {
                return Err(Error::UnknownKeyType(
                    "elliptic curve key without a named curve".to_string(),
                ));
            }
        };
        return Ok((KeyAlgorithm::Ecdsa, scheme.to_string()));
    }

    Err(Error::UnknownKeyType(format!(
        "openssl key type {}",
        id.as_raw()
    )))
}

fn fingerprint<T: HasPublic>(pkey: &PKeyRef<T>) -> Result<String> {
    let der = pkey.public_key_to_der()?;
    Ok(hex::encode(Sha256::digest(&der)))
}
