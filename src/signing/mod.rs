//! # Signing
//!
//! Key material loading and the algorithm-specific signers and verifiers
//! used to produce and check DSSE signatures.
//!
//! - [`keys`] turns PEM or raw key strings into a [`keys::CanonicalKey`]
//! - [`signer`] builds ECDSA, RSA-PSS or Ed25519 signers/verifiers from a canonical key
//! - [`signable`] is the trait implemented by documents that carry signatures

use crate::error::{Error, Result};
use openssl::pkey::{PKey, Private};
use zeroize::{ZeroizeOnDrop, Zeroizing};

pub mod keys;
pub mod signable;
pub mod signer;

pub use keys::{CanonicalKey, KeyAlgorithm, load_key, load_key_from_source};
pub use signer::{Signer, Verifier, create_signers, create_verifiers};

/// Secure wrapper for private key data that zeroizes on drop
#[derive(ZeroizeOnDrop)]
pub struct SecurePrivateKey {
    #[zeroize(skip)]
    pkey: PKey<Private>,
    // Encoded form the key was parsed from, cleared on drop
    _key_data: Zeroizing<Vec<u8>>,
}

impl SecurePrivateKey {
    /// Create a new SecurePrivateKey from raw PEM data
    pub fn from_pem(pem_data: Vec<u8>) -> Result<Self> {
        let zeroizing_pem = Zeroizing::new(pem_data);

        let pkey = PKey::private_key_from_pem(&zeroizing_pem)
            .map_err(|e| Error::InvalidPem(format!("Failed to load private key: {e}")))?;

        Ok(Self {
            pkey,
            _key_data: zeroizing_pem,
        })
    }

    /// Create a new SecurePrivateKey from DER data (PKCS#8 or traditional)
    pub fn from_der(der_data: Vec<u8>) -> Result<Self> {
        let zeroizing_der = Zeroizing::new(der_data);

        let pkey = PKey::private_key_from_der(&zeroizing_der)
            .map_err(|e| Error::InvalidPem(format!("Failed to load private key: {e}")))?;

        Ok(Self {
            pkey,
            _key_data: zeroizing_der,
        })
    }

    /// Get a reference to the inner PKey
    pub fn as_pkey(&self) -> &PKey<Private> {
        &self.pkey
    }
}
