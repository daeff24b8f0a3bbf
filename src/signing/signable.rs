//! # Signable Trait
//!
//! This module defines the `Signable` trait, a common interface for documents
//! that carry one or more signatures produced by [`Signer`]s.
//!
//! ## Examples
//!
//! ```no_run
//! use evidence_cli::in_toto::dsse::Envelope;
//! use evidence_cli::signing::signable::Signable;
//! use evidence_cli::signing::{create_signers, load_key_from_source};
//!
//! let key = load_key_from_source("private_key.pem").unwrap();
//! let signers = create_signers(&key).unwrap();
//!
//! let mut envelope = Envelope::new(b"{}", "application/vnd.in-toto+json");
//! envelope.sign(&signers).unwrap();
//! assert_eq!(envelope.signatures().len(), 1);
//! ```

use crate::error::Result;
use crate::signing::signer::Signer;

/// A trait for types that can be cryptographically signed.
///
/// Implementations should:
/// 1. Prepare the exact bytes to be signed (serialization, canonicalization, encoding)
/// 2. Invoke every supplied signer, in order
/// 3. Attach each signature together with the signer's key id
///
/// Signing must fail as a whole if any signer fails; a partially signed
/// document is never returned to the caller.
pub trait Signable {
    /// Signs the implementing type with each of `signers`.
    ///
    /// ## Errors
    ///
    /// - **No Signers**: an empty signer list
    /// - **Cryptographic Failure**: a signer could not produce a signature
    /// - **Serialization**: the signed representation could not be produced
    fn sign(&mut self, signers: &[Box<dyn Signer>]) -> Result<()>;
}
