//! Sigstore trusted root (`trusted_root.json`) loading.
//!
//! The trusted root lists the Fulcio certificate authorities and the Rekor
//! transparency log keys that keyless bundles are checked against. It is
//! fetched through TUF (see [`super::tuf`]), or read from a local file that
//! overrides TUF.
//!
//! Keys and authorities carry an optional `validFor` window; lookups made for
//! a point in time skip entries whose window does not contain it.

use crate::error::{Error, Result};
use crate::utils::read_file_bytes;

use chrono::{DateTime, Utc};
use log::debug;
use openssl::pkey::{PKey, Public};
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use std::path::{Path, PathBuf};

use super::LogId;
use super::tuf::TufConfig;

/// Where to load the trusted root from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrustRootSource {
    /// Local `trusted_root.json`, used as is.
    File(PathBuf),
    /// `trusted_root.json` fetched and verified through a TUF repository.
    Tuf(TufConfig),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedRoot {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub tlogs: Vec<TransparencyLog>,
    #[serde(default)]
    pub certificate_authorities: Vec<CertificateAuthority>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransparencyLog {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub hash_algorithm: String,
    pub public_key: PublicKey,
    pub log_id: LogId,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    /// DER SubjectPublicKeyInfo.
    #[serde_as(as = "Base64")]
    pub raw_bytes: Vec<u8>,
    #[serde(default)]
    pub key_details: String,
    #[serde(default)]
    pub valid_for: Option<ValidityPeriod>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAuthority {
    #[serde(default)]
    pub uri: String,
    pub cert_chain: CertChain,
    #[serde(default)]
    pub valid_for: Option<ValidityPeriod>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CertChain {
    pub certificates: Vec<CertificateEntry>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateEntry {
    #[serde_as(as = "Base64")]
    pub raw_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ValidityPeriod {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

fn parse_bound(value: &Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .as_deref()
        .map(|text| {
            DateTime::parse_from_rfc3339(text)
                .map(|time| time.with_timezone(&Utc))
                .map_err(|e| {
                    Error::FailedToLoadTrustRoot(format!("invalid validFor time '{text}': {e}"))
                })
        })
        .transpose()
}

impl ValidityPeriod {
    fn check(&self) -> Result<()> {
        parse_bound(&self.start)?;
        parse_bound(&self.end)?;
        Ok(())
    }

    /// Whether `at` (unix seconds) falls inside the window; open ends are unbounded.
    pub fn contains(&self, at: i64) -> Result<bool> {
        let Some(at) = DateTime::<Utc>::from_timestamp(at, 0) else {
            return Ok(false);
        };
        let after_start = parse_bound(&self.start)?.is_none_or(|start| at >= start);
        let before_end = parse_bound(&self.end)?.is_none_or(|end| at <= end);
        Ok(after_start && before_end)
    }
}

fn valid_at(valid_for: &Option<ValidityPeriod>, at: i64) -> Result<bool> {
    match valid_for {
        Some(period) => period.contains(at),
        None => Ok(true),
    }
}

impl TrustedRoot {
    /// Parse a trusted root document.
    ///
    /// # Errors
    ///
    /// `FailedToLoadTrustRoot` if the JSON is malformed, a `validFor` time is
    /// not RFC 3339, or the document lists neither a certificate authority nor
    /// a transparency log.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let root: TrustedRoot = serde_json::from_slice(data)
            .map_err(|e| Error::FailedToLoadTrustRoot(format!("invalid trusted root JSON: {e}")))?;

        if root.certificate_authorities.is_empty() && root.tlogs.is_empty() {
            return Err(Error::FailedToLoadTrustRoot(
                "trusted root lists no certificate authorities or transparency logs".to_string(),
            ));
        }

        let periods = root
            .tlogs
            .iter()
            .filter_map(|log| log.public_key.valid_for.as_ref())
            .chain(
                root.certificate_authorities
                    .iter()
                    .filter_map(|authority| authority.valid_for.as_ref()),
            );
        for period in periods {
            period.check()?;
        }

        Ok(root)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = read_file_bytes(path).map_err(|e| {
            Error::FailedToLoadTrustRoot(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&data)
    }

    pub fn load(source: &TrustRootSource) -> Result<Self> {
        let root = match source {
            TrustRootSource::File(path) => Self::from_file(path)?,
            TrustRootSource::Tuf(config) => Self::from_tuf(config)?,
        };
        debug!(
            "Loaded trusted root with {} CA(s) and {} tlog(s)",
            root.certificate_authorities.len(),
            root.tlogs.len()
        );
        Ok(root)
    }

    /// Every certificate of every Fulcio CA chain.
    pub fn fulcio_certificates(&self) -> Result<Vec<X509>> {
        self.collect_certificates(|_| Ok(true))
    }

    /// Certificates of the Fulcio CAs whose validity window contains `at`.
    pub fn fulcio_certificates_at(&self, at: i64) -> Result<Vec<X509>> {
        self.collect_certificates(|authority| valid_at(&authority.valid_for, at))
    }

    fn collect_certificates<F>(&self, include: F) -> Result<Vec<X509>>
    where
        F: Fn(&CertificateAuthority) -> Result<bool>,
    {
        let mut certificates = Vec::new();
        for authority in &self.certificate_authorities {
            if !include(authority)? {
                debug!("Skipping CA '{}' outside its validity window", authority.uri);
                continue;
            }
            for entry in &authority.cert_chain.certificates {
                let certificate = X509::from_der(&entry.raw_bytes).map_err(|e| {
                    Error::FailedToLoadTrustRoot(format!(
                        "invalid certificate for CA '{}': {e}",
                        authority.uri
                    ))
                })?;
                certificates.push(certificate);
            }
        }
        Ok(certificates)
    }

    /// The Rekor key whose log id matches `key_id` (base64) and whose
    /// validity window contains `at`, if any.
    pub fn rekor_key_for_log(&self, key_id: &str, at: i64) -> Result<Option<PKey<Public>>> {
        for log in self.tlogs.iter().filter(|log| log.log_id.key_id == key_id) {
            if !valid_at(&log.public_key.valid_for, at)? {
                debug!("Rekor key for '{}' is not valid at {at}", log.base_url);
                continue;
            }

            let key = PKey::public_key_from_der(&log.public_key.raw_bytes).map_err(|e| {
                Error::FailedToLoadTrustRoot(format!(
                    "invalid public key for log '{}': {e}",
                    log.base_url
                ))
            })?;
            return Ok(Some(key));
        }
        Ok(None)
    }
}
