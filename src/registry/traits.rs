use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Checksum information for an artifact held by a registry.
///
/// # Examples
///
/// ```
/// use evidence_cli::registry::traits::FileInfo;
///
/// let info = FileInfo {
///     path: "generic-local/app.bin".to_string(),
///     sha256: "a".repeat(64),
///     size: Some(1024),
/// };
///
/// assert_eq!(info.sha256.len(), 64);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub sha256: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// A signed evidence document to attach to a subject artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvidenceUpload {
    /// Registry path of the artifact the evidence is about.
    pub subject_uri: String,
    /// Serialized DSSE envelope or Sigstore bundle, stored byte for byte.
    pub dsse_file_raw: Vec<u8>,
    pub provider_id: Option<String>,
}

/// The artifact registry collaborator: artifact checksums in, evidence out.
pub trait ArtifactRegistry {
    fn base_uri(&self) -> String;

    /// Look up the checksum of the artifact at `path`.
    fn file_info(&self, path: &str) -> Result<FileInfo>;

    /// Store an evidence document and return its id.
    fn upload_evidence(&self, upload: &EvidenceUpload) -> Result<String>;

    fn fetch_evidence(&self, id: &str) -> Result<Vec<u8>>;

    /// Ids of every evidence document attached to `subject_path`.
    fn list_evidence(&self, subject_path: &str) -> Result<Vec<String>>;
}
