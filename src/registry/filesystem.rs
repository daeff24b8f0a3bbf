use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use crate::registry::traits::{ArtifactRegistry, EvidenceUpload, FileInfo};
use crate::utils::{read_file_bytes, safe_create_file};
use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

const EVIDENCE_DIR: &str = ".evidence";
const INDEX_FILE: &str = "evidence_index.json";

/// A registry backed by a local directory.
///
/// Artifacts are regular files below the base directory, addressed by their
/// relative path. Evidence documents are written to `.evidence/<id>.evd`,
/// where the id is the sha256 of the document, and tracked in an index file.
#[derive(Debug, Clone)]
pub struct FilesystemRegistry {
    base_path: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct IndexEntry {
    subject: String,
    file: String,
    #[serde(default)]
    provider_id: Option<String>,
    created_at: String,
}

impl FilesystemRegistry {
    pub fn new<P: AsRef<Path>>(url: P) -> Result<Self> {
        let path_str = url.as_ref().to_string_lossy();
        let path = if path_str.starts_with("file://") {
            PathBuf::from(path_str.trim_start_matches("file://"))
        } else {
            PathBuf::from(path_str.to_string())
        };

        create_dir_all(path.join(EVIDENCE_DIR))?;

        Ok(Self { base_path: path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    // Registry paths are relative and may not leave the base directory
    fn artifact_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.trim().is_empty() || escapes {
            return Err(Error::Validation(format!("invalid registry path: '{path}'")));
        }

        Ok(self.base_path.join(relative))
    }

    fn evidence_path(&self, id: &str) -> Result<PathBuf> {
        if !hash::is_valid_digest(id, &HashAlgorithm::Sha256) {
            return Err(Error::Validation(format!("invalid evidence id: '{id}'")));
        }
        Ok(self.base_path.join(EVIDENCE_DIR).join(format!("{id}.evd")))
    }

    fn index_path(&self) -> PathBuf {
        self.base_path.join(EVIDENCE_DIR).join(INDEX_FILE)
    }

    fn read_index(&self) -> Result<BTreeMap<String, IndexEntry>> {
        let index_path = self.index_path();
        if !index_path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = read_file_bytes(&index_path)?;
        serde_json::from_slice(&content)
            .map_err(|e| Error::Registry(format!("corrupt evidence index: {e}")))
    }

    fn write_index(&self, index: &BTreeMap<String, IndexEntry>) -> Result<()> {
        let json = serde_json::to_string_pretty(index)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let mut file = safe_create_file(&self.index_path(), false)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

impl ArtifactRegistry for FilesystemRegistry {
    fn base_uri(&self) -> String {
        format!("file://{}", self.base_path.display())
    }

    fn file_info(&self, path: &str) -> Result<FileInfo> {
        let full_path = self.artifact_path(path)?;
        if !full_path.is_file() {
            return Err(Error::Registry(format!("artifact not found: {path}")));
        }

        let sha256 = hash::calculate_file_hash(&full_path)?;
        let size = fs::metadata(&full_path)?.len();

        Ok(FileInfo {
            path: path.trim_start_matches('/').to_string(),
            sha256,
            size: Some(size),
        })
    }

    fn upload_evidence(&self, upload: &EvidenceUpload) -> Result<String> {
        let subject = self.file_info(&upload.subject_uri)?;

        let id = hash::calculate_hash(&upload.dsse_file_raw);
        let path = self.evidence_path(&id)?;

        let mut file = safe_create_file(&path, false)?;
        file.write_all(&upload.dsse_file_raw)?;

        let mut index = self.read_index()?;
        index.insert(
            id.clone(),
            IndexEntry {
                subject: subject.path,
                file: format!("{id}.evd"),
                provider_id: upload.provider_id.clone(),
                created_at: Utc::now().to_rfc3339(),
            },
        );
        self.write_index(&index)?;

        debug!("Stored evidence {id} at {}", path.display());
        Ok(id)
    }

    fn fetch_evidence(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.evidence_path(id)?;
        if !path.exists() {
            return Err(Error::Registry(format!("evidence not found: {id}")));
        }

        read_file_bytes(&path)
    }

    fn list_evidence(&self, subject_path: &str) -> Result<Vec<String>> {
        let subject = subject_path.trim_start_matches('/');
        Ok(self
            .read_index()?
            .into_iter()
            .filter(|(_, entry)| entry.subject == subject)
            .map(|(id, _)| id)
            .collect())
    }
}
