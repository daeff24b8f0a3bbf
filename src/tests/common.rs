use crate::error::{Error, Result};
use crate::hash;
use crate::registry::{ArtifactRegistry, EvidenceUpload, FileInfo, FilesystemRegistry};
use crate::signing::keys::KeyAlgorithm;
use crate::signing::test_utils::generate_temp_key;
use openssl::pkey::{PKey, Private};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::{TempDir, tempdir};

pub const ARTIFACT_PATH: &str = "generic-local/app/app-1.0.bin";
pub const ARTIFACT_BYTES: &[u8] = b"release artifact bytes";
pub const PREDICATE_TYPE: &str = "https://in-toto.io/attestation/test-result/v0.1";

/// In-memory registry that records every upload.
pub struct MockRegistry {
    artifacts: HashMap<String, String>,
    evidence: Mutex<Vec<(String, EvidenceUpload)>>,
}

impl MockRegistry {
    pub fn with_artifact(path: &str, sha256: &str) -> Self {
        let mut artifacts = HashMap::new();
        artifacts.insert(path.to_string(), sha256.to_string());
        Self {
            artifacts,
            evidence: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> Vec<EvidenceUpload> {
        let evidence = self.evidence.lock().unwrap();
        evidence.iter().map(|(_, upload)| upload.clone()).collect()
    }
}

impl ArtifactRegistry for MockRegistry {
    fn base_uri(&self) -> String {
        "mock://".to_string()
    }

    fn file_info(&self, path: &str) -> Result<FileInfo> {
        let sha256 = self
            .artifacts
            .get(path)
            .ok_or_else(|| Error::Registry(format!("artifact not found: {path}")))?;
        Ok(FileInfo {
            path: path.to_string(),
            sha256: sha256.clone(),
            size: None,
        })
    }

    fn upload_evidence(&self, upload: &EvidenceUpload) -> Result<String> {
        let mut evidence = self.evidence.lock().unwrap();
        let id = format!("mock-{}", evidence.len() + 1);
        evidence.push((id.clone(), upload.clone()));
        Ok(id)
    }

    fn fetch_evidence(&self, id: &str) -> Result<Vec<u8>> {
        let evidence = self.evidence.lock().unwrap();
        evidence
            .iter()
            .find(|(stored, _)| stored == id)
            .map(|(_, upload)| upload.dsse_file_raw.clone())
            .ok_or_else(|| Error::Registry(format!("evidence not found: {id}")))
    }

    fn list_evidence(&self, subject_path: &str) -> Result<Vec<String>> {
        let evidence = self.evidence.lock().unwrap();
        Ok(evidence
            .iter()
            .filter(|(_, upload)| upload.subject_uri == subject_path)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

/// A local registry holding one artifact, plus a predicate file and a signing key.
pub struct Scenario {
    pub dir: TempDir,
    pub registry: FilesystemRegistry,
    pub predicate: PathBuf,
    pub key_path: PathBuf,
    pub key: PKey<Private>,
    _key_dir: TempDir,
}

impl Scenario {
    pub fn new(algorithm: KeyAlgorithm) -> Result<Self> {
        let dir = tempdir()?;
        let registry = FilesystemRegistry::new(dir.path().join("registry"))?;

        let artifact = registry.base_path().join(ARTIFACT_PATH);
        if let Some(parent) = artifact.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&artifact, ARTIFACT_BYTES)?;

        let predicate = dir.path().join("predicate.json");
        fs::write(
            &predicate,
            br#"{"result":"PASSED","configuration":[{"name":"unit"}],"url":"https://ci.example.test/run/7"}"#,
        )?;

        let (key, key_path, key_dir) = generate_temp_key(algorithm)?;

        Ok(Self {
            dir,
            registry,
            predicate,
            key_path,
            key,
            _key_dir: key_dir,
        })
    }

    pub fn artifact_sha256(&self) -> String {
        hash::calculate_hash(ARTIFACT_BYTES)
    }

    /// Write the public half of the signing key and return its path.
    pub fn public_key_path(&self) -> Result<PathBuf> {
        let path = self.dir.path().join("public.pem");
        fs::write(&path, self.key.public_key_to_pem()?)?;
        Ok(path)
    }
}
