use crate::error::{Error, Result};
use crate::registry::traits::{ArtifactRegistry, EvidenceUpload, FileInfo};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use std::time::Duration;

/// A remote artifact registry reached over HTTP.
///
/// - `GET  {base}/api/storage/{path}` returns artifact checksums
/// - `POST {base}/api/evidence` stores an evidence document
/// - `GET  {base}/api/evidence/{id}` returns a stored document
/// - `GET  {base}/api/evidence?subject={path}` lists evidence ids for a subject
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base_url: Url,
    token: Option<String>,
    client: Client,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct StorageInfo {
    #[serde(default)]
    path: String,
    #[serde_as(as = "Option<PickFirst<(DisplayFromStr, _)>>")]
    size: Option<u64>,
    #[serde(default)]
    checksums: Checksums,
}

#[derive(Debug, Default, Deserialize)]
struct Checksums {
    #[serde(default)]
    sha256: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    subject_uri: &'a str,
    dsse_file_raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

impl HttpRegistry {
    pub fn new(url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https") && !u.cannot_be_a_base())
            .ok_or_else(|| Error::Config(format!("invalid registry URL: {url}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            token: token.filter(|t| !t.is_empty()),
            client,
        })
    }

    // Base URL extended by `segments`, each one percent-encoded.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("invalid registry URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn storage_url(&self, path: &str) -> Result<Url> {
        self.endpoint(
            ["api", "storage"]
                .into_iter()
                .chain(path.split('/').filter(|s| !s.is_empty())),
        )
    }

    fn evidence_url(&self, id: Option<&str>) -> Result<Url> {
        self.endpoint(["api", "evidence"].into_iter().chain(id))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::blocking::Response> {
        let response = self
            .authorized(request)
            .send()
            .map_err(|e| Error::Registry(format!("{what} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Registry(format!(
                "{what} failed with HTTP {}",
                response.status()
            )));
        }

        Ok(response)
    }
}

impl ArtifactRegistry for HttpRegistry {
    fn base_uri(&self) -> String {
        self.base_url.as_str().trim_end_matches('/').to_string()
    }

    fn file_info(&self, path: &str) -> Result<FileInfo> {
        let url = self.storage_url(path)?;
        debug!("Fetching checksums from {url}");

        let info: StorageInfo = self
            .send(self.client.get(url), "artifact lookup")?
            .json()
            .map_err(|e| Error::Registry(format!("invalid storage response: {e}")))?;

        let sha256 = info.checksums.sha256.ok_or_else(|| {
            Error::Registry(format!("registry returned no sha256 checksum for {path}"))
        })?;

        Ok(FileInfo {
            path: if info.path.is_empty() {
                path.to_string()
            } else {
                info.path.trim_start_matches('/').to_string()
            },
            sha256,
            size: info.size,
        })
    }

    fn upload_evidence(&self, upload: &EvidenceUpload) -> Result<String> {
        let body = UploadRequest {
            subject_uri: &upload.subject_uri,
            dsse_file_raw: STANDARD.encode(&upload.dsse_file_raw),
            provider_id: upload.provider_id.as_deref(),
        };

        let response: UploadResponse = self
            .send(
                self.client.post(self.evidence_url(None)?).json(&body),
                "evidence upload",
            )?
            .json()
            .map_err(|e| Error::Registry(format!("invalid upload response: {e}")))?;

        Ok(response.id)
    }

    fn fetch_evidence(&self, id: &str) -> Result<Vec<u8>> {
        let bytes = self
            .send(self.client.get(self.evidence_url(Some(id))?), "evidence fetch")?
            .bytes()
            .map_err(|e| Error::Registry(format!("reading evidence {id} failed: {e}")))?;
        Ok(bytes.to_vec())
    }

    fn list_evidence(&self, subject_path: &str) -> Result<Vec<String>> {
        self.send(
            self.client
                .get(self.evidence_url(None)?)
                .query(&[("subject", subject_path)]),
            "evidence listing",
        )?
        .json()
        .map_err(|e| Error::Registry(format!("invalid evidence listing: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // The blocking client owns a runtime of its own; keep it off the test runtime.
    async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        tokio::task::spawn_blocking(f).await.unwrap()
    }

    #[test]
    fn test_rejects_non_http_url() {
        for url in ["ftp://registry", "registry.example.test", "mailto:ops@example.test"] {
            assert!(matches!(
                HttpRegistry::new(url, None),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_urls() -> Result<()> {
        let registry = HttpRegistry::new("https://registry.example.test/", None)?;
        assert_eq!(registry.base_uri(), "https://registry.example.test");
        assert_eq!(
            registry.storage_url("/generic-local/app.bin")?.as_str(),
            "https://registry.example.test/api/storage/generic-local/app.bin"
        );
        assert_eq!(
            registry.evidence_url(Some("abc"))?.as_str(),
            "https://registry.example.test/api/evidence/abc"
        );

        let nested = HttpRegistry::new("https://registry.example.test/artifactory", None)?;
        assert_eq!(
            nested.evidence_url(None)?.as_str(),
            "https://registry.example.test/artifactory/api/evidence"
        );
        Ok(())
    }

    #[test]
    fn test_urls_escape_reserved_characters() -> Result<()> {
        let registry = HttpRegistry::new("https://registry.example.test", None)?;
        assert_eq!(
            registry.storage_url("generic-local/my app#1.bin?raw")?.as_str(),
            "https://registry.example.test/api/storage/generic-local/my%20app%231.bin%3Fraw"
        );
        assert_eq!(
            registry.evidence_url(Some("../ev/1"))?.as_str(),
            "https://registry.example.test/api/evidence/..%2Fev%2F1"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_file_info_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/storage/generic-local/app.bin"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "path": "/generic-local/app.bin",
                "size": "2048",
                "checksums": {"sha1": "x", "sha256": "abc123"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = server.uri();
        let info = blocking(move || {
            HttpRegistry::new(&url, Some("s3cret".to_string()))?.file_info("generic-local/app.bin")
        })
        .await
        .unwrap();

        assert_eq!(info.path, "generic-local/app.bin");
        assert_eq!(info.sha256, "abc123");
        assert_eq!(info.size, Some(2048));
    }

    #[tokio::test]
    async fn test_file_info_path_is_percent_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/storage/generic-local/my%20app%231.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "checksums": {"sha256": "abc123"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let url = server.uri();
        let info = blocking(move || {
            HttpRegistry::new(&url, None)?.file_info("generic-local/my app#1.bin")
        })
        .await
        .unwrap();

        assert_eq!(info.path, "generic-local/my app#1.bin");
        assert_eq!(info.sha256, "abc123");
    }

    #[tokio::test]
    async fn test_file_info_without_sha256() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/storage/a"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"path": "/a", "checksums": {}})),
            )
            .mount(&server)
            .await;

        let url = server.uri();
        let result = blocking(move || HttpRegistry::new(&url, None)?.file_info("a")).await;
        assert!(matches!(result, Err(Error::Registry(_))));
    }

    #[tokio::test]
    async fn test_upload_evidence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/evidence"))
            .and(body_partial_json(json!({
                "subjectUri": "generic-local/app.bin",
                "dsseFileRaw": "e30=",
                "providerId": "ci"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "ev-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let url = server.uri();
        let id = blocking(move || {
            HttpRegistry::new(&url, None)?.upload_evidence(&EvidenceUpload {
                subject_uri: "generic-local/app.bin".to_string(),
                dsse_file_raw: b"{}".to_vec(),
                provider_id: Some("ci".to_string()),
            })
        })
        .await
        .unwrap();

        assert_eq!(id, "ev-1");
    }

    #[tokio::test]
    async fn test_list_and_fetch_evidence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/evidence"))
            .and(query_param("subject", "generic-local/app 1.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["ev/1"])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/evidence/ev%2F1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"payload\":\"\"}"))
            .mount(&server)
            .await;

        let url = server.uri();
        let documents = blocking(move || -> Result<Vec<Vec<u8>>> {
            let registry = HttpRegistry::new(&url, None)?;
            registry
                .list_evidence("generic-local/app 1.bin")?
                .iter()
                .map(|id| registry.fetch_evidence(id))
                .collect()
        })
        .await
        .unwrap();

        assert_eq!(documents, vec![b"{\"payload\":\"\"}".to_vec()]);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/evidence/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let url = server.uri();
        let result = blocking(move || HttpRegistry::new(&url, None)?.fetch_evidence("missing")).await;
        match result {
            Err(Error::Registry(reason)) => assert!(reason.contains("404")),
            other => panic!("expected a registry error, got {other:?}"),
        }
    }
}
