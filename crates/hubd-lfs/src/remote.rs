//! Client for the LFS batch download protocol
//!
//! Used on the mirror import path: ask the source's LFS endpoint for signed
//! download actions, then stream each object into the content store. The
//! store verifies every object's sha-256 against its oid, so a corrupt
//! download fails the whole operation.

use std::collections::HashMap;

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ContentStore, Error, Result};

pub const MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// An object referenced by an LFS pointer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LfsObject {
    pub oid: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    operation: &'static str,
    transfers: Vec<&'static str>,
    objects: &'a [LfsObject],
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub transfer: Option<String>,
    #[serde(default)]
    pub objects: Vec<BatchResponseObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchResponseObject {
    pub oid: String,
    pub size: u64,
    #[serde(default)]
    pub actions: HashMap<String, Action>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Action {
    pub href: String,
    #[serde(default)]
    pub header: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RemoteClient {
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Request download actions for `objects`. An empty input returns an
    /// empty response without touching the network.
    pub async fn batch_download(
        &self,
        endpoint: &str,
        objects: &[LfsObject],
    ) -> Result<BatchResponse> {
        if objects.is_empty() {
            return Ok(BatchResponse::default());
        }

        let request = BatchRequest {
            operation: "download",
            transfers: vec!["basic"],
            objects,
        };
        let url = format!("{}/objects/batch", endpoint.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&request)
            .header(reqwest::header::CONTENT_TYPE, MEDIA_TYPE)
            .header(reqwest::header::ACCEPT, MEDIA_TYPE)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Batch(format!(
                "batch request to {url} failed with status {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// GET a single object's signed href, applying any extra headers the
    /// batch response asked for.
    pub async fn download_object(&self, action: &Action) -> Result<reqwest::Response> {
        let mut request = self.http.get(&action.href);
        for (key, value) in &action.header {
            request = request.header(key.as_str(), value.as_str());
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Batch(format!(
                "download from {} failed with status {}",
                action.href,
                response.status()
            )));
        }
        Ok(response)
    }

    /// Batch-resolve `objects` against `endpoint` and stream each one into
    /// `store`. Objects already present are skipped.
    pub async fn fetch_and_store(
        &self,
        endpoint: &str,
        objects: &[LfsObject],
        store: &ContentStore,
    ) -> Result<()> {
        let mut missing = Vec::new();
        for object in objects {
            if !store.exists(&object.oid).await {
                missing.push(object.clone());
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        info!(count = missing.len(), endpoint, "fetching lfs objects");

        let batch = self.batch_download(endpoint, &missing).await?;
        for object in &batch.objects {
            let action = object.actions.get("download").ok_or_else(|| {
                Error::Batch(format!("no download action for object {}", object.oid))
            })?;
            let response = self.download_object(action).await?;
            let stream = response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
            let mut reader = tokio_util::io::StreamReader::new(stream);
            store.put(&object.oid, &mut reader).await?;
            debug!(oid = %object.oid, size = object.size, "fetched lfs object");
        }
        Ok(())
    }
}

/// Derive a repository's LFS endpoint from its clone URL.
pub fn lfs_endpoint(repo_url: &str) -> String {
    let url = repo_url.trim_end_matches('/');
    if url.ends_with(".git") {
        format!("{url}/info/lfs")
    } else {
        format!("{url}.git/info/lfs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, routing::post, Json, Router};
    use sha2::{Digest, Sha256};

    #[test]
    fn test_lfs_endpoint_derivation() {
        assert_eq!(
            lfs_endpoint("https://github.com/owner/repo"),
            "https://github.com/owner/repo.git/info/lfs"
        );
        assert_eq!(
            lfs_endpoint("https://github.com/owner/repo.git"),
            "https://github.com/owner/repo.git/info/lfs"
        );
        assert_eq!(
            lfs_endpoint("https://github.com/owner/repo/"),
            "https://github.com/owner/repo.git/info/lfs"
        );
    }

    #[tokio::test]
    async fn test_batch_download_empty_is_offline() {
        let client = RemoteClient::new();
        // An unroutable endpoint: must not be contacted for empty input.
        let response = client
            .batch_download("http://127.0.0.1:1/info/lfs", &[])
            .await
            .unwrap();
        assert!(response.objects.is_empty());
    }

    async fn spawn_lfs_server(content: Vec<u8>, oid: String) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{addr}");

        let batch_base = base.clone();
        let batch_oid = oid.clone();
        let app = Router::new()
            .route(
                "/info/lfs/objects/batch",
                // The batch request arrives as vnd.git-lfs+json, so the
                // body is parsed by hand rather than with the Json
                // extractor.
                post(move |body: axum::body::Bytes| {
                    let base = batch_base.clone();
                    let oid = batch_oid.clone();
                    async move {
                        let req: serde_json::Value = serde_json::from_slice(&body).unwrap();
                        let objects: Vec<serde_json::Value> = req["objects"]
                            .as_array()
                            .unwrap()
                            .iter()
                            .map(|o| {
                                serde_json::json!({
                                    "oid": o["oid"],
                                    "size": o["size"],
                                    "actions": {
                                        "download": {
                                            "href": format!("{base}/objects/{oid}"),
                                            "header": {"X-Token": "abc"}
                                        }
                                    }
                                })
                            })
                            .collect();
                        Json(serde_json::json!({"transfer": "basic", "objects": objects}))
                    }
                }),
            )
            .route(
                "/objects/:oid",
                get(move |headers: axum::http::HeaderMap| {
                    let content = content.clone();
                    async move {
                        assert_eq!(headers.get("X-Token").unwrap(), "abc");
                        content
                    }
                }),
            );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    #[tokio::test]
    async fn test_fetch_and_store() {
        let content = b"lfs object bytes".to_vec();
        let oid = hex::encode(Sha256::digest(&content));
        let base = spawn_lfs_server(content.clone(), oid.clone()).await;

        let dir = tempfile::TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let client = RemoteClient::new();

        let objects = vec![LfsObject {
            oid: oid.clone(),
            size: content.len() as u64,
        }];
        client
            .fetch_and_store(&format!("{base}/info/lfs"), &objects, &store)
            .await
            .unwrap();

        assert!(store.exists(&oid).await);
    }

    #[tokio::test]
    async fn test_fetch_and_store_rejects_corrupt_object() {
        let content = b"served bytes".to_vec();
        // Advertise an oid that does not match the served bytes.
        let oid = hex::encode(Sha256::digest(b"different bytes"));
        let base = spawn_lfs_server(content, oid.clone()).await;

        let dir = tempfile::TempDir::new().unwrap();
        let store = ContentStore::new(dir.path());
        let client = RemoteClient::new();

        let objects = vec![LfsObject { oid: oid.clone(), size: 12 }];
        let err = client
            .fetch_and_store(&format!("{base}/info/lfs"), &objects, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
        assert!(!store.exists(&oid).await);
    }
}
