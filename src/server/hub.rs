//! Model-hub compatibility facade
//!
//! Lets machine-learning clients point their hub endpoint at this server:
//! model metadata, file listing, and file resolution with transparent LFS
//! handling. `resolve` either redirects to a signed URL (when a signer is
//! configured) or streams the object from the local content store.

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use hubd_git::HfTreeOptions;
use hubd_lfs::{Pointer, MAX_POINTER_SIZE};

use super::dispatch::{find_repo_path, with_repo};
use super::error::ApiError;
use super::AppState;

#[derive(Debug, Serialize)]
struct ModelInfo {
    id: String,
    #[serde(rename = "modelId")]
    model_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    sha: String,
    private: bool,
    disabled: bool,
    gated: bool,
    downloads: u64,
    likes: u64,
    tags: Vec<String>,
    siblings: Vec<Sibling>,
    #[serde(rename = "defaultBranch", skip_serializing_if = "String::is_empty")]
    default_branch: String,
}

#[derive(Debug, Serialize)]
struct Sibling {
    rfilename: String,
}

/// GET `/api/models/{repo}` and `/api/models/{repo}/revision/{rev}`
pub async fn model_info(state: &AppState, repo_name: &str, revision: Option<&str>) -> Response {
    let path = match find_repo_path(state, repo_name) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let id = repo_name.to_string();
    let revision = revision.map(str::to_string);

    let result = with_repo(path, move |repo| {
        let default_branch = repo.default_branch();
        let rev = revision.unwrap_or_else(|| default_branch.clone());
        // Tolerant of empty repositories: listing failures mean no files.
        let entries = repo.tree(&rev, "").unwrap_or_default();
        let siblings = entries
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| Sibling { rfilename: e.path })
            .collect();
        let sha = repo
            .commits(&rev, 1)
            .unwrap_or_default()
            .first()
            .map(|c| c.sha.clone())
            .unwrap_or_default();
        Ok(ModelInfo {
            id: id.clone(),
            model_id: id,
            sha,
            private: false,
            disabled: false,
            gated: false,
            downloads: 0,
            likes: 0,
            tags: Vec::new(),
            siblings,
            default_branch,
        })
    })
    .await;

    match result {
        Ok(info) => Json(info).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET `/api/models/{repo}/tree/{refpath}?recursive&expand`
pub async fn tree(
    state: &AppState,
    repo_name: &str,
    refpath: &str,
    query: &HashMap<String, String>,
) -> Response {
    let path = match find_repo_path(state, repo_name) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let opts = HfTreeOptions {
        recursive: parse_bool(query.get("recursive")),
        expand: parse_bool(query.get("expand")),
    };
    let refpath = refpath.to_string();

    let result = with_repo(path, move |repo| {
        let (rev, sub) = repo.split_revision_and_path(&refpath);
        repo.hf_tree(&rev, &sub, &opts)
    })
    .await;

    match result {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => e.into_response(),
    }
}

struct Resolved {
    commit: String,
    hash: String,
    size: u64,
    mod_time: DateTime<Utc>,
    bytes: Vec<u8>,
    pointer: Option<Pointer>,
}

/// GET/HEAD `/{repo}/resolve/{refpath}`
pub async fn resolve(state: &AppState, repo_name: &str, refpath: &str, head_only: bool) -> Response {
    let path = match find_repo_path(state, repo_name) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let refpath = refpath.to_string();

    let resolved = with_repo(path, move |repo| {
        let (rev, file_path) = repo.split_revision_and_path(&refpath);
        let commit = repo
            .commits(&rev, 1)
            .unwrap_or_default()
            .first()
            .map(|c| c.sha.clone())
            .unwrap_or_default();
        let blob = repo.blob(&rev, &file_path)?;
        let pointer = if blob.size() <= MAX_POINTER_SIZE {
            Pointer::decode_bytes(blob.bytes()).ok()
        } else {
            None
        };
        Ok(Resolved {
            commit,
            hash: blob.hash().to_string(),
            size: blob.size(),
            mod_time: blob.mod_time(),
            bytes: blob.into_bytes(),
            pointer,
        })
    })
    .await;
    let resolved = match resolved {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    if let Some(pointer) = &resolved.pointer {
        return resolve_lfs(state, &resolved, pointer, head_only).await;
    }

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header("X-Repo-Commit", &resolved.commit)
        .header(header::ETAG, format!("\"{}\"", resolved.hash))
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, resolved.size)
        .header(header::LAST_MODIFIED, http_date(resolved.mod_time));
    let body = if head_only {
        Body::empty()
    } else {
        Body::from(resolved.bytes)
    };
    builder.body(body).unwrap()
}

/// LFS pointer branch of `resolve`: signed redirect when a signer is
/// configured, otherwise stream from the content store. The hub headers
/// (`X-Repo-Commit`, oid ETag) are present on both branches.
async fn resolve_lfs(
    state: &AppState,
    resolved: &Resolved,
    pointer: &Pointer,
    head_only: bool,
) -> Response {
    if let Some(signer) = &state.signer {
        return match signer.sign_get(&pointer.oid) {
            Ok(url) => Response::builder()
                .status(StatusCode::TEMPORARY_REDIRECT)
                .header(header::LOCATION, url)
                .header("X-Repo-Commit", &resolved.commit)
                .header(header::ETAG, format!("\"{}\"", pointer.oid))
                .body(Body::empty())
                .unwrap(),
            Err(e) => ApiError::Internal(format!(
                "failed to sign URL for LFS object {}: {e}",
                pointer.oid
            ))
            .into_response(),
        };
    }

    let (file, meta) = match state.content.get(&pointer.oid).await {
        Ok(v) => v,
        Err(hubd_lfs::Error::ObjectNotFound(_)) => {
            return ApiError::NotFound(format!("LFS object {} not found", pointer.oid))
                .into_response()
        }
        Err(e) => return ApiError::Internal(e.to_string()).into_response(),
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("X-Repo-Commit", &resolved.commit)
        .header(header::ETAG, format!("\"{}\"", pointer.oid))
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, meta.len());
    if let Ok(modified) = meta.modified() {
        let modified: DateTime<Utc> = modified.into();
        builder = builder.header(header::LAST_MODIFIED, http_date(modified));
    }
    let body = if head_only {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(file))
    };
    builder.body(body).unwrap()
}

fn http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_bool(value: Option<&String>) -> bool {
    matches!(
        value.map(String::as_str),
        Some("1" | "t" | "T" | "true" | "TRUE" | "True")
    )
}
