//! LFS locking API
//!
//! Speaks `application/vnd.git-lfs+json`. Lock ownership is tied to the
//! request principal; the verify endpoint partitions the listing into the
//! caller's locks and everyone else's.

use std::collections::HashMap;

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::response::Response;
use serde::{Deserialize, Serialize};

use hubd_lfs::{remote::MEDIA_TYPE, Lock, Owner};

use super::auth::principal;
use super::dispatch::find_repo_path;
use super::AppState;

#[derive(Debug, Default, Serialize)]
struct LockList {
    locks: Vec<Lock>,
    #[serde(skip_serializing_if = "String::is_empty")]
    next_cursor: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
}

#[derive(Debug, Default, Serialize)]
struct VerifiableLockList {
    ours: Vec<Lock>,
    theirs: Vec<Lock>,
    #[serde(skip_serializing_if = "String::is_empty")]
    next_cursor: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
}

#[derive(Debug, Default, Serialize)]
struct LockResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    lock: Option<Lock>,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LockRequest {
    path: String,
}

#[derive(Debug, Default, Deserialize)]
struct VerifiableLockRequest {
    #[serde(default)]
    cursor: String,
    #[serde(default)]
    limit: usize,
}

#[derive(Debug, Default, Deserialize)]
struct UnlockRequest {
    #[serde(default)]
    force: bool,
}

/// GET `/{repo}.git/locks`
pub async fn list(state: &AppState, repo: &str, query: &HashMap<String, String>) -> Response {
    if let Err(e) = find_repo_path(state, repo) {
        return e.into_lfs_response();
    }
    let path = query.get("path").cloned().unwrap_or_default();
    let cursor = query.get("cursor").cloned().unwrap_or_default();
    let limit = query
        .get("limit")
        .and_then(|l| l.parse::<usize>().ok())
        .unwrap_or(0);

    let mut list = LockList::default();
    match state.locks.filtered(repo, &path, &cursor, limit) {
        Ok((locks, next_cursor)) => {
            list.locks = locks;
            list.next_cursor = next_cursor;
        }
        Err(e) => list.message = e.to_string(),
    }
    lfs_json(StatusCode::OK, &list)
}

/// POST `/{repo}.git/locks/verify`
pub async fn verify(state: &AppState, repo: &str, req: Request) -> Response {
    if let Err(e) = find_repo_path(state, repo) {
        return e.into_lfs_response();
    }
    let user = principal(req.headers());
    let request = match read_json::<VerifiableLockRequest>(req).await {
        Ok(r) => r,
        Err(message) => {
            return lfs_json(
                StatusCode::BAD_REQUEST,
                &VerifiableLockList {
                    message,
                    ..Default::default()
                },
            )
        }
    };
    let limit = if request.limit == 0 { 100 } else { request.limit };

    let mut list = VerifiableLockList::default();
    match state.locks.filtered(repo, "", &request.cursor, limit) {
        Ok((locks, next_cursor)) => {
            list.next_cursor = next_cursor;
            for lock in locks {
                if lock.owner.name == user {
                    list.ours.push(lock);
                } else {
                    list.theirs.push(lock);
                }
            }
        }
        Err(e) => list.message = e.to_string(),
    }
    lfs_json(StatusCode::OK, &list)
}

/// POST `/{repo}.git/locks`
pub async fn create(state: &AppState, repo: &str, req: Request) -> Response {
    if let Err(e) = find_repo_path(state, repo) {
        return e.into_lfs_response();
    }
    let user = principal(req.headers());
    let request = match read_json::<LockRequest>(req).await {
        Ok(r) => r,
        Err(message) => {
            return lfs_json(
                StatusCode::BAD_REQUEST,
                &LockResponse {
                    message,
                    ..Default::default()
                },
            )
        }
    };

    match state.locks.filtered(repo, &request.path, "", 1) {
        Ok((existing, _)) if !existing.is_empty() => {
            return lfs_json(
                StatusCode::CONFLICT,
                &LockResponse {
                    message: "lock already created".to_string(),
                    ..Default::default()
                },
            )
        }
        Ok(_) => {}
        Err(e) => {
            return lfs_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &LockResponse {
                    message: e.to_string(),
                    ..Default::default()
                },
            )
        }
    }

    let lock = Lock {
        id: random_lock_id(),
        path: request.path,
        owner: Owner { name: user },
        locked_at: chrono::Utc::now(),
    };
    match state.locks.add(repo, lock.clone()) {
        Ok(()) => lfs_json(
            StatusCode::CREATED,
            &LockResponse {
                lock: Some(lock),
                ..Default::default()
            },
        ),
        Err(hubd_lfs::Error::AlreadyLocked) => lfs_json(
            StatusCode::CONFLICT,
            &LockResponse {
                message: "lock already created".to_string(),
                ..Default::default()
            },
        ),
        Err(e) => lfs_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            &LockResponse {
                message: e.to_string(),
                ..Default::default()
            },
        ),
    }
}

/// POST `/{repo}.git/locks/{id}/unlock`
pub async fn unlock(state: &AppState, repo: &str, id: &str, req: Request) -> Response {
    if let Err(e) = find_repo_path(state, repo) {
        return e.into_lfs_response();
    }
    let user = principal(req.headers());
    let request = match read_json::<UnlockRequest>(req).await {
        Ok(r) => r,
        Err(message) => {
            return lfs_json(
                StatusCode::BAD_REQUEST,
                &LockResponse {
                    message,
                    ..Default::default()
                },
            )
        }
    };

    match state.locks.delete(repo, &user, id, request.force) {
        Ok(Some(lock)) => lfs_json(
            StatusCode::OK,
            &LockResponse {
                lock: Some(lock),
                ..Default::default()
            },
        ),
        Ok(None) => lfs_json(
            StatusCode::NOT_FOUND,
            &LockResponse {
                message: "unable to find lock".to_string(),
                ..Default::default()
            },
        ),
        Err(e @ hubd_lfs::Error::NotOwner) => lfs_json(
            StatusCode::FORBIDDEN,
            &LockResponse {
                message: e.to_string(),
                ..Default::default()
            },
        ),
        Err(e) => lfs_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            &LockResponse {
                message: e.to_string(),
                ..Default::default()
            },
        ),
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(req: Request) -> Result<T, String> {
    let body = axum::body::to_bytes(req.into_body(), 1 << 20)
        .await
        .map_err(|e| e.to_string())?;
    serde_json::from_slice(&body).map_err(|e| e.to_string())
}

fn lfs_json<T: Serialize>(status: StatusCode, value: &T) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, MEDIA_TYPE)
        .body(axum::body::Body::from(
            serde_json::to_vec(value).unwrap_or_default(),
        ))
        .unwrap()
}

fn random_lock_id() -> String {
    use rand::RngCore;
    let mut id = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut id);
    hex::encode(id)
}

trait IntoLfsResponse {
    fn into_lfs_response(self) -> Response;
}

impl IntoLfsResponse for super::error::ApiError {
    fn into_lfs_response(self) -> Response {
        lfs_json(
            self.status(),
            &LockResponse {
                message: self.message().to_string(),
                ..Default::default()
            },
        )
    }
}
