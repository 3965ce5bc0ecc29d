//! Repository CRUD API

use std::path::Path;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use super::dispatch::{find_repo_path, with_repo};
use super::error::ApiError;
use super::AppState;
use crate::paths::clean_join;

#[derive(Debug, Serialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub default_branch: String,
    pub description: String,
    pub is_mirror: bool,
}

#[derive(Debug, Serialize)]
pub struct RepositoryItem {
    pub name: String,
    pub is_mirror: bool,
}

/// POST `/api/repositories/{repo}.git`
pub async fn create(state: &AppState, repo_name: &str) -> Response {
    let Some(path) = clean_join(&state.root, repo_name) else {
        return ApiError::BadRequest("path outside repository directory".to_string())
            .into_response();
    };
    if hubd_git::is_repository(&path) {
        return ApiError::Conflict("Repository already exists".to_string()).into_response();
    }

    let result =
        tokio::task::spawn_blocking(move || hubd_git::Repository::init(&path, "main")).await;
    match result {
        Ok(Ok(_)) => Response::builder()
            .status(StatusCode::CREATED)
            .body(Body::empty())
            .unwrap(),
        Ok(Err(e)) => ApiError::from(e).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// DELETE `/api/repositories/{repo}.git`
pub async fn delete(state: &AppState, repo_name: &str) -> Response {
    let path = match find_repo_path(state, repo_name) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    match tokio::fs::remove_dir_all(&path).await {
        Ok(()) => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty())
            .unwrap(),
        Err(e) => {
            warn!(repo = repo_name, error = %e, "failed to delete repository");
            ApiError::Internal("failed to delete repository".to_string()).into_response()
        }
    }
}

/// GET `/api/repositories/{repo}.git`
pub async fn get(state: &AppState, repo_name: &str) -> Response {
    let path = match find_repo_path(state, repo_name) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let name = repo_name.to_string();
    let result = with_repo(path, move |repo| {
        let (is_mirror, _) = repo.is_mirror()?;
        Ok(RepositoryInfo {
            name,
            default_branch: repo.default_branch(),
            description: String::new(),
            is_mirror,
        })
    })
    .await;
    match result {
        Ok(info) => Json(info).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET `/api/repositories`, walking the root directory for bare repositories.
pub async fn list(state: &AppState) -> Response {
    let root = state.root.clone();
    match tokio::task::spawn_blocking(move || scan_repositories(&root)).await {
        Ok(Ok(repos)) => Json(repos).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "failed to list repositories");
            ApiError::Internal("Failed to list repos".to_string()).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn scan_repositories(root: &Path) -> std::io::Result<Vec<RepositoryItem>> {
    let mut repos = Vec::new();
    visit(root, root, &mut repos)?;
    Ok(repos)
}

fn visit(root: &Path, dir: &Path, out: &mut Vec<RepositoryItem>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        // Internal state directories (.lfs-content, .lfs-locks, .queue).
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if hubd_git::is_repository(&path) {
            if let Some(item) = describe(root, &path) {
                out.push(item);
            }
            continue;
        }
        visit(root, &path, out)?;
    }
    Ok(())
}

fn describe(root: &Path, path: &Path) -> Option<RepositoryItem> {
    let repo = hubd_git::Repository::open(path).ok()?;
    let (is_mirror, _) = repo.is_mirror().ok()?;
    let rel = path.strip_prefix(root).ok()?;
    let name = rel
        .to_string_lossy()
        .trim_end_matches(".git")
        .to_string();
    Some(RepositoryItem { name, is_mirror })
}
