//! Mirror import and sync API
//!
//! Import and sync only validate and enqueue; the importer consumes the
//! queue in the background and records progress on the task, which the
//! status endpoint reads back.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::dispatch::{find_repo_path, with_repo};
use super::error::ApiError;
use super::AppState;
use crate::paths::clean_join;
use crate::queue::{TaskKind, TaskPriority};

#[derive(Debug, Deserialize)]
struct ImportRequest {
    #[serde(default)]
    source_url: String,
}

/// POST `/api/repositories/{repo}.git/import`
pub async fn import(state: &AppState, repo_name: &str, req: Request) -> Response {
    let Some(queue) = &state.queue else {
        return ApiError::Unavailable("Queue not initialized".to_string()).into_response();
    };

    let body = match axum::body::to_bytes(req.into_body(), 1 << 20).await {
        Ok(b) => b,
        Err(_) => return ApiError::BadRequest("Invalid request body".to_string()).into_response(),
    };
    let request: ImportRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => return ApiError::BadRequest("Invalid request body".to_string()).into_response(),
    };
    if request.source_url.is_empty() {
        return ApiError::BadRequest("source_url is required".to_string()).into_response();
    }

    let Some(path) = clean_join(&state.root, repo_name) else {
        return ApiError::BadRequest("Invalid repository path".to_string()).into_response();
    };
    if hubd_git::is_repository(&path) {
        return ApiError::Conflict("Repository already exists".to_string()).into_response();
    }

    enqueue(queue, repo_name, &request.source_url, "Import queued")
}

/// POST `/api/repositories/{repo}.git/sync`
pub async fn sync(state: &AppState, repo_name: &str) -> Response {
    let path = match find_repo_path(state, repo_name) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let mirror = with_repo(path, |repo| Ok(repo.is_mirror()?)).await;
    let (is_mirror, source_url) = match mirror {
        Ok(m) => m,
        Err(e) => return e.into_response(),
    };
    if !is_mirror || source_url.is_empty() {
        return ApiError::BadRequest("Repository is not a mirror".to_string()).into_response();
    }

    let Some(queue) = &state.queue else {
        return ApiError::Unavailable("Queue not initialized".to_string()).into_response();
    };
    enqueue(queue, repo_name, &source_url, "Sync queued")
}

fn enqueue(
    queue: &std::sync::Arc<crate::queue::TaskQueue>,
    repo_name: &str,
    source_url: &str,
    message: &str,
) -> Response {
    let params = std::collections::HashMap::from([(
        "source_url".to_string(),
        source_url.to_string(),
    )]);
    match queue.add(TaskKind::RepositorySync, repo_name, TaskPriority::Normal, params) {
        Ok(task_id) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "accepted",
                "message": message,
                "task_id": task_id,
            })),
        )
            .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET `/api/repositories/{repo}.git/import/status`
pub async fn status(state: &AppState, repo_name: &str) -> Response {
    let Some(queue) = &state.queue else {
        return ApiError::Unavailable("Queue not initialized".to_string()).into_response();
    };
    let tasks = queue.list_by_repository(repo_name);
    let Some(task) = tasks.first() else {
        return ApiError::NotFound(format!("no import tasks for repository {repo_name:?}"))
            .into_response();
    };

    let mut response = json!({
        "status": task.status,
        "progress": task.progress,
        "step": task.progress_msg,
        "task_id": task.id,
    });
    if let Some(error) = &task.error {
        response["error"] = json!(error);
    }
    Json(response).into_response()
}

/// GET `/api/repositories/{repo}.git/mirror`
pub async fn mirror_info(state: &AppState, repo_name: &str) -> Response {
    let path = match find_repo_path(state, repo_name) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    match with_repo(path, |repo| Ok(repo.is_mirror()?)).await {
        Ok((is_mirror, source_url)) => Json(json!({
            "is_mirror": is_mirror,
            "source_url": source_url,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}
