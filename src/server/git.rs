//! Smart-HTTP transport handlers
//!
//! The advertise phase buffers its (small) ref listing; the service phase
//! streams the subprocess's stdout straight to the client through a duplex
//! pipe, so client backpressure throttles the child. Pushes to mirrors are
//! refused in both phases, and pushes take the per-repository write lock.

use std::collections::HashMap;
use std::path::Path;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;
use tracing::warn;

use hubd_git::Service;

use super::dispatch::{find_repo_path, with_repo};
use super::error::plain;
use super::AppState;

/// GET `/{repo}.git/info/refs?service=...`
pub async fn info_refs(
    state: &AppState,
    repo_name: &str,
    query: &HashMap<String, String>,
) -> Response {
    let service_name = match query.get("service") {
        Some(s) if !s.is_empty() => s.clone(),
        _ => return plain(StatusCode::BAD_REQUEST, "service parameter is required"),
    };
    let Some(service) = Service::from_name(&service_name) else {
        return plain(StatusCode::FORBIDDEN, "unsupported service");
    };

    let path = match find_repo_path(state, repo_name) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    if let Some(response) = mirror_guard(&path, service).await {
        return response;
    }

    let mut advertisement = Vec::new();
    match hubd_git::stateless::run(&path, &mut advertisement, None::<&[u8]>, service, true).await {
        Ok(()) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, service.advertisement_content_type())
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from(advertisement))
            .unwrap(),
        Err(e) => {
            warn!(repo = repo_name, error = %e, "advertise failed");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "failed to get info refs")
        }
    }
}

/// POST `/{repo}.git/git-upload-pack` and `/{repo}.git/git-receive-pack`
pub async fn service_rpc(
    state: &AppState,
    repo_name: &str,
    service: Service,
    req: Request,
) -> Response {
    let path = match find_repo_path(state, repo_name) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    if let Some(response) = mirror_guard(&path, service).await {
        return response;
    }

    // git compresses large request bodies; the transport binaries expect
    // them inflated.
    let gzipped = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);
    let body = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(b) => b,
        Err(_) => return plain(StatusCode::BAD_REQUEST, "failed to read request body"),
    };
    let body = if gzipped {
        use std::io::Read;
        let mut decoder = flate2::read::GzDecoder::new(body.as_ref());
        let mut inflated = Vec::new();
        match decoder.read_to_end(&mut inflated) {
            Ok(_) => bytes::Bytes::from(inflated),
            Err(_) => return plain(StatusCode::BAD_REQUEST, "invalid gzip request body"),
        }
    } else {
        body
    };

    let (mut pipe_in, pipe_out) = tokio::io::duplex(64 * 1024);
    let write_locks = state.write_locks.clone();
    let task_path = path.clone();
    let repo_label = repo_name.to_string();
    tokio::spawn(async move {
        // Pushes mutate the repository and must not interleave with
        // imports or other pushes of the same repository.
        let _guard = match service {
            Service::ReceivePack => Some(write_locks.lock(&task_path).await),
            Service::UploadPack => None,
        };
        let input = std::io::Cursor::new(body);
        if let Err(e) =
            hubd_git::stateless::run(&task_path, &mut pipe_in, Some(input), service, false).await
        {
            warn!(repo = %repo_label, service = service.name(), error = %e, "service rpc failed");
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, service.result_content_type())
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(ReaderStream::new(pipe_out)))
        .unwrap()
}

/// Pushing to a mirror is refused before the subprocess is spawned, in
/// both the advertise and service phases.
async fn mirror_guard(path: &Path, service: Service) -> Option<Response> {
    if service != Service::ReceivePack {
        return None;
    }
    match with_repo(path.to_path_buf(), |repo| Ok(repo.is_mirror()?.0)).await {
        Ok(true) => Some(plain(
            StatusCode::FORBIDDEN,
            "push to mirror repository is not allowed",
        )),
        Ok(false) => None,
        Err(e) => Some(e.into_response()),
    }
}
