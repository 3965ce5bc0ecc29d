//! Path routing
//!
//! Repository names may be nested (`org/model.git`), so the interesting
//! routes cannot be expressed as a static table: the `.git` suffix, the
//! `/resolve/` marker and the locks suffixes delimit where the repository
//! name ends. A single dispatcher decodes the path and matches its shape.

use std::collections::HashMap;
use std::path::PathBuf;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;

use super::error::{plain, ApiError, ApiResult};
use super::{git, hub, import_api, locks, repos, AppState};
use crate::paths::clean_join;

pub async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let method = req.method().clone();
    let path = match percent_decode_str(req.uri().path()).decode_utf8() {
        Ok(p) => p.into_owned(),
        Err(_) => {
            return ApiError::BadRequest("invalid percent-encoding in request path".to_string())
                .into_response()
        }
    };
    let query = parse_query(req.uri().query().unwrap_or(""));

    if path == "/api/repositories" {
        if method == Method::GET {
            return repos::list(&state).await;
        }
        return method_not_allowed();
    }
    if let Some(rest) = path.strip_prefix("/api/repositories/") {
        return api_repositories(&state, &method, rest, req).await;
    }
    if let Some(rest) = path.strip_prefix("/api/models/") {
        return api_models(&state, &method, rest, &query).await;
    }
    if path.starts_with("/api/") {
        return ApiError::NotFound("unknown API endpoint".to_string()).into_response();
    }

    repo_shaped(&state, &method, &path, &query, req).await
}

async fn api_repositories(
    state: &AppState,
    method: &Method,
    rest: &str,
    req: Request,
) -> Response {
    if let Some(name) = rest.strip_suffix("/import/status") {
        if !name.ends_with(".git") {
            return not_found();
        }
        if *method == Method::GET {
            return import_api::status(state, name).await;
        }
        return method_not_allowed();
    }
    if let Some(name) = rest.strip_suffix("/import") {
        if !name.ends_with(".git") {
            return not_found();
        }
        if *method == Method::POST {
            return import_api::import(state, name, req).await;
        }
        return method_not_allowed();
    }
    if let Some(name) = rest.strip_suffix("/sync") {
        if !name.ends_with(".git") {
            return not_found();
        }
        if *method == Method::POST {
            return import_api::sync(state, name).await;
        }
        return method_not_allowed();
    }
    if let Some(name) = rest.strip_suffix("/mirror") {
        if !name.ends_with(".git") {
            return not_found();
        }
        if *method == Method::GET {
            return import_api::mirror_info(state, name).await;
        }
        return method_not_allowed();
    }
    if rest.ends_with(".git") {
        if *method == Method::POST {
            return repos::create(state, rest).await;
        }
        if *method == Method::GET {
            return repos::get(state, rest).await;
        }
        if *method == Method::DELETE {
            return repos::delete(state, rest).await;
        }
        return method_not_allowed();
    }
    // No route shape matched; still reject names that would escape the
    // root so traversal probes get a 400 before any lookup.
    if clean_join(&state.root, rest).is_none() {
        return ApiError::BadRequest("path outside repository directory".to_string())
            .into_response();
    }
    not_found()
}

async fn api_models(
    state: &AppState,
    method: &Method,
    rest: &str,
    query: &HashMap<String, String>,
) -> Response {
    if *method != Method::GET {
        return method_not_allowed();
    }
    if let Some(idx) = rest.rfind("/tree/") {
        let repo = &rest[..idx];
        let refpath = &rest[idx + "/tree/".len()..];
        return hub::tree(state, repo, refpath, query).await;
    }
    if let Some(idx) = rest.rfind("/revision/") {
        let repo = &rest[..idx];
        let revision = &rest[idx + "/revision/".len()..];
        return hub::model_info(state, repo, Some(revision)).await;
    }
    hub::model_info(state, rest, None).await
}

async fn repo_shaped(
    state: &AppState,
    method: &Method,
    path: &str,
    query: &HashMap<String, String>,
    req: Request,
) -> Response {
    let p = path.trim_start_matches('/');
    if p.is_empty() {
        return not_found();
    }

    // Smart-HTTP transport.
    if let Some(repo) = p.strip_suffix("/info/refs") {
        if *method == Method::GET {
            return git::info_refs(state, &canonical_repo(repo), query).await;
        }
        return method_not_allowed();
    }
    if let Some(repo) = p.strip_suffix("/git-upload-pack") {
        if *method == Method::POST {
            return git::service_rpc(state, &canonical_repo(repo), hubd_git::Service::UploadPack, req)
                .await;
        }
        return method_not_allowed();
    }
    if let Some(repo) = p.strip_suffix("/git-receive-pack") {
        if *method == Method::POST {
            return git::service_rpc(
                state,
                &canonical_repo(repo),
                hubd_git::Service::ReceivePack,
                req,
            )
            .await;
        }
        return method_not_allowed();
    }

    // LFS locking API.
    if let Some(repo) = p.strip_suffix("/locks/verify") {
        if *method == Method::POST {
            return locks::verify(state, &canonical_repo(repo), req).await;
        }
        return method_not_allowed();
    }
    if let Some(repo) = p.strip_suffix("/locks") {
        if *method == Method::GET {
            return locks::list(state, &canonical_repo(repo), query).await;
        }
        if *method == Method::POST {
            return locks::create(state, &canonical_repo(repo), req).await;
        }
        return method_not_allowed();
    }
    if let Some(rest) = p.strip_suffix("/unlock") {
        if let Some(idx) = rest.rfind("/locks/") {
            let repo = &rest[..idx];
            let id = &rest[idx + "/locks/".len()..];
            if !id.is_empty() {
                if *method == Method::POST {
                    return locks::unlock(state, &canonical_repo(repo), id, req).await;
                }
                return method_not_allowed();
            }
        }
    }

    // Model-hub file resolution.
    if let Some(idx) = p.rfind("/resolve/") {
        let repo = &p[..idx];
        let refpath = &p[idx + "/resolve/".len()..];
        if *method == Method::GET {
            return hub::resolve(state, repo, refpath, false).await;
        }
        if *method == Method::HEAD {
            return hub::resolve(state, repo, refpath, true).await;
        }
        return method_not_allowed();
    }

    not_found()
}

/// Repository names arrive with or without the `.git` suffix; storage
/// always uses the suffixed form.
fn canonical_repo(name: &str) -> String {
    format!("{}.git", name.strip_suffix(".git").unwrap_or(name))
}

/// Locate an existing repository for `name`, trying the `.git`-suffixed
/// form as well. Escaping the root is rejected before any disk access.
pub(crate) fn find_repo_path(state: &AppState, name: &str) -> ApiResult<PathBuf> {
    let mut candidates = vec![name.to_string()];
    if !name.ends_with(".git") {
        candidates.push(format!("{name}.git"));
    }
    for candidate in candidates {
        let path = clean_join(&state.root, &candidate).ok_or_else(|| {
            ApiError::BadRequest("path outside repository directory".to_string())
        })?;
        if hubd_git::is_repository(&path) {
            return Ok(path);
        }
    }
    Err(ApiError::NotFound(format!("repository {name:?} not found")))
}

/// Run a blocking closure against an opened repository.
pub(crate) async fn with_repo<T, F>(path: PathBuf, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&hubd_git::Repository) -> Result<T, hubd_git::Error> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let repo = hubd_git::Repository::open(&path)?;
        f(&repo)
    })
    .await?;
    result.map_err(Into::into)
}

fn parse_query(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        map.insert(decode_component(key), decode_component(value));
    }
    map
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    percent_decode_str(&s)
        .decode_utf8()
        .map(|c| c.into_owned())
        .unwrap_or_default()
}

fn not_found() -> Response {
    plain(StatusCode::NOT_FOUND, "404 page not found")
}

fn method_not_allowed() -> Response {
    plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}
