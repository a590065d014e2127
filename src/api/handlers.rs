//! Proxy request handlers
//!
//! Dispatch is method-first (axum's method routers answer 405 with an
//! Allow header for anything unsupported), then on the `action` query
//! discriminator. The path-parameterized relay route is mounted only for
//! deployments configured with `id_extraction = "path"`.

use super::errors::ProxyError;
use super::relay::relay_part_upload;
use crate::config::AuthMode;
use crate::storage::ObjectStore;
use crate::types::CompleteRequest;
use crate::upstream::{AuthContext, RelayScope, UpstreamApi};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, ETAG, LAST_MODIFIED};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub upstream: Arc<dyn UpstreamApi>,
    pub options: RelayOptions,
}

/// Per-deployment knobs the collapsed handler is parameterized by
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Company/project scope used when identifiers come from the query
    pub scope: RelayScope,
    pub auth_mode: AuthMode,
    /// Name of the user-identifier header to forward
    pub user_header: String,
}

/// Query parameters shared by all object routes
#[derive(Debug, Deserialize, Default)]
pub struct ActionQuery {
    pub action: Option<String>,
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    #[serde(rename = "partNumber")]
    pub part_number: Option<u32>,
}

/// Normalize the wildcard path segment into a bucket key. The root route
/// has no segment at all, which maps to the empty key.
fn object_key(path: Option<Path<String>>) -> String {
    path.map(|Path(k)| k.trim_start_matches('/').to_string())
        .unwrap_or_default()
}

/// Pull forwarded identity off the inbound request per the deployment's
/// auth mode.
fn auth_context(headers: &HeaderMap, options: &RelayOptions) -> AuthContext {
    let user_id = headers
        .get(options.user_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let cookie = match options.auth_mode {
        AuthMode::Cookie => headers
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
        AuthMode::Header => None,
    };

    AuthContext { user_id, cookie }
}

fn require<T>(value: Option<T>, name: &'static str) -> Result<T, ProxyError> {
    value.ok_or(ProxyError::MissingParam(name))
}

/// POST dispatch: mpu-create | mpu-complete
#[instrument(skip(state, body))]
pub async fn post_dispatch(
    State(state): State<Arc<AppState>>,
    path: Option<Path<String>>,
    Query(query): Query<ActionQuery>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let key = object_key(path);
    match query.action.as_deref() {
        Some("mpu-create") => {
            info!("CreateMultipartUpload {}", key);
            let target = state.store.create_multipart(&key).await?;
            Ok(Json(target).into_response())
        }
        Some("mpu-complete") => {
            let upload_id = require(query.upload_id, "uploadId")?;
            info!("CompleteMultipartUpload {} uploadId={}", key, upload_id);

            let complete: CompleteRequest =
                serde_json::from_slice(&body).map_err(|_| ProxyError::IncompleteBody)?;

            let etag = state
                .store
                .complete(&key, &upload_id, &complete.parts)
                .await?;
            Ok((StatusCode::OK, [("etag", etag)], "").into_response())
        }
        Some(other) => Err(unknown_action(other, Method::POST)),
        None => Err(ProxyError::MissingAction),
    }
}

/// PUT dispatch: mpu-uploadpart | s3-put (query-mode relay)
#[instrument(skip(state, headers, body))]
pub async fn put_dispatch(
    State(state): State<Arc<AppState>>,
    path: Option<Path<String>>,
    Query(query): Query<ActionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let key = object_key(path);
    match query.action.as_deref() {
        Some("mpu-uploadpart") => {
            let (upload_id, part_number) = match (query.upload_id, query.part_number) {
                (Some(u), Some(p)) => (u, p),
                _ => return Err(ProxyError::MissingParam("partNumber or uploadId")),
            };
            if body.is_empty() {
                return Err(ProxyError::MissingBody);
            }
            info!(
                "UploadPart {} part={} uploadId={}",
                key, part_number, upload_id
            );

            let part = state
                .store
                .upload_part(&key, &upload_id, part_number, body)
                .await?;
            Ok(Json(part).into_response())
        }
        Some("s3-put") => {
            let (upload_id, part_number) = match (query.upload_id, query.part_number) {
                (Some(u), Some(p)) => (u, p),
                _ => return Err(ProxyError::MissingParam("partNumber or uploadId")),
            };
            info!("RelayPart part={} uploadId={}", part_number, upload_id);

            let auth = auth_context(&headers, &state.options);
            let receipt = relay_part_upload(
                state.upstream.as_ref(),
                &state.options.scope,
                &upload_id,
                part_number,
                body,
                &auth,
            )
            .await?;
            Ok(Json(receipt).into_response())
        }
        Some(other) => Err(unknown_action(other, Method::PUT)),
        None => Err(ProxyError::MissingAction),
    }
}

/// Path-mode relay: PUT /companies/:c/projects/:p/file_uploads/:u/parts/:n
#[instrument(skip(state, headers, body))]
pub async fn relay_part_from_path(
    State(state): State<Arc<AppState>>,
    Path((company_id, project_id, upload_id, part_number)): Path<(String, String, String, u32)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    info!(
        "RelayPart company={} project={} part={} uploadId={}",
        company_id, project_id, part_number, upload_id
    );

    let scope = RelayScope {
        company_id,
        project_id,
    };
    let auth = auth_context(&headers, &state.options);
    let receipt = relay_part_upload(
        state.upstream.as_ref(),
        &scope,
        &upload_id,
        part_number,
        body,
        &auth,
    )
    .await?;
    Ok(Json(receipt).into_response())
}

/// GET dispatch: get
#[instrument(skip(state))]
pub async fn get_dispatch(
    State(state): State<Arc<AppState>>,
    path: Option<Path<String>>,
    Query(query): Query<ActionQuery>,
) -> Result<Response, ProxyError> {
    let key = object_key(path);
    match query.action.as_deref() {
        Some("get") => {
            info!("GET {}", key);
            let object = state.store.get(&key).await?;

            let meta = &object.metadata;
            let mut headers = HeaderMap::new();
            headers.insert(ETAG, hval(&meta.etag));
            headers.insert(CONTENT_LENGTH, hval(&meta.content_length.to_string()));
            headers.insert(
                CONTENT_TYPE,
                hval(
                    meta.content_type
                        .as_deref()
                        .unwrap_or("application/octet-stream"),
                ),
            );
            headers.insert(
                LAST_MODIFIED,
                hval(
                    &meta
                        .last_modified
                        .format("%a, %d %b %Y %H:%M:%S GMT")
                        .to_string(),
                ),
            );

            Ok((StatusCode::OK, headers, Body::from_stream(object.body)).into_response())
        }
        Some(other) => Err(unknown_action(other, Method::GET)),
        None => Err(ProxyError::MissingAction),
    }
}

/// DELETE dispatch: mpu-abort | delete
#[instrument(skip(state))]
pub async fn delete_dispatch(
    State(state): State<Arc<AppState>>,
    path: Option<Path<String>>,
    Query(query): Query<ActionQuery>,
) -> Result<Response, ProxyError> {
    let key = object_key(path);
    match query.action.as_deref() {
        Some("mpu-abort") => {
            let upload_id = require(query.upload_id, "uploadId")?;
            info!("AbortMultipartUpload {} uploadId={}", key, upload_id);
            state.store.abort(&key, &upload_id).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Some("delete") => {
            info!("DELETE {}", key);
            state.store.delete(&key).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Some(other) => Err(unknown_action(other, Method::DELETE)),
        None => Err(ProxyError::MissingAction),
    }
}

fn unknown_action(action: &str, method: Method) -> ProxyError {
    ProxyError::UnknownAction {
        action: action.to_string(),
        method,
    }
}

fn hval(s: &str) -> HeaderValue {
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static(""))
}
