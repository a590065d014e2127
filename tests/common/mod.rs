//! Shared test infrastructure for integration tests
//!
//! Runs the proxy router in-process on an ephemeral port, next to a
//! scripted upstream server standing in for both the file-upload REST API
//! and the part destination. Everything is driven over real HTTP with
//! reqwest.

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::header::ETAG;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, put};
use axum::{Json, Router};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use uplink_proxy::api::{build_router, AppState, CorsSettings, RelayOptions};
use uplink_proxy::config::{AuthMode, CorsConfig, IdExtraction, UpstreamConfig};
use uplink_proxy::storage::MemoryBackend;
use uplink_proxy::upstream::{HttpUpstream, RelayScope};

/// Bind an ephemeral port and serve the router in the background.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

// === Scripted upstream ===

/// What the scripted upstream answers at each step
#[derive(Debug, Clone)]
pub struct UpstreamScript {
    pub fetch_status: u16,
    pub put_status: u16,
    pub patch_status: u16,
    pub etag: String,
    pub descriptor_headers: HashMap<String, String>,
}

impl Default for UpstreamScript {
    fn default() -> Self {
        Self {
            fetch_status: 200,
            put_status: 200,
            patch_status: 200,
            etag: "xyz".to_string(),
            descriptor_headers: HashMap::from([(
                "content-type".to_string(),
                "application/octet-stream".to_string(),
            )]),
        }
    }
}

/// Everything the scripted upstream observed
#[derive(Debug, Default)]
pub struct UpstreamRecord {
    pub fetch_hits: usize,
    pub put_hits: usize,
    pub patch_hits: usize,
    pub fetch_path: Option<String>,
    pub fetch_user_id: Option<String>,
    pub fetch_cookie: Option<String>,
    pub put_headers: HashMap<String, String>,
    pub put_body: Vec<u8>,
    pub patch_body: Option<serde_json::Value>,
    pub patch_cookie: Option<String>,
}

struct MockState {
    script: UpstreamScript,
    record: Mutex<UpstreamRecord>,
    base: String,
}

/// Scripted upstream server handle
pub struct MockUpstream {
    pub base: String,
    state: Arc<MockState>,
}

impl MockUpstream {
    pub async fn start(script: UpstreamScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let state = Arc::new(MockState {
            script,
            record: Mutex::new(UpstreamRecord::default()),
            base: base.clone(),
        });

        let router = Router::new()
            .route(
                "/companies/:company_id/projects/:project_id/file_uploads/:upload_id/parts/:part_number",
                get(mock_fetch_part),
            )
            .route(
                "/companies/:company_id/projects/:project_id/file_uploads/:upload_id",
                patch(mock_patch_segments),
            )
            .route("/dest/obj", put(mock_destination_put))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { base, state }
    }

    pub fn record(&self) -> parking_lot::MutexGuard<'_, UpstreamRecord> {
        self.state.record.lock()
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

async fn mock_fetch_part(
    State(state): State<Arc<MockState>>,
    Path((company_id, project_id, upload_id, part_number)): Path<(String, String, String, u32)>,
    headers: HeaderMap,
) -> Response {
    {
        let mut record = state.record.lock();
        record.fetch_hits += 1;
        record.fetch_path = Some(format!(
            "/companies/{}/projects/{}/file_uploads/{}/parts/{}",
            company_id, project_id, upload_id, part_number
        ));
        record.fetch_user_id = header_string(&headers, "x-upload-user-id");
        record.fetch_cookie = header_string(&headers, "cookie");
    }

    let status = StatusCode::from_u16(state.script.fetch_status).unwrap();
    if !status.is_success() {
        return status.into_response();
    }

    Json(json!({
        "id": "p1",
        "url": format!("{}/dest/obj", state.base),
        "headers": state.script.descriptor_headers.clone(),
    }))
    .into_response()
}

async fn mock_destination_put(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    {
        let mut record = state.record.lock();
        record.put_hits += 1;
        record.put_headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        record.put_body = body.to_vec();
    }

    let status = StatusCode::from_u16(state.script.put_status).unwrap();
    if !status.is_success() {
        return status.into_response();
    }

    (StatusCode::OK, [(ETAG, state.script.etag.clone())], "").into_response()
}

async fn mock_patch_segments(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    {
        let mut record = state.record.lock();
        record.patch_hits += 1;
        record.patch_body = Some(body);
        record.patch_cookie = header_string(&headers, "cookie");
    }

    StatusCode::from_u16(state.script.patch_status)
        .unwrap()
        .into_response()
}

// === Proxy under test ===

/// In-process proxy wired to a memory backend and a scripted upstream
pub struct TestProxy {
    pub base: String,
    pub upstream: MockUpstream,
}

impl TestProxy {
    /// Query-mode proxy with wildcard CORS and header auth
    pub async fn start() -> Self {
        Self::start_with(
            UpstreamScript::default(),
            CorsConfig::default(),
            IdExtraction::Query,
        )
        .await
    }

    pub async fn start_with(
        script: UpstreamScript,
        cors: CorsConfig,
        id_extraction: IdExtraction,
    ) -> Self {
        let upstream = MockUpstream::start(script).await;

        let upstream_config = UpstreamConfig {
            api_base: upstream.base.clone(),
            company_id: "8".to_string(),
            project_id: "8".to_string(),
        };
        let http_upstream =
            Arc::new(HttpUpstream::new(&upstream_config, &cors.user_header).unwrap());
        let cors_settings = Arc::new(CorsSettings::from_config(&cors).unwrap());

        let state = Arc::new(AppState {
            store: Arc::new(MemoryBackend::new()),
            upstream: http_upstream,
            options: RelayOptions {
                scope: RelayScope {
                    company_id: upstream_config.company_id.clone(),
                    project_id: upstream_config.project_id.clone(),
                },
                auth_mode: cors.auth_mode,
                user_header: cors.user_header.clone(),
            },
        });

        let base = serve(build_router(
            state,
            cors_settings,
            id_extraction,
            16 * 1024 * 1024,
        ))
        .await;

        Self { base, upstream }
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base, path_and_query)
    }
}

/// Cookie-forwarding deployment: path-mode ids, exact origin
pub fn cookie_variant_cors() -> CorsConfig {
    CorsConfig {
        origin: "https://app.example.com".to_string(),
        auth_mode: AuthMode::Cookie,
        user_header: "x-upload-user-id".to_string(),
    }
}
