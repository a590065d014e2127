//! HTTP surface of the relay proxy

pub mod cors;
mod errors;
pub mod handlers;
pub mod headers;
mod relay;

pub use cors::CorsSettings;
pub use errors::ProxyError;
pub use handlers::{AppState, RelayOptions};

use crate::config::IdExtraction;
use axum::extract::DefaultBodyLimit;
use axum::routing::put;
use axum::{middleware, Router};
use handlers::{delete_dispatch, get_dispatch, post_dispatch, put_dispatch, relay_part_from_path};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Assemble the proxy router.
///
/// Inbound paths:
///   OPTIONS *                      - 204 + CORS (handled before routing)
///   POST   /{key}?action=...       - mpu-create | mpu-complete
///   PUT    /{key}?action=...       - mpu-uploadpart | s3-put
///   GET    /{key}?action=get       - download object
///   DELETE /{key}?action=...       - mpu-abort | delete
///   PUT    /companies/:c/projects/:p/file_uploads/:u/parts/:n
///                                  - relay (only when id_extraction = "path")
pub fn build_router(
    state: Arc<AppState>,
    cors: Arc<CorsSettings>,
    id_extraction: IdExtraction,
    max_body_size: usize,
) -> Router {
    let object_routes = axum::routing::get(get_dispatch)
        .put(put_dispatch)
        .post(post_dispatch)
        .delete(delete_dispatch);

    let mut router = Router::new()
        .route("/", object_routes.clone())
        .route("/*key", object_routes);

    if id_extraction == IdExtraction::Path {
        router = router.route(
            "/companies/:company_id/projects/:project_id/file_uploads/:upload_id/parts/:part_number",
            put(relay_part_from_path),
        );
    }

    router
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        // Added last so it is outermost: preflights never reach the router
        // and error responses still pick up the CORS headers.
        .layer(middleware::from_fn_with_state(cors, cors::cors_middleware))
        .with_state(state)
}
