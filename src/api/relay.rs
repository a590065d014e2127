//! Proxied part-upload chain
//!
//! Three dependent calls, strictly sequential: fetch the part descriptor
//! from the upstream API, PUT the raw bytes to the destination it names,
//! then PATCH the completed segment back. The first non-2xx answer ends
//! the chain; later steps are never issued after a failure.

use super::errors::ProxyError;
use crate::types::{CompletionSegment, RelayReceipt};
use crate::upstream::{AuthContext, RelayScope, UpstreamApi, UpstreamError};
use axum::http::StatusCode;
use bytes::Bytes;
use tracing::{debug, instrument};

/// Run the chain for one part and compose the success receipt.
#[instrument(skip(upstream, body, auth), fields(body_len = body.len()))]
pub async fn relay_part_upload(
    upstream: &dyn UpstreamApi,
    scope: &RelayScope,
    upload_id: &str,
    part_number: u32,
    body: Bytes,
    auth: &AuthContext,
) -> Result<RelayReceipt, ProxyError> {
    if body.is_empty() {
        return Err(ProxyError::MissingBody);
    }

    let descriptor = upstream
        .fetch_part(scope, upload_id, part_number, auth)
        .await
        .map_err(|e| step_error("Failed to fetch part", e))?;
    debug!(id = %descriptor.id, url = %descriptor.url, "part destination resolved");

    let etag = upstream
        .put_part(&descriptor, body)
        .await
        .map_err(|e| step_error("Failed to upload part", e))?;

    let segment = CompletionSegment {
        etag: etag.clone(),
        part_number,
    };
    upstream
        .patch_segments(scope, upload_id, &segment, auth)
        .await
        .map_err(|e| step_error("Failed to update segments", e))?;

    Ok(RelayReceipt {
        id: descriptor.id,
        part_number,
        status: "success".to_string(),
        etag,
    })
}

/// Upstream statuses pass through verbatim; transport-level failures have
/// no status to propagate and come back as 502.
fn step_error(context: &str, err: UpstreamError) -> ProxyError {
    match err {
        UpstreamError::Status { status, reason } => ProxyError::Upstream {
            status,
            reason: format!("{}: {}", context, reason),
        },
        other => ProxyError::Upstream {
            status: StatusCode::BAD_GATEWAY,
            reason: format!("{}: {}", context, other),
        },
    }
}
