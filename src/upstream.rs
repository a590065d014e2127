//! Client for the upstream file-upload REST API and part destinations
//!
//! The relay chain talks to two remote parties: the REST API that issues
//! per-part destinations and records completed segments, and the storage
//! destination those descriptors point at. Both sit behind `UpstreamApi`
//! so the chain can be exercised without a network.

use crate::api::headers::ForwardPolicy;
use crate::config::UpstreamConfig;
use crate::types::{CompletionSegment, PartDescriptor};
use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use reqwest::header::{HeaderName, COOKIE, ETAG};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Errors from upstream and destination calls
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The remote answered with a non-2xx status
    #[error("{reason}")]
    Status { status: StatusCode, reason: String },

    #[error("destination response carried no ETag header")]
    MissingEtag,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Client identity forwarded on upstream calls. The cookie is only
/// populated when the deployment runs in cookie auth mode.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub user_id: Option<String>,
    pub cookie: Option<String>,
}

/// Company/project pair the upstream URL templates are built from
#[derive(Debug, Clone)]
pub struct RelayScope {
    pub company_id: String,
    pub project_id: String,
}

/// Seam over the two remote parties of the relay chain
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// GET the part descriptor for one (uploadId, partNumber) pair
    async fn fetch_part(
        &self,
        scope: &RelayScope,
        upload_id: &str,
        part_number: u32,
        auth: &AuthContext,
    ) -> Result<PartDescriptor, UpstreamError>;

    /// PUT the raw part bytes to the descriptor's destination, returning
    /// the destination's ETag
    async fn put_part(
        &self,
        descriptor: &PartDescriptor,
        body: Bytes,
    ) -> Result<String, UpstreamError>;

    /// PATCH one completed segment back to the upstream API
    async fn patch_segments(
        &self,
        scope: &RelayScope,
        upload_id: &str,
        segment: &CompletionSegment,
        auth: &AuthContext,
    ) -> Result<(), UpstreamError>;
}

#[derive(Serialize)]
struct SegmentsBody<'a> {
    segments: &'a [&'a CompletionSegment],
}

/// reqwest-backed implementation of [`UpstreamApi`]
pub struct HttpUpstream {
    client: reqwest::Client,
    api_base: String,
    user_header: HeaderName,
    policy: ForwardPolicy,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig, user_header: &str) -> Result<Self, UpstreamError> {
        let user_header = HeaderName::from_bytes(user_header.as_bytes())
            .map_err(|_| UpstreamError::Config(format!("invalid header name {:?}", user_header)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            user_header,
            policy: ForwardPolicy::destination(),
        })
    }

    fn part_url(&self, scope: &RelayScope, upload_id: &str, part_number: u32) -> String {
        format!(
            "{}/companies/{}/projects/{}/file_uploads/{}/parts/{}",
            self.api_base, scope.company_id, scope.project_id, upload_id, part_number
        )
    }

    fn upload_url(&self, scope: &RelayScope, upload_id: &str) -> String {
        format!(
            "{}/companies/{}/projects/{}/file_uploads/{}",
            self.api_base, scope.company_id, scope.project_id, upload_id
        )
    }

    fn with_auth(&self, req: reqwest::RequestBuilder, auth: &AuthContext) -> reqwest::RequestBuilder {
        let req = match &auth.user_id {
            Some(user_id) => req.header(self.user_header.clone(), user_id),
            None => req,
        };
        match &auth.cookie {
            Some(cookie) => req.header(COOKIE, cookie),
            None => req,
        }
    }
}

/// Turn a non-2xx response into a `Status` error carrying the reason phrase.
fn status_error(status: StatusCode) -> UpstreamError {
    UpstreamError::Status {
        status,
        reason: status
            .canonical_reason()
            .unwrap_or("Unknown Status")
            .to_string(),
    }
}

#[async_trait]
impl UpstreamApi for HttpUpstream {
    async fn fetch_part(
        &self,
        scope: &RelayScope,
        upload_id: &str,
        part_number: u32,
        auth: &AuthContext,
    ) -> Result<PartDescriptor, UpstreamError> {
        let url = self.part_url(scope, upload_id, part_number);
        debug!("GET {}", url);

        let response = self
            .with_auth(self.client.get(&url), auth)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        response
            .json::<PartDescriptor>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    async fn put_part(
        &self,
        descriptor: &PartDescriptor,
        body: Bytes,
    ) -> Result<String, UpstreamError> {
        let headers = self.policy.filter(&descriptor.headers);
        debug!("PUT {} ({} bytes)", descriptor.url, body.len());

        let response = self
            .client
            .put(&descriptor.url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        // Some runtimes lower-case header names; HeaderMap lookups are
        // case-insensitive either way.
        response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .ok_or(UpstreamError::MissingEtag)
    }

    async fn patch_segments(
        &self,
        scope: &RelayScope,
        upload_id: &str,
        segment: &CompletionSegment,
        auth: &AuthContext,
    ) -> Result<(), UpstreamError> {
        let url = self.upload_url(scope, upload_id);
        debug!("PATCH {}", url);

        let response = self
            .with_auth(self.client.patch(&url), auth)
            .json(&SegmentsBody {
                segments: &[segment],
            })
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream() -> HttpUpstream {
        let config = UpstreamConfig {
            api_base: "http://localhost:7000/rest/v2.0/".to_string(),
            company_id: "8".to_string(),
            project_id: "9".to_string(),
        };
        HttpUpstream::new(&config, "x-upload-user-id").unwrap()
    }

    fn scope() -> RelayScope {
        RelayScope {
            company_id: "8".to_string(),
            project_id: "9".to_string(),
        }
    }

    #[test]
    fn test_part_url_strips_trailing_slash() {
        let url = upstream().part_url(&scope(), "abc", 3);
        assert_eq!(
            url,
            "http://localhost:7000/rest/v2.0/companies/8/projects/9/file_uploads/abc/parts/3"
        );
    }

    #[test]
    fn test_upload_url() {
        let url = upstream().upload_url(&scope(), "abc");
        assert_eq!(
            url,
            "http://localhost:7000/rest/v2.0/companies/8/projects/9/file_uploads/abc"
        );
    }

    #[test]
    fn test_invalid_user_header_rejected() {
        let result = HttpUpstream::new(&UpstreamConfig::default(), "bad header\n");
        assert!(matches!(result, Err(UpstreamError::Config(_))));
    }

    #[test]
    fn test_segments_body_shape() {
        let segment = CompletionSegment {
            etag: "xyz".to_string(),
            part_number: 2,
        };
        let json = serde_json::to_value(SegmentsBody {
            segments: &[&segment],
        })
        .unwrap();
        assert_eq!(json["segments"][0]["etag"], "xyz");
        assert_eq!(json["segments"][0]["part_number"], 2);
    }
}
