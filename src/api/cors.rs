//! CORS handling
//!
//! Every response the proxy produces — success, error, 404, 405 — carries
//! the CORS headers, and OPTIONS preflights are answered before routing so
//! they succeed for any path and query. Origin and credential behavior
//! come from [`CorsConfig`].

use crate::config::{AuthMode, CorsConfig, ConfigError};
use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";
const PREFLIGHT_MAX_AGE: &str = "86400";

/// Precomputed CORS header values
#[derive(Debug, Clone)]
pub struct CorsSettings {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    expose_headers: HeaderValue,
    allow_credentials: bool,
}

impl CorsSettings {
    pub fn from_config(config: &CorsConfig) -> Result<Self, ConfigError> {
        let allow_origin = HeaderValue::from_str(&config.origin)
            .map_err(|_| ConfigError::Invalid(format!("invalid cors.origin {:?}", config.origin)))?;
        let allow_headers =
            HeaderValue::from_str(&format!("content-type, {}", config.user_header)).map_err(
                |_| ConfigError::Invalid(format!("invalid cors.user_header {:?}", config.user_header)),
            )?;

        Ok(Self {
            allow_origin,
            allow_methods: HeaderValue::from_static(ALLOWED_METHODS),
            allow_headers,
            expose_headers: HeaderValue::from_static("etag"),
            allow_credentials: config.auth_mode == AuthMode::Cookie,
        })
    }

    /// Stamp the CORS headers onto a response. `preflight` additionally
    /// sets the cache lifetime for OPTIONS answers.
    fn apply(&self, response: &mut Response, preflight: bool) {
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, self.expose_headers.clone());
        if self.allow_credentials {
            headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if preflight {
            headers.insert(
                ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_static(PREFLIGHT_MAX_AGE),
            );
        }
    }
}

/// Outermost layer: answers OPTIONS with 204 before routing, and wraps
/// every other response with the CORS headers.
pub async fn cors_middleware(
    State(cors): State<Arc<CorsSettings>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        cors.apply(&mut response, true);
        return response;
    }

    let mut response = next.run(request).await;
    cors.apply(&mut response, false);
    response
}
