//! Destination header forwarding policy
//!
//! Part descriptors carry the exact headers their destination expects on
//! the PUT. Forwarding them wholesale breaks: the proxy re-frames the
//! body, so hop-specific headers must not survive the hop.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use tracing::warn;

/// Headers never forwarded to a part destination.
///
/// content-md5 is stripped because the proxy cannot guarantee a matching
/// MD5 for the body it forwards; content-length and host are owned by the
/// HTTP client issuing the PUT.
const DENIED: &[&str] = &["content-md5", "content-length", "host"];

/// Denylist-driven header transformation, applied between the descriptor's
/// header map and the outbound PUT.
#[derive(Debug, Clone)]
pub struct ForwardPolicy {
    denied: &'static [&'static str],
}

impl ForwardPolicy {
    /// Policy for part-destination PUTs
    pub fn destination() -> Self {
        Self { denied: DENIED }
    }

    fn is_denied(&self, name: &str) -> bool {
        self.denied.iter().any(|d| d.eq_ignore_ascii_case(name))
    }

    /// Convert a descriptor header map into request headers, dropping
    /// denied names and anything that is not a valid HTTP header.
    pub fn filter(&self, raw: &HashMap<String, String>) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(raw.len());
        for (name, value) in raw {
            if self.is_denied(name) {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => {
                    warn!("dropping malformed destination header {:?}", name);
                }
            }
        }
        headers
    }
}
