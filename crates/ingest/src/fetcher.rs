//! HTTP fetching of feed payloads with timeout and size caps.

use tracing::debug;

/// Typed fetch failure. Fetch errors never propagate to API callers; the
/// scheduler folds them into fetch-log and health bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("DNS resolution failed: {0}")]
    Dns(String),
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("HTTP status {0}")]
    Http(u16),
    #[error("response body was empty")]
    EmptyBody,
    #[error("response body exceeded {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Whether the failure should be logged as a timeout outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// A successfully fetched feed payload.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub body: String,
    pub content_type: Option<String>,
    pub status: u16,
}

/// Reqwest-backed fetcher shared by all feed workers.
pub struct Fetcher {
    client: reqwest::Client,
    max_body_bytes: u64,
}

impl Fetcher {
    pub fn new(config: &newswire_core::config::FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("newswire/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// GET the URL, enforcing the body size cap while streaming.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPayload, FetchError> {
        debug!(url = %url, "fetching feed");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(FetchError::Http(status));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut body: Vec<u8> = Vec::new();
        let mut response = response;
        while let Some(chunk) = response.chunk().await.map_err(classify_reqwest_error)? {
            if body.len() as u64 + chunk.len() as u64 > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        Ok(FetchedPayload {
            body: String::from_utf8_lossy(&body).into_owned(),
            content_type,
            status,
        })
    }
}

/// Map a reqwest error onto the fetch-error taxonomy.
fn classify_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        return FetchError::Timeout;
    }
    let detail = source_chain(&e);
    let lowered = detail.to_lowercase();
    if lowered.contains("dns") || lowered.contains("name or service not known") {
        FetchError::Dns(detail)
    } else if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("ssl") {
        FetchError::Tls(detail)
    } else {
        FetchError::Network(detail)
    }
}

fn source_chain(e: &dyn std::error::Error) -> String {
    let mut parts = vec![e.to_string()];
    let mut current = e.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(FetchError::Http(404).to_string(), "HTTP status 404");
        assert_eq!(
            FetchError::TooLarge { limit: 100 }.to_string(),
            "response body exceeded 100 bytes"
        );
        assert!(FetchError::Timeout.is_timeout());
        assert!(!FetchError::EmptyBody.is_timeout());
    }
}
