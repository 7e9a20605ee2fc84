use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::error::NotifyError;
use crate::event::{BadgePayload, is_unknown_status};
use crate::util::url::normalize_url;

const STATUS_PATH: &str = "/status";
const CORRELATION_HEADER: &str = "x-correlation-id";
const BODY_PREVIEW_LIMIT: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Unknown results are never forwarded.
    Skipped,
    /// The badge server answered; its status code is informational only.
    Delivered { status: u16 },
}

#[derive(Clone)]
pub struct BadgeClient {
    http: reqwest::Client,
}

impl BadgeClient {
    /// Build a client; `None` timeouts keep the HTTP client defaults.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Client`] if the underlying HTTP client fails to
    /// build.
    pub fn new(
        timeout: Option<Duration>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, NotifyError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("badge-relay/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        let http = builder
            .build()
            .map_err(|source| NotifyError::Client { source })?;
        Ok(Self { http })
    }

    /// Forward `status` for `pipeline` to `{base_url}/status`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidUrl`] for an unusable base URL,
    /// [`NotifyError::Transport`] when the request or body read fails, and
    /// [`NotifyError::InvalidResponse`] when the server answers with a
    /// non-JSON body.
    pub async fn notify(
        &self,
        pipeline: &str,
        status: &str,
        base_url: &str,
    ) -> Result<NotifyOutcome, NotifyError> {
        if is_unknown_status(status) {
            info!(pipeline, "not sending UNKNOWN pipeline result to build badge");
            return Ok(NotifyOutcome::Skipped);
        }

        let url = status_url(base_url)?;
        let payload = BadgePayload {
            pipeline: pipeline.to_string(),
            status: status.to_string(),
        };
        let correlation_id = Uuid::now_v7().to_string();
        info!(
            %url,
            %correlation_id,
            pipeline = %payload.pipeline,
            status = %payload.status,
            "posting badge status"
        );

        let started = Instant::now();
        let response = self
            .http
            .post(url)
            .header(CORRELATION_HEADER, &correlation_id)
            .json(&payload)
            .send()
            .await?;
        let code = response.status();
        let body = response.bytes().await?;

        if !body.iter().all(u8::is_ascii_whitespace) {
            let parsed: Value =
                serde_json::from_slice(&body).map_err(|err| NotifyError::InvalidResponse {
                    message: format!("{err}; body preview: {}", body_preview(&body)),
                })?;
            info!(%correlation_id, status = %code, response = %parsed, "response from badge server");
        }
        debug!(
            %correlation_id,
            latency_ms = started.elapsed().as_millis(),
            "badge update finished"
        );

        Ok(NotifyOutcome::Delivered {
            status: code.as_u16(),
        })
    }
}

/// `{base_url}/status`, normalized.
///
/// # Errors
///
/// Returns [`NotifyError::InvalidUrl`] when the result is not an absolute
/// http(s) URL.
pub fn status_url(base_url: &str) -> Result<Url, NotifyError> {
    let raw = format!("{base_url}{STATUS_PATH}");
    let url = normalize_url(&raw).map_err(|err| NotifyError::InvalidUrl {
        url: raw.clone(),
        message: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(NotifyError::InvalidUrl {
            url: raw,
            message: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}

fn body_preview(body: &[u8]) -> String {
    let end = body.len().min(BODY_PREVIEW_LIMIT);
    let mut preview = String::from_utf8_lossy(&body[..end]).to_string();
    if body.len() > BODY_PREVIEW_LIMIT {
        preview.push_str("...");
    }
    preview.replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::{BadgeClient, NotifyOutcome, body_preview, status_url};
    use crate::error::NotifyError;

    fn url(base: &str) -> String {
        match status_url(base) {
            Ok(url) => url.to_string(),
            Err(err) => panic!("unexpected error for {base}: {err}"),
        }
    }

    #[test]
    fn status_url_appends_and_normalizes() {
        assert_eq!(url("http://host/"), "http://host/status");
        assert_eq!(url("http://host"), "http://host/status");
        assert_eq!(url("https://host/badges/"), "https://host/badges/status");
        assert_eq!(url("http://host/a/../b"), "http://host/b/status");
    }

    #[test]
    fn status_url_rejects_unusable_bases() {
        assert!(matches!(
            status_url("badge.example"),
            Err(NotifyError::InvalidUrl { .. })
        ));
        assert!(matches!(
            status_url("ftp://badge.example"),
            Err(NotifyError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_status_is_skipped_without_io() {
        let client = match BadgeClient::new(None, None) {
            Ok(client) => client,
            Err(err) => panic!("client: {err}"),
        };
        // The base URL is never parsed for unknown results.
        let outcome = client.notify("demo", "uNkNoWn", "not a url").await;
        assert!(matches!(outcome, Ok(NotifyOutcome::Skipped)));
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let body = vec![b'x'; 300];
        let preview = body_preview(&body);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), 259);
    }
}
