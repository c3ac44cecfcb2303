//! HTTP client for the analysis backend
//!
//! Every call carries the session id in the `X-Session-ID` header and, for JSON
//! object bodies, as a `session_id` field. Calls are bounded by a wall-clock
//! timeout and are never retried.

use super::{
    AnalysisBackend, CANCEL_SESSION, DETECT_IMAGE, DETECT_TEXT, DETECT_TEXT_INITIAL, HEALTH,
    SESSION_TASKS,
};
use crate::service::config::BackendConfig;
use crate::util::errors::{BackendError, BackendResult};
use crate::util::types::SessionId;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

pub const SESSION_HEADER: &str = "X-Session-ID";

pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Self {
        let mut default_headers = HeaderMap::new();
        match HeaderValue::from_str(&config.user_agent) {
            Ok(value) => {
                default_headers.insert(USER_AGENT, value);
            }
            Err(_) => warn!("Invalid user agent in backend config (skipping): {}", config.user_agent),
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .use_rustls_tls()
            .default_headers(default_headers)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to create HTTP client, using default config: {}", e);
                reqwest::Client::new()
            });

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Performs one bounded call and normalizes every failure into `BackendError`.
    pub async fn call(
        &self,
        endpoint: &str,
        method: Method,
        session_id: Option<&SessionId>,
        query: &[(&str, &str)],
        body: Option<Value>,
        timeout: Duration,
    ) -> BackendResult<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut request = self.http.request(method.clone(), &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(session_id) = session_id {
            request = request.header(SESSION_HEADER, session_id.as_str());
        }
        if let Some(mut body) = body {
            if let (Some(session_id), Some(fields)) = (session_id, body.as_object_mut()) {
                fields
                    .entry("session_id")
                    .or_insert_with(|| Value::String(session_id.to_string()));
            }
            request = request.json(&body);
        }

        debug!("Backend call: method={}, endpoint={}", method, endpoint);

        // Dropping the in-flight future on expiry aborts the underlying request.
        let outcome = tokio::time::timeout(timeout, async move {
            let response = request
                .send()
                .await
                .map_err(|e| BackendError::Connect(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(BackendError::Transport {
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or_default().to_string(),
                });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| BackendError::Connect(e.to_string()))?;
            parse_body(&bytes)
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn post(&self, endpoint: &str, session_id: &SessionId, body: Value) -> BackendResult<Value> {
        self.call(
            endpoint,
            Method::POST,
            Some(session_id),
            &[],
            Some(body),
            self.request_timeout,
        )
        .await
    }

    /// Backend liveness probe (`GET /health`).
    pub async fn health(&self) -> BackendResult<Value> {
        self.call(HEALTH, Method::GET, None, &[], None, self.request_timeout)
            .await
    }
}

/// Empty bodies decode to `null`; an `error` field on a JSON object is an
/// application-level failure regardless of the HTTP status.
fn parse_body(bytes: &[u8]) -> BackendResult<Value> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Value::Null);
    }

    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| BackendError::Decode(e.to_string()))?;

    match value.get("error") {
        None | Some(Value::Null) => Ok(value),
        Some(Value::String(message)) => Err(BackendError::Backend {
            message: message.clone(),
        }),
        Some(other) => {
            let message = other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string());
            Err(BackendError::Backend { message })
        }
    }
}

#[async_trait]
impl AnalysisBackend for BackendClient {
    async fn detect_text_initial(
        &self,
        session_id: &SessionId,
        text: &str,
        url: Option<&str>,
    ) -> BackendResult<Value> {
        self.post(DETECT_TEXT_INITIAL, session_id, json!({ "text": text, "url": url }))
            .await
    }

    async fn detect_text(
        &self,
        session_id: &SessionId,
        text: &str,
        url: Option<&str>,
    ) -> BackendResult<Value> {
        self.post(DETECT_TEXT, session_id, json!({ "text": text, "url": url }))
            .await
    }

    async fn detect_image(&self, session_id: &SessionId, urls: &[String]) -> BackendResult<Value> {
        self.post(DETECT_IMAGE, session_id, json!({ "urls": urls }))
            .await
    }

    async fn cancel_session(&self, session_id: &SessionId) -> BackendResult<()> {
        self.post(CANCEL_SESSION, session_id, json!({})).await?;
        Ok(())
    }

    async fn session_tasks(&self, session_id: &SessionId) -> BackendResult<Value> {
        self.call(
            SESSION_TASKS,
            Method::GET,
            Some(session_id),
            &[("session_id", session_id.as_str())],
            None,
            self.request_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::parse_body;
    use crate::util::errors::BackendError;
    use serde_json::json;

    #[test]
    fn error_field_becomes_backend_error() {
        let err = parse_body(br#"{"error":"Text too short"}"#).unwrap_err();
        assert_eq!(
            err,
            BackendError::Backend {
                message: "Text too short".to_string()
            }
        );
    }

    #[test]
    fn structured_error_field_uses_its_message() {
        let err = parse_body(br#"{"error":{"message":"quota exceeded","code":7}}"#).unwrap_err();
        assert_eq!(
            err,
            BackendError::Backend {
                message: "quota exceeded".to_string()
            }
        );
    }

    #[test]
    fn null_error_field_is_not_a_failure() {
        let value = parse_body(br#"{"score":0.4,"error":null}"#).unwrap();
        assert_eq!(value["score"], json!(0.4));
    }

    #[test]
    fn empty_body_decodes_to_null() {
        assert_eq!(parse_body(b"  \n").unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn garbage_body_is_a_decode_error() {
        assert!(matches!(
            parse_body(b"<html>oops</html>"),
            Err(BackendError::Decode(_))
        ));
    }
}
