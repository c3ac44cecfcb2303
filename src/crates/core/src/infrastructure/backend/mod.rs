//! Remote analysis backend
//!
//! `AnalysisBackend` is the seam the coordinator and session registry talk to;
//! `BackendClient` is the HTTP implementation.

pub mod client;

pub use client::{BackendClient, SESSION_HEADER};

use crate::util::errors::BackendResult;
use crate::util::types::SessionId;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::future::Future;

pub const DETECT_TEXT_INITIAL: &str = "/detect_text_initial";
pub const DETECT_TEXT: &str = "/detect_text";
pub const DETECT_IMAGE: &str = "/detect_image";
pub const CANCEL_SESSION: &str = "/cancel_session";
pub const SESSION_TASKS: &str = "/session_tasks";
pub const HEALTH: &str = "/health";

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn detect_text_initial(
        &self,
        session_id: &SessionId,
        text: &str,
        url: Option<&str>,
    ) -> BackendResult<Value>;

    async fn detect_text(
        &self,
        session_id: &SessionId,
        text: &str,
        url: Option<&str>,
    ) -> BackendResult<Value>;

    async fn detect_image(&self, session_id: &SessionId, urls: &[String]) -> BackendResult<Value>;

    async fn cancel_session(&self, session_id: &SessionId) -> BackendResult<()>;

    async fn session_tasks(&self, session_id: &SessionId) -> BackendResult<Value>;
}

/// Best-effort send: runs `call` on a detached task and never reports back.
///
/// The caller is not blocked, nothing is retried, and a failure is only logged.
/// Delivery is not guaranteed; the runtime may shut down before the call lands.
pub fn send_best_effort<F, T>(label: &'static str, call: F)
where
    F: Future<Output = BackendResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        match call.await {
            Ok(_) => debug!("Best-effort backend call delivered: call={}", label),
            Err(e) => warn!("Best-effort backend call failed: call={}, error={}", label, e),
        }
    });
}
