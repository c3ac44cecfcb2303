//! Request coordination
//!
//! Per tab and per request kind single-flight: one text analysis and one image
//! batch may be in flight for a tab at any time. Identical text resubmitted
//! while its analysis runs shares the in-flight result; anything else gets a
//! synthetic busy answer. The first-impression call stays outside the locks.

pub mod image;
pub mod image_response;
pub mod text;

pub use image_response::ImageResponse;

use crate::infrastructure::backend::AnalysisBackend;
use crate::service::store::TabStateStore;
use crate::util::errors::{TrustMeterError, TrustMeterResult};
use crate::util::types::{
    AnalysisKind, AnalysisPayload, AnalysisRequest, ImageAnalysis, InitialImpression, SessionId,
    TabId, TextAnalysis,
};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Initial(InitialImpression),
    Text(TextAnalysis),
    Images(Vec<ImageAnalysis>),
}

impl AnalysisOutcome {
    pub fn into_initial(self) -> TrustMeterResult<InitialImpression> {
        match self {
            AnalysisOutcome::Initial(initial) => Ok(initial),
            other => Err(other.unexpected("initial impression")),
        }
    }

    pub fn into_text(self) -> TrustMeterResult<TextAnalysis> {
        match self {
            AnalysisOutcome::Text(result) => Ok(result),
            other => Err(other.unexpected("text analysis")),
        }
    }

    pub fn into_images(self) -> TrustMeterResult<Vec<ImageAnalysis>> {
        match self {
            AnalysisOutcome::Images(results) => Ok(results),
            other => Err(other.unexpected("image results")),
        }
    }

    fn unexpected(&self, wanted: &str) -> TrustMeterError {
        TrustMeterError::Internal(format!("Expected {}, got {:?}", wanted, self))
    }
}

pub struct RequestCoordinator {
    store: Arc<TabStateStore>,
    backend: Arc<dyn AnalysisBackend>,
}

impl RequestCoordinator {
    pub fn new(store: Arc<TabStateStore>, backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { store, backend }
    }

    pub fn store(&self) -> &Arc<TabStateStore> {
        &self.store
    }

    /// Runs one request through the path matching its kind.
    pub async fn run(&self, request: AnalysisRequest) -> TrustMeterResult<AnalysisOutcome> {
        let AnalysisRequest {
            kind,
            tab_id,
            session_id,
            payload,
        } = request;

        match (kind, payload) {
            (AnalysisKind::TextInitial, AnalysisPayload::Text { text, url }) => self
                .initial_impression(session_id, &text, url.as_deref())
                .await
                .map(AnalysisOutcome::Initial),
            (AnalysisKind::Text, AnalysisPayload::Text { text, url }) => self
                .analyze_text(tab_id, session_id, &text, url.as_deref())
                .await
                .map(AnalysisOutcome::Text),
            (AnalysisKind::Image, AnalysisPayload::Images { urls }) => self
                .analyze_images(tab_id, session_id, &urls)
                .await
                .map(AnalysisOutcome::Images),
            (kind, _) => Err(TrustMeterError::InvalidInput(format!(
                "Payload does not match request kind {:?}",
                kind
            ))),
        }
    }

    /// Lightweight first impression; never touches the text lock.
    pub async fn initial_impression(
        &self,
        session_id: SessionId,
        text: &str,
        url: Option<&str>,
    ) -> TrustMeterResult<InitialImpression> {
        if text.trim().is_empty() {
            return Err(TrustMeterError::InvalidInput("No text provided.".to_string()));
        }
        let data = self
            .backend
            .detect_text_initial(&session_id, text, url)
            .await?;
        Ok(InitialImpression {
            initial_analysis: data.get("initial_analysis").cloned().unwrap_or(Value::Null),
            session_id,
        })
    }

    pub fn is_locked(&self, tab_id: TabId, kind: AnalysisKind) -> bool {
        match kind {
            AnalysisKind::Text => self.store.is_text_locked(tab_id),
            AnalysisKind::Image => self.store.is_image_locked(tab_id),
            AnalysisKind::TextInitial => false,
        }
    }
}
