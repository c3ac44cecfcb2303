//! Dispatch Router
//!
//! Entry point for every request coming from a content script or the popup.
//! Resolves the tab and its session, runs the request and turns the outcome
//! into a reply plus, where the extension expects them, pushes to the tab.

use crate::infrastructure::backend::AnalysisBackend;
use crate::infrastructure::host::{
    is_push_echo, AcceptedAck, ImageBatchSummary, InboundMessage, OutboundMessage, RequestType,
    SessionCancelledAck, TabHost,
};
use crate::service::coordinator::{AnalysisOutcome, RequestCoordinator};
use crate::service::session::{CancelDelivery, SessionRegistry};
use crate::service::store::TabStateStore;
use crate::util::errors::TrustMeterError;
use crate::util::types::{AnalysisKind, AnalysisPayload, AnalysisRequest, SessionId, TabId};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;

/// Who sent a request. `tab_id` is `None` for senders without a tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderContext {
    pub tab_id: Option<TabId>,
}

impl SenderContext {
    pub fn tab(tab_id: TabId) -> Self {
        Self {
            tab_id: Some(tab_id).filter(|t| !t.is_none()),
        }
    }

    pub fn popup() -> Self {
        Self { tab_id: None }
    }

    /// Key used for per-tab state; the popup shares the "no tab" key.
    fn state_key(&self) -> TabId {
        self.tab_id.unwrap_or(TabId::NONE)
    }
}

pub struct DispatchRouter {
    registry: Arc<SessionRegistry>,
    coordinator: Arc<RequestCoordinator>,
    backend: Arc<dyn AnalysisBackend>,
    host: Arc<dyn TabHost>,
}

impl DispatchRouter {
    /// Wires a registry and a coordinator over one fresh state store.
    pub fn new(backend: Arc<dyn AnalysisBackend>, host: Arc<dyn TabHost>) -> Self {
        let store = Arc::new(TabStateStore::new());
        Self {
            registry: Arc::new(SessionRegistry::new(store.clone(), backend.clone())),
            coordinator: Arc::new(RequestCoordinator::new(store, backend.clone())),
            backend,
            host,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &Arc<RequestCoordinator> {
        &self.coordinator
    }

    /// Handles a raw JSON message. Messages without a `type` are ignored.
    pub async fn handle_value(&self, raw: Value, sender: SenderContext) -> Option<OutboundMessage> {
        let Some(message_type) = raw.get("type").and_then(Value::as_str) else {
            debug!("Ignoring message without a type");
            return None;
        };
        if is_push_echo(message_type) {
            return None;
        }
        match serde_json::from_value::<InboundMessage>(raw) {
            Ok(message) => self.handle(message, sender).await,
            Err(e) => {
                warn!("Rejected malformed message: error={}", e);
                let err = TrustMeterError::InvalidInput(format!("Malformed message: {}", e));
                Some(OutboundMessage::error(&err, None))
            }
        }
    }

    /// Handles one typed message; `None` means no reply is owed.
    pub async fn handle(
        &self,
        message: InboundMessage,
        sender: SenderContext,
    ) -> Option<OutboundMessage> {
        let Some(request_type) = RequestType::parse(&message.message_type) else {
            if is_push_echo(&message.message_type) {
                return None;
            }
            warn!("Unknown message type: type={}", message.message_type);
            let err = TrustMeterError::UnknownRequestType(message.message_type);
            return Some(OutboundMessage::error(&err, None));
        };

        let reply = match request_type {
            RequestType::AnalyzeTextInitial => self.analyze_text_initial(message, sender),
            RequestType::AnalyzeText => self.analyze_text(message, sender).await,
            RequestType::AnalyzeImage => self.analyze_image(message, sender).await,
            RequestType::CancelSession => self.cancel_session(message, sender).await,
            RequestType::CheckSessionTasks => self.check_session_tasks(message, sender).await,
        };
        Some(reply)
    }

    fn resolve_session(&self, message: &InboundMessage, sender: SenderContext) -> SessionId {
        message
            .payload
            .session_id
            .clone()
            .unwrap_or_else(|| self.registry.get_or_create(sender.state_key()))
    }

    /// Push to the sender's tab; failures (tab gone, no listener) are dropped.
    async fn push(&self, sender: SenderContext, message: OutboundMessage) {
        let Some(tab_id) = sender.tab_id else {
            return;
        };
        if let Err(e) = self.host.send_to_tab(tab_id, message).await {
            debug!("Push not delivered: tab_id={}, error={}", tab_id, e);
        }
    }

    async fn fail(
        &self,
        sender: SenderContext,
        err: &TrustMeterError,
        session_id: SessionId,
    ) -> OutboundMessage {
        let reply = OutboundMessage::error(err, Some(session_id));
        self.push(sender, reply.clone()).await;
        reply
    }

    fn analyze_text_initial(&self, message: InboundMessage, sender: SenderContext) -> OutboundMessage {
        let session_id = self.resolve_session(&message, sender);
        let text = message.payload.text.unwrap_or_default();
        let url = message.payload.url;
        let coordinator = self.coordinator.clone();
        let host = self.host.clone();

        let request = AnalysisRequest {
            kind: AnalysisKind::TextInitial,
            tab_id: sender.state_key(),
            session_id,
            payload: AnalysisPayload::Text { text, url },
        };

        tokio::spawn(async move {
            match coordinator
                .run(request)
                .await
                .and_then(AnalysisOutcome::into_initial)
            {
                Ok(initial) => {
                    let Some(tab_id) = sender.tab_id else {
                        return;
                    };
                    if let Err(e) = host
                        .send_to_tab(tab_id, OutboundMessage::TextInitialResult(initial))
                        .await
                    {
                        debug!("Initial result not delivered: tab_id={}, error={}", tab_id, e);
                    }
                }
                Err(e) => error!("Initial analysis request failed: error={}", e),
            }
        });

        OutboundMessage::Accepted(AcceptedAck { received: true })
    }

    async fn analyze_text(&self, message: InboundMessage, sender: SenderContext) -> OutboundMessage {
        let session_id = self.resolve_session(&message, sender);
        let tab_id = sender.state_key();
        let request = AnalysisRequest {
            kind: AnalysisKind::Text,
            tab_id,
            session_id: session_id.clone(),
            payload: AnalysisPayload::Text {
                text: message.payload.text.unwrap_or_default(),
                url: message.payload.url,
            },
        };

        match self
            .coordinator
            .run(request)
            .await
            .and_then(AnalysisOutcome::into_text)
        {
            Ok(result) => {
                debug!(
                    "Text analysis complete: tab_id={}, score={}, source_tag={:?}",
                    tab_id, result.score, result.source_tag
                );
                OutboundMessage::TextAnalysisResult(result)
            }
            Err(e) => {
                error!("Text analysis failed: tab_id={}, error={}", tab_id, e);
                self.fail(sender, &e, session_id).await
            }
        }
    }

    async fn analyze_image(&self, message: InboundMessage, sender: SenderContext) -> OutboundMessage {
        let Some(tab_id) = sender.tab_id else {
            warn!("Image analysis requested without a tab");
            let err = TrustMeterError::InvalidInput("No tab context available".to_string());
            return OutboundMessage::error(&err, message.payload.session_id);
        };
        let session_id = self.resolve_session(&message, sender);
        let urls = message.payload.image_urls();
        info!("Processing image analysis: tab_id={}, session_id={}", tab_id, session_id);

        let request = AnalysisRequest {
            kind: AnalysisKind::Image,
            tab_id,
            session_id: session_id.clone(),
            payload: AnalysisPayload::Images { urls },
        };

        match self
            .coordinator
            .run(request)
            .await
            .and_then(AnalysisOutcome::into_images)
        {
            Ok(results) => {
                let count = results.len();
                for result in results {
                    self.push(sender, OutboundMessage::ImageAnalysisResult(result))
                        .await;
                }
                OutboundMessage::ImageAnalysisComplete(ImageBatchSummary {
                    success: true,
                    count,
                })
            }
            Err(e) => {
                error!("Image analysis failed: tab_id={}, error={}", tab_id, e);
                self.fail(sender, &e, session_id).await
            }
        }
    }

    async fn cancel_session(&self, message: InboundMessage, sender: SenderContext) -> OutboundMessage {
        let requested = message.payload.session_id;
        let target = message.payload.tab_id.or(sender.tab_id);

        let matched = match (&requested, target) {
            (Some(requested), Some(tab_id)) => {
                self.registry.session_id(tab_id).as_ref() == Some(requested)
            }
            _ => false,
        };

        match (requested, target) {
            (Some(session_id), Some(tab_id)) if matched => {
                self.registry.clear(tab_id, CancelDelivery::Awaited).await;
                OutboundMessage::SessionCancelled(SessionCancelledAck {
                    status: "success".to_string(),
                    message: "Session cancelled".to_string(),
                    session_id,
                    tab_id,
                })
            }
            (requested, _) => {
                let err = TrustMeterError::InvalidInput("Session not found or mismatch".to_string());
                OutboundMessage::error(&err, requested)
            }
        }
    }

    async fn check_session_tasks(
        &self,
        message: InboundMessage,
        sender: SenderContext,
    ) -> OutboundMessage {
        let session_id = self.resolve_session(&message, sender);
        match self.backend.session_tasks(&session_id).await {
            Ok(report) => {
                debug!("Active tasks: session_id={}, report={}", session_id, report);
                OutboundMessage::SessionTasks(report)
            }
            Err(e) => {
                error!("Error checking tasks: session_id={}, error={}", session_id, e);
                OutboundMessage::error(&TrustMeterError::from(e), Some(session_id))
            }
        }
    }
}
