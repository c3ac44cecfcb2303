//! Extension message contract
//!
//! Requests arrive as `{type, payload}` from content scripts and the popup.
//! Replies and pushes leave as `{type, payload}` too.

use crate::util::errors::{ErrorKind, TrustMeterError};
use crate::util::types::{ImageAnalysis, InitialImpression, SessionId, TabId, TextAnalysis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub tab_id: Option<TabId>,
}

impl RequestPayload {
    /// Image URLs of the request; a single `url` wins over `urls`.
    pub fn image_urls(&self) -> Vec<String> {
        if let Some(url) = &self.url {
            return vec![url.clone()];
        }
        self.urls.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: RequestPayload,
}

impl InboundMessage {
    pub fn new(message_type: impl Into<String>, payload: RequestPayload) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    AnalyzeTextInitial,
    AnalyzeText,
    AnalyzeImage,
    CancelSession,
    CheckSessionTasks,
}

impl RequestType {
    pub fn parse(message_type: &str) -> Option<Self> {
        match message_type {
            "ANALYZE_TEXT_INITIAL" => Some(RequestType::AnalyzeTextInitial),
            "ANALYZE_TEXT" => Some(RequestType::AnalyzeText),
            "ANALYZE_IMAGE" => Some(RequestType::AnalyzeImage),
            "CANCEL_SESSION" => Some(RequestType::CancelSession),
            "CHECK_SESSION_TASKS" => Some(RequestType::CheckSessionTasks),
            _ => None,
        }
    }
}

/// Pushes carry one of these `_RESULT` types; seeing one inbound is an echo.
pub fn is_push_echo(message_type: &str) -> bool {
    message_type.ends_with("_RESULT")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl ErrorPayload {
    pub fn from_error(error: &TrustMeterError, session_id: Option<SessionId>) -> Self {
        Self {
            error: error.to_string(),
            kind: error.kind(),
            session_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedAck {
    pub received: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBatchSummary {
    pub success: bool,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCancelledAck {
    pub status: String,
    pub message: String,
    pub session_id: SessionId,
    pub tab_id: TabId,
}

/// Every reply and push the coordinator emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    Accepted(AcceptedAck),
    TextInitialResult(InitialImpression),
    TextAnalysisResult(TextAnalysis),
    ImageAnalysisResult(ImageAnalysis),
    ImageAnalysisComplete(ImageBatchSummary),
    AnalysisError(ErrorPayload),
    SessionCancelled(SessionCancelledAck),
    SessionTasks(Value),
}

impl OutboundMessage {
    pub fn error(error: &TrustMeterError, session_id: Option<SessionId>) -> Self {
        OutboundMessage::AnalysisError(ErrorPayload::from_error(error, session_id))
    }
}
