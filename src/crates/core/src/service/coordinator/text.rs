//! Text path: single-flight with coalescing of identical resubmissions.

use super::RequestCoordinator;
use crate::service::store::{InFlightText, TabStateStore};
use crate::util::errors::{BackendError, TrustMeterError, TrustMeterResult};
use crate::util::types::{
    score_percent, Prediction, SessionId, SourceTag, TabId, TextAnalysis, NO_EXPLANATION,
};
use futures::FutureExt;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;

enum TextAdmission {
    Started(InFlightText),
    Coalesced(InFlightText),
    Busy(TextAnalysis),
}

/// Frees the tab's text lock when the backend task ends, on every exit path.
struct TextRelease {
    store: Arc<TabStateStore>,
    tab_id: TabId,
    generation: u64,
}

impl Drop for TextRelease {
    fn drop(&mut self) {
        if self.store.release_text(self.tab_id, self.generation) {
            debug!("Text lock released: tab_id={}", self.tab_id);
        }
    }
}

impl RequestCoordinator {
    pub async fn analyze_text(
        &self,
        tab_id: TabId,
        session_id: SessionId,
        text: &str,
        url: Option<&str>,
    ) -> TrustMeterResult<TextAnalysis> {
        if text.trim().is_empty() {
            return Err(TrustMeterError::InvalidInput("No text provided.".to_string()));
        }

        match self.admit_text(tab_id, session_id, text, url) {
            TextAdmission::Busy(result) => Ok(result),
            TextAdmission::Started(in_flight) => in_flight.await,
            TextAdmission::Coalesced(in_flight) => {
                let mut result = in_flight.await?;
                result.source_tag = SourceTag::Duplicate;
                Ok(result)
            }
        }
    }

    /// Decides the request's fate in one synchronous step under the tab's
    /// shard lock, so no other handler can observe a half-updated slot.
    fn admit_text(
        &self,
        tab_id: TabId,
        session_id: SessionId,
        text: &str,
        url: Option<&str>,
    ) -> TextAdmission {
        let mut slot = self.store.text.entry(tab_id).or_default();

        if let Some(in_flight) = &slot.in_flight {
            if slot.last_text == text {
                warn!("Duplicate text while analysis is running, sharing result: tab_id={}", tab_id);
                return TextAdmission::Coalesced(in_flight.clone());
            }
            warn!("Blocked new text request, analysis already in progress: tab_id={}", tab_id);
            return TextAdmission::Busy(TextAnalysis::busy(text, session_id));
        }

        let generation = self.store.next_generation();
        let (tx, rx) = oneshot::channel::<TrustMeterResult<TextAnalysis>>();
        let in_flight: InFlightText = async move {
            rx.await.unwrap_or_else(|_| {
                Err(TrustMeterError::Internal(
                    "Text analysis task ended without a result".to_string(),
                ))
            })
        }
        .boxed()
        .shared();

        slot.generation = generation;
        slot.last_text = text.to_string();
        slot.in_flight = Some(in_flight.clone());
        drop(slot);
        debug!("Text lock acquired: tab_id={}, generation={}", tab_id, generation);

        let release = TextRelease {
            store: self.store.clone(),
            tab_id,
            generation,
        };
        let backend = self.backend.clone();
        let text = text.to_string();
        let url = url.map(str::to_string);

        // The call runs on its own task so the lock is released even when every
        // caller awaiting the result has gone away.
        tokio::spawn(async move {
            let result = match backend.detect_text(&session_id, &text, url.as_deref()).await {
                Ok(data) => text_analysis_from_backend(&data, &text, session_id),
                Err(e) => Err(e.into()),
            };
            // Unlock before publishing so a caller that sees the result can
            // immediately start a fresh analysis.
            drop(release);
            let _ = tx.send(result);
        });

        TextAdmission::Started(in_flight)
    }
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn non_zero_f64(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64).filter(|s| *s != 0.0)
}

/// Builds the caller-facing result from a `/detect_text` body.
///
/// Top-level fields win; `summary.*` fills the gaps left by pipeline responses.
pub(crate) fn text_analysis_from_backend(
    data: &Value,
    input_text: &str,
    session_id: SessionId,
) -> TrustMeterResult<TextAnalysis> {
    if !data.is_object() {
        return Err(BackendError::Decode(format!(
            "expected a JSON object from text analysis, got {}",
            data
        ))
        .into());
    }
    let summary = data.get("summary").unwrap_or(&Value::Null);

    let score = non_zero_f64(data, "score")
        .or_else(|| non_zero_f64(summary, "score"))
        .unwrap_or(0.0);
    let explanation = non_empty_str(data, "explanation")
        .or_else(|| non_empty_str(summary, "explanation"))
        .unwrap_or(NO_EXPLANATION);
    let prediction = non_empty_str(data, "prediction")
        .or_else(|| non_empty_str(summary, "prediction"))
        .map(Prediction::from_label)
        .unwrap_or_default();

    Ok(TextAnalysis {
        score: score_percent(score),
        explanation: explanation.to_string(),
        prediction,
        source_tag: SourceTag::Backend,
        session_id,
        input_text: non_empty_str(data, "input_text")
            .unwrap_or(input_text)
            .to_string(),
        article_id: non_empty_str(data, "article_id").map(str::to_string),
        source: non_empty_str(data, "source").map(str::to_string),
    })
}
