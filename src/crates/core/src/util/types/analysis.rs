use super::tab::{SessionId, TabId};
use serde::{Deserialize, Serialize};

pub const NO_EXPLANATION: &str = "No explanation available.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prediction {
    Real,
    Fake,
    Misleading,
    #[default]
    Unknown,
}

impl Prediction {
    /// Maps a backend label onto the closed prediction set.
    ///
    /// The text model answers with bare labels ("Real", "Fake"), the image model
    /// with hedged verdicts ("Likely AI-generated", "Likely Real", "Uncertain").
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        if label.contains("mislead") {
            Prediction::Misleading
        } else if label.contains("fake") || label.contains("ai-generated") {
            Prediction::Fake
        } else if label.contains("real") {
            Prediction::Real
        } else {
            Prediction::Unknown
        }
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    /// Produced by a backend call issued for this request.
    Backend,
    /// Synthetic busy answer; another analysis of the same kind was running.
    Lock,
    /// Shared from an identical in-flight request.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    TextInitial,
    Text,
    Image,
}

/// Converts a backend score (fraction or percentage) into a 0..=100 percentage.
pub fn score_percent(raw: f64) -> u8 {
    if !raw.is_finite() {
        return 0;
    }
    let scaled = if raw <= 1.0 { raw * 100.0 } else { raw };
    scaled.round().clamp(0.0, 100.0) as u8
}

/// Outcome of a full text analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    pub score: u8,
    pub explanation: String,
    pub prediction: Prediction,
    pub source_tag: SourceTag,
    pub session_id: SessionId,
    pub input_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    /// Backend cache/pipeline label (e.g. `firestore_exact`, `new_analysis`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl TextAnalysis {
    pub fn busy(input_text: &str, session_id: SessionId) -> Self {
        Self {
            score: 0,
            explanation: "Another analysis is already running. Please wait.".to_string(),
            prediction: Prediction::Unknown,
            source_tag: SourceTag::Lock,
            session_id,
            input_text: input_text.to_string(),
            article_id: None,
            source: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.source_tag == SourceTag::Lock
    }
}

/// Outcome for one image URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub url: String,
    pub score: u8,
    pub explanation: String,
    pub prediction: Prediction,
    #[serde(default)]
    pub cached: bool,
    pub source_tag: SourceTag,
    pub session_id: SessionId,
}

impl ImageAnalysis {
    pub fn busy(url: &str, session_id: SessionId) -> Self {
        Self {
            url: url.to_string(),
            score: 0,
            explanation: "Another image analysis is in progress. Please wait.".to_string(),
            prediction: Prediction::Unknown,
            cached: false,
            source_tag: SourceTag::Lock,
            session_id,
        }
    }
}

/// Lightweight first impression returned by `/detect_text_initial`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialImpression {
    pub initial_analysis: serde_json::Value,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPayload {
    Text { text: String, url: Option<String> },
    Images { urls: Vec<String> },
}

/// One unit of work handed to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub kind: AnalysisKind,
    pub tab_id: TabId,
    pub session_id: SessionId,
    pub payload: AnalysisPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_scores_become_percentages() {
        assert_eq!(score_percent(0.82), 82);
        assert_eq!(score_percent(1.0), 100);
        assert_eq!(score_percent(0.0), 0);
    }

    #[test]
    fn percentage_scores_are_clamped() {
        assert_eq!(score_percent(64.0), 64);
        assert_eq!(score_percent(250.0), 100);
        assert_eq!(score_percent(-3.0), 0);
        assert_eq!(score_percent(f64::NAN), 0);
    }

    #[test]
    fn text_result_wire_shape() {
        let result = TextAnalysis {
            score: 82,
            explanation: "Consistent with independent reporting.".to_string(),
            prediction: Prediction::Real,
            source_tag: SourceTag::Backend,
            session_id: SessionId::from("s-7"),
            input_text: "Vaccines cause X".to_string(),
            article_id: None,
            source: None,
        };
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["score"], 82);
        assert_eq!(wire["prediction"], "Real");
        assert_eq!(wire["source_tag"], "Backend");
        assert!(wire.get("article_id").is_none());
    }

    #[test]
    fn labels_map_onto_predictions() {
        assert_eq!(Prediction::from_label("Real"), Prediction::Real);
        assert_eq!(Prediction::from_label("Likely Real"), Prediction::Real);
        assert_eq!(Prediction::from_label("Likely AI-generated"), Prediction::Fake);
        assert_eq!(Prediction::from_label("FAKE"), Prediction::Fake);
        assert_eq!(Prediction::from_label("Misleading"), Prediction::Misleading);
        assert_eq!(Prediction::from_label("Uncertain"), Prediction::Unknown);
        assert_eq!(Prediction::from_label(""), Prediction::Unknown);
    }
}
