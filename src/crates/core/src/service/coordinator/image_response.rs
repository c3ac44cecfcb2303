//! `/detect_image` response decoding
//!
//! The backend answers in one of three shapes depending on its pipeline. Each
//! shape has its own decoder; all of them end in the same per-URL results.

use crate::util::errors::{BackendError, BackendResult};
use crate::util::types::{
    score_percent, ImageAnalysis, Prediction, SessionId, SourceTag, NO_EXPLANATION,
};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ImageResponse {
    /// Bare array, one entry per requested URL.
    Batch(Vec<Value>),
    /// `{details: [...]}` with optional parent `score` / `explanation`.
    Detailed {
        details: Vec<Value>,
        parent: Map<String, Value>,
    },
    /// A single verdict object.
    Single(Map<String, Value>),
}

/// Field values read off one entry, parent fallbacks already applied.
struct Entry<'a> {
    url: Option<&'a str>,
    score: f64,
    explanation: &'a str,
    prediction: Prediction,
    cached: bool,
}

fn str_field<'a>(obj: &'a Value, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn score_field(obj: &Value) -> Option<f64> {
    obj.get("score").and_then(Value::as_f64).filter(|s| *s != 0.0)
}

impl<'a> Entry<'a> {
    fn read(entry: &'a Value, parent: Option<&'a Value>) -> Self {
        let url = str_field(entry, "url").or_else(|| str_field(entry, "image_source"));
        let score = score_field(entry)
            .or_else(|| parent.and_then(score_field))
            .unwrap_or(0.0);
        let explanation = str_field(entry, "explanation")
            .or_else(|| parent.and_then(|p| str_field(p, "explanation")))
            .unwrap_or(NO_EXPLANATION);
        let prediction = str_field(entry, "verdict")
            .or_else(|| str_field(entry, "prediction"))
            .map(Prediction::from_label)
            .unwrap_or_default();
        let cached = entry.get("cached").and_then(Value::as_bool).unwrap_or(false);

        Self {
            url,
            score,
            explanation,
            prediction,
            cached,
        }
    }

    fn into_result(self, url: &str, session_id: &SessionId) -> ImageAnalysis {
        ImageAnalysis {
            url: url.to_string(),
            score: score_percent(self.score),
            explanation: self.explanation.to_string(),
            prediction: self.prediction,
            cached: self.cached,
            source_tag: SourceTag::Backend,
            session_id: session_id.clone(),
        }
    }
}

impl ImageResponse {
    pub fn decode(data: Value) -> BackendResult<Self> {
        match data {
            Value::Array(entries) => Ok(ImageResponse::Batch(entries)),
            Value::Object(mut obj) => match obj.remove("details") {
                Some(Value::Array(details)) => Ok(ImageResponse::Detailed {
                    details,
                    parent: obj,
                }),
                Some(other) => {
                    obj.insert("details".to_string(), other);
                    Ok(ImageResponse::Single(obj))
                }
                None => Ok(ImageResponse::Single(obj)),
            },
            other => Err(BackendError::Decode(format!(
                "unexpected image analysis response: {}",
                other
            ))),
        }
    }

    /// Maps the decoded shape onto the requested URLs.
    pub fn into_results(self, urls: &[String], session_id: &SessionId) -> Vec<ImageAnalysis> {
        match self {
            ImageResponse::Batch(entries) => map_entries(&entries, None, urls, session_id),
            ImageResponse::Detailed { details, parent } => {
                let parent = Value::Object(parent);
                map_entries(&details, Some(&parent), urls, session_id)
            }
            ImageResponse::Single(obj) => {
                let obj = Value::Object(obj);
                let entry = Entry::read(&obj, None);
                match entry.url {
                    Some(own_url) => {
                        let own_url = own_url.to_string();
                        vec![entry.into_result(&own_url, session_id)]
                    }
                    None => urls
                        .iter()
                        .map(|url| Entry::read(&obj, None).into_result(url, session_id))
                        .collect(),
                }
            }
        }
    }
}

fn map_entries(
    entries: &[Value],
    parent: Option<&Value>,
    urls: &[String],
    session_id: &SessionId,
) -> Vec<ImageAnalysis> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let entry = Entry::read(raw, parent);
            let url = entry
                .url
                .map(str::to_string)
                .or_else(|| urls.get(idx).cloned())?;
            Some(entry.into_result(&url, session_id))
        })
        .collect()
}
