//! Test doubles for the backend and browser host ports.

use crate::infrastructure::backend::AnalysisBackend;
use crate::infrastructure::host::{OutboundMessage, TabHost};
use crate::util::errors::{BackendError, BackendResult, TrustMeterError, TrustMeterResult};
use crate::util::types::{SessionId, TabId};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

pub(crate) fn default_text_response() -> Value {
    json!({
        "score": 0.82,
        "explanation": "Claims are consistent with independent reporting.",
        "prediction": "Real",
        "article_id": "article-1",
        "source": "new_analysis"
    })
}

/// Scripted backend: queued responses, call counters and an optional gate
/// that parks detect calls until the test releases them.
pub(crate) struct ScriptedBackend {
    text_calls: AtomicUsize,
    image_calls: AtomicUsize,
    initial_calls: AtomicUsize,
    text_responses: Mutex<VecDeque<BackendResult<Value>>>,
    image_responses: Mutex<VecDeque<BackendResult<Value>>>,
    seen_texts: Mutex<Vec<String>>,
    seen_image_urls: Mutex<Vec<Vec<String>>>,
    cancelled: Mutex<Vec<SessionId>>,
    fail_cancel: AtomicBool,
    held: AtomicBool,
    gate: Semaphore,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            text_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            initial_calls: AtomicUsize::new(0),
            text_responses: Mutex::new(VecDeque::new()),
            image_responses: Mutex::new(VecDeque::new()),
            seen_texts: Mutex::new(Vec::new()),
            seen_image_urls: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_cancel: AtomicBool::new(false),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    /// Parks every detect call until `release` hands out a permit.
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn push_text_response(&self, response: BackendResult<Value>) {
        self.text_responses.lock().unwrap().push_back(response);
    }

    pub fn push_image_response(&self, response: BackendResult<Value>) {
        self.image_responses.lock().unwrap().push_back(response);
    }

    pub fn fail_cancellations(&self) {
        self.fail_cancel.store(true, Ordering::SeqCst);
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn initial_calls(&self) -> usize {
        self.initial_calls.load(Ordering::SeqCst)
    }

    pub fn seen_texts(&self) -> Vec<String> {
        self.seen_texts.lock().unwrap().clone()
    }

    pub fn seen_image_urls(&self) -> Vec<Vec<String>> {
        self.seen_image_urls.lock().unwrap().clone()
    }

    pub fn cancelled_sessions(&self) -> Vec<SessionId> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Polls until `count()` reaches `expected` or a second has passed.
    pub async fn wait_until<F: Fn(&Self) -> usize>(&self, count: F, expected: usize) {
        for _ in 0..100 {
            if count(self) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn pass_gate(&self) {
        if self.held.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    async fn detect_text_initial(
        &self,
        _session_id: &SessionId,
        _text: &str,
        _url: Option<&str>,
    ) -> BackendResult<Value> {
        self.initial_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "initial_analysis": "Looks like a news article.", "status": "ok" }))
    }

    async fn detect_text(
        &self,
        _session_id: &SessionId,
        text: &str,
        _url: Option<&str>,
    ) -> BackendResult<Value> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_texts.lock().unwrap().push(text.to_string());
        self.pass_gate().await;
        let scripted = self.text_responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(default_text_response()))
    }

    async fn detect_image(&self, _session_id: &SessionId, urls: &[String]) -> BackendResult<Value> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_image_urls.lock().unwrap().push(urls.to_vec());
        self.pass_gate().await;
        let scripted = self.image_responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Value::Array(
                urls.iter()
                    .map(|_| json!({ "score": 91, "prediction": "Likely Real" }))
                    .collect(),
            ))
        })
    }

    async fn cancel_session(&self, session_id: &SessionId) -> BackendResult<()> {
        self.cancelled.lock().unwrap().push(session_id.clone());
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(BackendError::Connect("connection refused".to_string()));
        }
        Ok(())
    }

    async fn session_tasks(&self, session_id: &SessionId) -> BackendResult<Value> {
        Ok(json!({ "session_id": session_id, "active_tasks": [], "count": 0 }))
    }
}

/// Records pushes; tabs marked closed reject delivery.
#[derive(Default)]
pub(crate) struct RecordingHost {
    pushes: Mutex<Vec<(TabId, OutboundMessage)>>,
    closed: Mutex<HashSet<TabId>>,
    open: Mutex<Vec<TabId>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close_tab(&self, tab_id: TabId) {
        self.closed.lock().unwrap().insert(tab_id);
    }

    pub fn set_open_tabs(&self, tabs: Vec<TabId>) {
        *self.open.lock().unwrap() = tabs;
    }

    pub fn pushes(&self) -> Vec<(TabId, OutboundMessage)> {
        self.pushes.lock().unwrap().clone()
    }

    pub async fn wait_for_pushes(&self, expected: usize) {
        for _ in 0..100 {
            if self.pushes.lock().unwrap().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl TabHost for RecordingHost {
    async fn send_to_tab(&self, tab_id: TabId, message: OutboundMessage) -> TrustMeterResult<()> {
        if self.closed.lock().unwrap().contains(&tab_id) {
            return Err(TrustMeterError::Internal(format!(
                "Receiving end does not exist: tab_id={}",
                tab_id
            )));
        }
        self.pushes.lock().unwrap().push((tab_id, message));
        Ok(())
    }

    async fn query_tabs(&self) -> TrustMeterResult<Vec<TabId>> {
        Ok(self.open.lock().unwrap().clone())
    }
}
