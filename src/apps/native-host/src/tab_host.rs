//! `TabHost` over the native messaging channel.
//!
//! Pushes are queued to the writer task. Tab queries are a round trip: a
//! `query_tabs` envelope goes out and the matching `tabs_snapshot` resolves it.

use crate::protocol::HostOutbound;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use trustmeter_core::{OutboundMessage, TabHost, TabId, TrustMeterError, TrustMeterResult};

pub struct NativeTabHost {
    outbound: mpsc::UnboundedSender<HostOutbound>,
    pending_queries: DashMap<String, oneshot::Sender<Vec<TabId>>>,
    query_timeout: Duration,
}

impl NativeTabHost {
    pub fn new(outbound: mpsc::UnboundedSender<HostOutbound>, query_timeout: Duration) -> Self {
        Self {
            outbound,
            pending_queries: DashMap::new(),
            query_timeout,
        }
    }

    pub fn send(&self, envelope: HostOutbound) -> TrustMeterResult<()> {
        self.outbound
            .send(envelope)
            .map_err(|_| TrustMeterError::Internal("Native messaging channel closed".to_string()))
    }

    /// Completes a pending tab query; unknown or expired ids are ignored.
    pub fn resolve_query(&self, query_id: &str, tab_ids: Vec<TabId>) -> bool {
        match self.pending_queries.remove(query_id) {
            Some((_, tx)) => tx.send(tab_ids).is_ok(),
            None => {
                debug!("Dropping tab snapshot for unknown query: query_id={}", query_id);
                false
            }
        }
    }
}

#[async_trait]
impl TabHost for NativeTabHost {
    async fn send_to_tab(&self, tab_id: TabId, message: OutboundMessage) -> TrustMeterResult<()> {
        self.send(HostOutbound::Push { tab_id, message })
    }

    async fn query_tabs(&self) -> TrustMeterResult<Vec<TabId>> {
        let query_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending_queries.insert(query_id.clone(), tx);

        if let Err(e) = self.send(HostOutbound::QueryTabs {
            query_id: query_id.clone(),
        }) {
            self.pending_queries.remove(&query_id);
            return Err(e);
        }

        match tokio::time::timeout(self.query_timeout, rx).await {
            Ok(Ok(tab_ids)) => Ok(tab_ids),
            Ok(Err(_)) => Err(TrustMeterError::Internal(
                "Tab query abandoned".to_string(),
            )),
            Err(_) => {
                self.pending_queries.remove(&query_id);
                warn!("Tab query timed out: query_id={}", query_id);
                Err(TrustMeterError::Internal(format!(
                    "Tab query timed out after {}ms",
                    self.query_timeout.as_millis()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn query_is_resolved_by_matching_snapshot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = Arc::new(NativeTabHost::new(tx, Duration::from_secs(2)));

        let query = {
            let host = host.clone();
            tokio::spawn(async move { host.query_tabs().await })
        };

        let query_id = match rx.recv().await {
            Some(HostOutbound::QueryTabs { query_id }) => query_id,
            other => panic!("unexpected envelope: {:?}", other),
        };
        assert!(!host.resolve_query("someone-else", vec![TabId(9)]));
        assert!(host.resolve_query(&query_id, vec![TabId(1), TabId(2)]));

        let tabs = query.await.expect("join").expect("tab list");
        assert_eq!(tabs, vec![TabId(1), TabId(2)]);
    }

    #[tokio::test]
    async fn unanswered_query_times_out() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let host = NativeTabHost::new(tx, Duration::from_millis(20));

        assert!(host.query_tabs().await.is_err());
        assert!(host.pending_queries.is_empty());
    }

    #[tokio::test]
    async fn pushes_fail_once_the_channel_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = NativeTabHost::new(tx, Duration::from_millis(20));
        drop(rx);

        let message = OutboundMessage::SessionTasks(serde_json::Value::Null);
        assert!(host.send_to_tab(TabId(1), message).await.is_err());
    }
}
