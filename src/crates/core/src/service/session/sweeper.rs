use super::registry::SessionRegistry;
use crate::infrastructure::host::TabHost;
use crate::util::types::TabId;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runs one sweep against the host's live tab list.
///
/// A failed tab query skips the round instead of treating every tab as closed.
pub async fn sweep_once(registry: &SessionRegistry, host: &dyn TabHost) -> Vec<TabId> {
    match host.query_tabs().await {
        Ok(tabs) => {
            let active: HashSet<TabId> = tabs.into_iter().collect();
            registry.sweep(&active).await
        }
        Err(e) => {
            warn!("Skipping session sweep, tab query failed: error={}", e);
            Vec::new()
        }
    }
}

/// Spawns the periodic orphan sweep; stops when `cancel_token` fires.
pub fn spawn_session_sweeper(
    registry: Arc<SessionRegistry>,
    host: Arc<dyn TabHost>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Session sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    debug!("Running periodic session cleanup");
                    let swept = sweep_once(&registry, host.as_ref()).await;
                    if !swept.is_empty() {
                        debug!("Session sweep cleared {} tab(s)", swept.len());
                    }
                }
            }
        }
    })
}
