use crate::infrastructure::backend::{send_best_effort, AnalysisBackend};
use crate::service::store::TabStateStore;
use crate::util::types::{Session, SessionId, TabId};
use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// How the backend learns that a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDelivery {
    /// Detached best-effort send; the notification outlives the handler that
    /// triggered it (tab closed, navigated away, swept).
    Detached,
    /// Awaited, but a failure is only logged.
    Awaited,
}

/// Host lifecycle signals that end or move a tab's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabLifecycleEvent {
    Removed(TabId),
    NavigationComplete(TabId),
    Replaced { added: TabId, removed: TabId },
    Suspend,
}

/// Owns the tab → session mapping.
pub struct SessionRegistry {
    store: Arc<TabStateStore>,
    backend: Arc<dyn AnalysisBackend>,
}

impl SessionRegistry {
    pub fn new(store: Arc<TabStateStore>, backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { store, backend }
    }

    pub fn store(&self) -> &Arc<TabStateStore> {
        &self.store
    }

    pub fn get_or_create(&self, tab_id: TabId) -> SessionId {
        self.store
            .sessions
            .entry(tab_id)
            .or_insert_with(|| {
                let session = Session::new(tab_id);
                info!(
                    "Created session: tab_id={}, session_id={}",
                    tab_id, session.session_id
                );
                session
            })
            .session_id
            .clone()
    }

    pub fn session_id(&self, tab_id: TabId) -> Option<SessionId> {
        self.store.session_id(tab_id)
    }

    /// Ends the tab's session and drops all of its request state.
    ///
    /// Local cleanup happens first and unconditionally; the backend
    /// cancellation is best-effort and only sent when a session existed.
    pub async fn clear(&self, tab_id: TabId, delivery: CancelDelivery) -> Option<SessionId> {
        let session = self.store.purge_tab(tab_id)?;
        let session_id = session.session_id;
        info!("Clearing session: tab_id={}, session_id={}", tab_id, session_id);

        match delivery {
            CancelDelivery::Detached => {
                let backend = self.backend.clone();
                let cancelled = session_id.clone();
                send_best_effort("cancel_session", async move {
                    backend.cancel_session(&cancelled).await
                });
            }
            CancelDelivery::Awaited => {
                if let Err(e) = self.backend.cancel_session(&session_id).await {
                    warn!(
                        "Failed to cancel backend session: tab_id={}, session_id={}, error={}",
                        tab_id, session_id, e
                    );
                }
            }
        }

        Some(session_id)
    }

    /// Re-keys a session after the browser swapped a tab's identity.
    pub fn migrate(&self, old_tab_id: TabId, new_tab_id: TabId) -> bool {
        let Some((_, mut session)) = self.store.sessions.remove(&old_tab_id) else {
            debug!("No session to migrate: old_tab_id={}", old_tab_id);
            return false;
        };
        info!(
            "Migrating session: old_tab_id={}, new_tab_id={}, session_id={}",
            old_tab_id, new_tab_id, session.session_id
        );
        session.tab_id = new_tab_id;
        if let Some(replaced) = self.store.sessions.insert(new_tab_id, session) {
            warn!(
                "Migration overwrote an existing session: tab_id={}, session_id={}",
                new_tab_id, replaced.session_id
            );
        }
        true
    }

    /// Clears every tracked tab that is no longer open.
    pub async fn sweep(&self, active_tabs: &HashSet<TabId>) -> Vec<TabId> {
        let orphaned: Vec<TabId> = self
            .store
            .tracked_tabs()
            .into_iter()
            .filter(|tab_id| !active_tabs.contains(tab_id) && !tab_id.is_none())
            .collect();

        for tab_id in &orphaned {
            info!("Cleaning up orphaned session: tab_id={}", tab_id);
            self.clear(*tab_id, CancelDelivery::Detached).await;
        }
        orphaned
    }

    /// Clears every tracked tab, awaiting the cancellations concurrently.
    pub async fn clear_all(&self, delivery: CancelDelivery) -> usize {
        let tabs = self.store.tracked_tabs();
        let cleared = join_all(tabs.iter().map(|tab_id| self.clear(*tab_id, delivery))).await;
        cleared.into_iter().flatten().count()
    }

    pub async fn handle_lifecycle(&self, event: TabLifecycleEvent) {
        match event {
            TabLifecycleEvent::Removed(tab_id) => {
                debug!("Tab closed: tab_id={}", tab_id);
                self.clear(tab_id, CancelDelivery::Detached).await;
            }
            TabLifecycleEvent::NavigationComplete(tab_id) => {
                debug!("Tab navigation complete: tab_id={}", tab_id);
                self.clear(tab_id, CancelDelivery::Detached).await;
            }
            TabLifecycleEvent::Replaced { added, removed } => {
                self.migrate(removed, added);
            }
            TabLifecycleEvent::Suspend => {
                let cleared = self.clear_all(CancelDelivery::Awaited).await;
                info!("Suspending, cancelled {} session(s)", cleared);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::coordinator::RequestCoordinator;
    use crate::testing::ScriptedBackend;
    use std::time::Duration;

    fn registry() -> (SessionRegistry, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::new());
        let registry = SessionRegistry::new(Arc::new(TabStateStore::new()), backend.clone());
        (registry, backend)
    }

    async fn wait_for_cancellations(backend: &ScriptedBackend, expected: usize) {
        for _ in 0..50 {
            if backend.cancelled_sessions().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (registry, _) = registry();
        let first = registry.get_or_create(TabId(1));
        let second = registry.get_or_create(TabId(1));
        let other = registry.get_or_create(TabId(2));

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn migrate_preserves_session_id() {
        let (registry, _) = registry();
        let original = registry.get_or_create(TabId(10));

        assert!(registry.migrate(TabId(10), TabId(11)));
        assert_eq!(registry.get_or_create(TabId(11)), original);
        assert_eq!(registry.session_id(TabId(10)), None);
    }

    #[tokio::test]
    async fn migrate_without_session_is_a_no_op() {
        let (registry, _) = registry();
        assert!(!registry.migrate(TabId(4), TabId(5)));
        assert_eq!(registry.session_id(TabId(5)), None);
    }

    #[tokio::test]
    async fn tab_close_purges_state_and_cancels_previous_session() {
        let (registry, backend) = registry();
        let before = registry.get_or_create(TabId(7));

        registry
            .handle_lifecycle(TabLifecycleEvent::Removed(TabId(7)))
            .await;
        wait_for_cancellations(&backend, 1).await;

        assert_eq!(backend.cancelled_sessions(), vec![before.clone()]);
        assert_ne!(registry.get_or_create(TabId(7)), before);
    }

    #[tokio::test]
    async fn navigation_complete_resets_a_locked_tab() {
        let (registry, backend) = registry();
        let coordinator = Arc::new(RequestCoordinator::new(
            registry.store().clone(),
            backend.clone(),
        ));
        backend.hold();
        let before = registry.get_or_create(TabId(9));

        let running = {
            let coordinator = coordinator.clone();
            let session_id = before.clone();
            tokio::spawn(async move {
                coordinator
                    .analyze_text(TabId(9), session_id, "Story on the previous page", None)
                    .await
            })
        };
        backend.wait_until(ScriptedBackend::text_calls, 1).await;
        assert!(registry.store().is_text_locked(TabId(9)));

        registry
            .handle_lifecycle(TabLifecycleEvent::NavigationComplete(TabId(9)))
            .await;
        wait_for_cancellations(&backend, 1).await;

        assert!(!registry.store().is_text_locked(TabId(9)));
        assert_eq!(backend.cancelled_sessions(), vec![before.clone()]);
        assert_ne!(registry.get_or_create(TabId(9)), before);

        backend.release(1);
        running.await.expect("join").expect("stale result");
        assert!(!registry.store().is_text_locked(TabId(9)));
    }

    #[tokio::test]
    async fn migrate_onto_a_tracked_tab_replaces_its_session() {
        let (registry, _) = registry();
        let moved = registry.get_or_create(TabId(20));
        registry.get_or_create(TabId(21));

        assert!(registry.migrate(TabId(20), TabId(21)));
        assert_eq!(registry.session_id(TabId(21)), Some(moved));
        assert_eq!(registry.session_id(TabId(20)), None);
    }

    #[tokio::test]
    async fn local_cleanup_survives_failed_cancellation() {
        let (registry, backend) = registry();
        backend.fail_cancellations();
        let before = registry.get_or_create(TabId(8));

        let cleared = registry.clear(TabId(8), CancelDelivery::Awaited).await;

        assert_eq!(cleared, Some(before.clone()));
        assert_eq!(backend.cancelled_sessions(), vec![before]);
        assert_eq!(registry.session_id(TabId(8)), None);
    }

    #[tokio::test]
    async fn clear_without_session_sends_nothing() {
        let (registry, backend) = registry();
        assert_eq!(registry.clear(TabId(12), CancelDelivery::Awaited).await, None);
        assert!(backend.cancelled_sessions().is_empty());
    }

    #[tokio::test]
    async fn sweep_clears_only_closed_tabs() {
        let (registry, backend) = registry();
        registry.get_or_create(TabId(1));
        let closed = registry.get_or_create(TabId(2));
        registry.get_or_create(TabId(3));

        let active: HashSet<TabId> = [TabId(1), TabId(3)].into_iter().collect();
        let swept = registry.sweep(&active).await;
        wait_for_cancellations(&backend, 1).await;

        assert_eq!(swept, vec![TabId(2)]);
        assert_eq!(backend.cancelled_sessions(), vec![closed]);
        assert!(registry.session_id(TabId(1)).is_some());
        assert!(registry.session_id(TabId(3)).is_some());
    }

    #[tokio::test]
    async fn suspend_cancels_every_session() {
        let (registry, backend) = registry();
        registry.get_or_create(TabId(1));
        registry.get_or_create(TabId(2));

        registry.handle_lifecycle(TabLifecycleEvent::Suspend).await;

        assert_eq!(backend.cancelled_sessions().len(), 2);
        assert!(registry.store().session_tabs().is_empty());
    }
}
