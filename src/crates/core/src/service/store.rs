//! Per-tab coordination state
//!
//! One map per state kind, owned together so a tab teardown can drop all of
//! them in one place. Shared (`Arc`) by the session registry and the request
//! coordinator. Shard guards are only ever held inside synchronous sections.

use crate::util::errors::TrustMeterResult;
use crate::util::types::{Session, SessionId, TabId, TextAnalysis};
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) type InFlightText = Shared<BoxFuture<'static, TrustMeterResult<TextAnalysis>>>;

/// Text path state for one tab. The tab is locked exactly while `in_flight`
/// is set, so the lock flag and the future cannot disagree.
#[derive(Default)]
pub(crate) struct TextSlot {
    pub generation: u64,
    pub last_text: String,
    pub in_flight: Option<InFlightText>,
}

/// Image path state for one tab; present only while locked.
pub(crate) struct ImageSlot {
    pub generation: u64,
}

#[derive(Default)]
pub struct TabStateStore {
    pub(crate) sessions: DashMap<TabId, Session>,
    pub(crate) text: DashMap<TabId, TextSlot>,
    pub(crate) images: DashMap<TabId, ImageSlot>,
    generation: AtomicU64,
}

impl TabStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generations tag lock acquisitions so a late release cannot free a lock
    /// that was purged and re-acquired in the meantime.
    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn release_text(&self, tab_id: TabId, generation: u64) -> bool {
        match self.text.get_mut(&tab_id) {
            Some(mut slot) if slot.generation == generation => {
                slot.in_flight = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn release_image(&self, tab_id: TabId, generation: u64) -> bool {
        self.images
            .remove_if(&tab_id, |_, slot| slot.generation == generation)
            .is_some()
    }

    /// Drops every piece of state held for `tab_id`, returning its session.
    pub(crate) fn purge_tab(&self, tab_id: TabId) -> Option<Session> {
        self.text.remove(&tab_id);
        self.images.remove(&tab_id);
        self.sessions.remove(&tab_id).map(|(_, session)| session)
    }

    pub fn session_id(&self, tab_id: TabId) -> Option<SessionId> {
        self.sessions.get(&tab_id).map(|s| s.session_id.clone())
    }

    pub fn is_text_locked(&self, tab_id: TabId) -> bool {
        self.text
            .get(&tab_id)
            .map(|slot| slot.in_flight.is_some())
            .unwrap_or(false)
    }

    pub fn is_image_locked(&self, tab_id: TabId) -> bool {
        self.images.contains_key(&tab_id)
    }

    pub fn last_submitted_text(&self, tab_id: TabId) -> Option<String> {
        self.text.get(&tab_id).map(|slot| slot.last_text.clone())
    }

    /// Tabs with a live session.
    pub fn session_tabs(&self) -> Vec<TabId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Tabs holding any state at all (session, text or image).
    pub fn tracked_tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = self
            .sessions
            .iter()
            .map(|e| *e.key())
            .chain(self.text.iter().map(|e| *e.key()))
            .chain(self.images.iter().map(|e| *e.key()))
            .collect();
        tabs.sort();
        tabs.dedup();
        tabs
    }
}
