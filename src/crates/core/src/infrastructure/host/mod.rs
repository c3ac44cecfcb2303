//! Browser host port
//!
//! The coordinator never talks to the browser directly. Whatever embeds it
//! (the native messaging host, tests) implements `TabHost`.

pub mod messages;

pub use messages::*;

use crate::util::errors::TrustMeterResult;
use crate::util::types::TabId;
use async_trait::async_trait;

#[async_trait]
pub trait TabHost: Send + Sync {
    /// Pushes a message to a tab's content surface.
    ///
    /// Fails when the tab is gone or navigated away; callers treat this as
    /// best-effort.
    async fn send_to_tab(&self, tab_id: TabId, message: OutboundMessage) -> TrustMeterResult<()>;

    /// Enumerates the tabs currently open in the browser.
    async fn query_tabs(&self) -> TrustMeterResult<Vec<TabId>>;
}
