//! Envelopes exchanged with the extension's background shim.
//!
//! The shim forwards `runtime.onMessage` traffic and tab lifecycle events as
//! `kind`-tagged envelopes and relays our replies, pushes and tab queries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use trustmeter_core::{OutboundMessage, SenderContext, TabId};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SenderInfo {
    #[serde(default)]
    pub tab_id: Option<TabId>,
}

impl SenderInfo {
    pub fn context(&self) -> SenderContext {
        match self.tab_id {
            Some(tab_id) => SenderContext::tab(tab_id),
            None => SenderContext::popup(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostInbound {
    /// A runtime message; `id` correlates the reply.
    Message {
        id: u64,
        #[serde(default)]
        sender: SenderInfo,
        message: Value,
    },
    TabRemoved {
        tab_id: TabId,
    },
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        status: Option<String>,
    },
    TabReplaced {
        added_tab_id: TabId,
        removed_tab_id: TabId,
    },
    Suspend,
    /// Answer to a `query_tabs` request.
    TabsSnapshot {
        query_id: String,
        tab_ids: Vec<TabId>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostOutbound {
    /// `payload` is `null` when the message owes no reply.
    Reply {
        id: u64,
        payload: Option<OutboundMessage>,
    },
    Push {
        tab_id: TabId,
        message: OutboundMessage,
    },
    QueryTabs {
        query_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trustmeter_core::infrastructure::host::AcceptedAck;

    #[test]
    fn message_envelope_without_sender_is_a_popup_message() {
        let envelope: HostInbound = serde_json::from_value(json!({
            "kind": "message",
            "id": 4,
            "message": { "type": "ANALYZE_TEXT", "payload": { "text": "hi" } }
        }))
        .unwrap();

        match envelope {
            HostInbound::Message { id, sender, .. } => {
                assert_eq!(id, 4);
                assert_eq!(sender.context(), SenderContext::popup());
            }
            other => panic!("unexpected envelope: {:?}", other),
        }
    }

    #[test]
    fn lifecycle_envelopes_decode() {
        let updated: HostInbound = serde_json::from_value(json!({
            "kind": "tab_updated", "tab_id": 3, "status": "complete"
        }))
        .unwrap();
        assert_eq!(
            updated,
            HostInbound::TabUpdated {
                tab_id: TabId(3),
                status: Some("complete".to_string())
            }
        );

        let suspend: HostInbound = serde_json::from_value(json!({ "kind": "suspend" })).unwrap();
        assert_eq!(suspend, HostInbound::Suspend);
    }

    #[test]
    fn reply_nests_the_extension_message() {
        let reply = HostOutbound::Reply {
            id: 9,
            payload: Some(OutboundMessage::Accepted(AcceptedAck { received: true })),
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({
                "kind": "reply",
                "id": 9,
                "payload": { "type": "ACCEPTED", "payload": { "received": true } }
            })
        );
    }
}
