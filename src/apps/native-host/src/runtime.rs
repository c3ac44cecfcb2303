//! Host event loop
//!
//! One reader drives inbound envelopes, one writer owns stdout. Runtime
//! messages run on their own tasks; lifecycle events are applied in arrival
//! order. When the browser closes the channel every session is cancelled.

use crate::framing::{read_frame, write_message, HostError};
use crate::protocol::{HostInbound, HostOutbound};
use crate::tab_host::NativeTabHost;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use trustmeter_core::{
    spawn_session_sweeper, AnalysisBackend, DispatchRouter, OutboundMessage, TabLifecycleEvent,
    TrustMeterConfig, TrustMeterError,
};

const TAB_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HostRuntime {
    router: Arc<DispatchRouter>,
    host: Arc<NativeTabHost>,
    outbound_rx: mpsc::UnboundedReceiver<HostOutbound>,
    sweep_interval: Duration,
}

impl HostRuntime {
    pub fn new(backend: Arc<dyn AnalysisBackend>, config: &TrustMeterConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let host = Arc::new(NativeTabHost::new(outbound_tx, TAB_QUERY_TIMEOUT));
        let router = Arc::new(DispatchRouter::new(backend, host.clone()));
        Self {
            router,
            host,
            outbound_rx,
            sweep_interval: Duration::from_secs(config.sessions.sweep_interval_secs),
        }
    }

    /// Serves until the browser closes `reader` or a framing error occurs.
    pub async fn run<R, W>(self, mut reader: R, writer: W) -> Result<(), HostError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let HostRuntime {
            router,
            host,
            outbound_rx,
            sweep_interval,
        } = self;

        let cancel_token = CancellationToken::new();
        let writer_task = tokio::spawn(write_loop(writer, outbound_rx, cancel_token.clone()));
        let sweeper = spawn_session_sweeper(
            router.registry().clone(),
            host.clone(),
            sweep_interval,
            cancel_token.clone(),
        );

        let result = read_loop(&mut reader, &router, &host).await;
        match &result {
            Ok(()) => info!("Browser closed the native messaging channel"),
            Err(e) => error!("Native messaging channel failed: error={}", e),
        }

        router
            .registry()
            .handle_lifecycle(TabLifecycleEvent::Suspend)
            .await;

        cancel_token.cancel();
        if let Err(e) = sweeper.await {
            warn!("Session sweeper ended abnormally: error={}", e);
        }
        match writer_task.await {
            Ok(Err(e)) => warn!("Writer stopped with error: error={}", e),
            Err(e) => warn!("Writer task ended abnormally: error={}", e),
            Ok(Ok(())) => {}
        }
        result
    }
}

async fn read_loop<R>(
    reader: &mut R,
    router: &Arc<DispatchRouter>,
    host: &Arc<NativeTabHost>,
) -> Result<(), HostError>
where
    R: AsyncRead + Unpin,
{
    while let Some(frame) = read_frame(reader).await? {
        let envelope: HostInbound = match serde_json::from_slice(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring unreadable envelope: error={}", e);
                if let Some(reply) = malformed_message_reply(&frame, &e) {
                    if let Err(e) = host.send(reply) {
                        debug!("Reply not delivered: error={}", e);
                    }
                }
                continue;
            }
        };

        match envelope {
            HostInbound::Message {
                id,
                sender,
                message,
            } => {
                let router = router.clone();
                let host = host.clone();
                tokio::spawn(async move {
                    let payload = router.handle_value(message, sender.context()).await;
                    if let Err(e) = host.send(HostOutbound::Reply { id, payload }) {
                        debug!("Reply not delivered: id={}, error={}", id, e);
                    }
                });
            }
            HostInbound::TabRemoved { tab_id } => {
                router
                    .registry()
                    .handle_lifecycle(TabLifecycleEvent::Removed(tab_id))
                    .await;
            }
            HostInbound::TabUpdated { tab_id, status } => {
                if status.as_deref() == Some("complete") {
                    router
                        .registry()
                        .handle_lifecycle(TabLifecycleEvent::NavigationComplete(tab_id))
                        .await;
                }
            }
            HostInbound::TabReplaced {
                added_tab_id,
                removed_tab_id,
            } => {
                router
                    .registry()
                    .handle_lifecycle(TabLifecycleEvent::Replaced {
                        added: added_tab_id,
                        removed: removed_tab_id,
                    })
                    .await;
            }
            HostInbound::Suspend => {
                router
                    .registry()
                    .handle_lifecycle(TabLifecycleEvent::Suspend)
                    .await;
            }
            HostInbound::TabsSnapshot { query_id, tab_ids } => {
                host.resolve_query(&query_id, tab_ids);
            }
        }
    }
    Ok(())
}

/// A `message` envelope with a readable `id` still gets an answer, so the
/// extension's callback settles.
fn malformed_message_reply(frame: &[u8], error: &serde_json::Error) -> Option<HostOutbound> {
    let raw: Value = serde_json::from_slice(frame).ok()?;
    if raw.get("kind").and_then(Value::as_str) != Some("message") {
        return None;
    }
    let id = raw.get("id").and_then(Value::as_u64)?;
    let err = TrustMeterError::InvalidInput(format!("Malformed envelope: {}", error));
    Some(HostOutbound::Reply {
        id,
        payload: Some(OutboundMessage::error(&err, None)),
    })
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound_rx: mpsc::UnboundedReceiver<HostOutbound>,
    cancel_token: CancellationToken,
) -> Result<(), HostError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let envelope = tokio::select! {
            envelope = outbound_rx.recv() => match envelope {
                Some(envelope) => envelope,
                None => return Ok(()),
            },
            _ = cancel_token.cancelled() => break,
        };
        write_envelope(&mut writer, &envelope).await;
    }

    // Flush what was queued before shutdown.
    while let Ok(envelope) = outbound_rx.try_recv() {
        write_envelope(&mut writer, &envelope).await;
    }
    Ok(())
}

async fn write_envelope<W>(writer: &mut W, envelope: &HostOutbound)
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = write_message(writer, envelope).await {
        // An oversized push is dropped; the channel itself stays usable.
        error!("Failed to write envelope: error={}", e);
    }
}
