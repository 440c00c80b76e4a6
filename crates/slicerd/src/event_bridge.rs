//! EventBridge - switch events over line-delimited JSON
//!
//! An external switch-control shim connects, writes one [`SwitchEvent`] per
//! line and reads one [`EventReply`] line back for each. A shim usually
//! multiplexes every switch over a single connection, so events are handed
//! to one worker task per switch: a slow re-apply on one switch never stalls
//! another, while each switch still sees its own events in order.
//!
//! Replies are written as they complete. An event carrying a numeric `id`
//! gets it echoed in its reply:
//!
//! ```text
//! -> {"id": 7, "event": "switch_connected", "dpid": "0000000000000001"}
//! <- {"id": 7, "reply": "ack", "dpid": 1, "failures": 0}
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use slicing_common::{SliceError, SliceResult};
use slicing_types::Dpid;

use crate::events::{EventReply, SwitchEvent, SwitchEventHandler};

/// Longest accepted event line, newline excluded
pub const MAX_EVENT_LINE: usize = 64 * 1024;

/// Events queued per switch before further ones are refused
const SWITCH_QUEUE: usize = 1024;

const REPLY_QUEUE: usize = 1024;

/// One reply line; `id` echoes the event's id when it had one
#[derive(Debug, Serialize)]
struct ReplyLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(flatten)]
    reply: EventReply,
}

type TaggedEvent = (Option<u64>, SwitchEvent);

pub struct EventBridge {
    listener: TcpListener,
    handler: Arc<dyn SwitchEventHandler>,
}

impl EventBridge {
    pub async fn bind(listen: SocketAddr, handler: Arc<dyn SwitchEventHandler>) -> SliceResult<Self> {
        let listener = TcpListener::bind(listen).await?;
        info!(listen = %listener.local_addr()?, "Event bridge listening");
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> SliceResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts shim connections until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> SliceResult<()> {
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept event connection");
                        continue;
                    }
                },
            };

            info!(peer = %peer, "Switch-control shim connected");
            let handler = self.handler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let (reader, writer) = stream.into_split();
                if let Err(e) = serve_connection(reader, writer, handler, shutdown).await {
                    warn!(peer = %peer, error = %e, "Event connection failed");
                }
                info!(peer = %peer, "Switch-control shim disconnected");
            });
        }

        info!("Event bridge stopped");
        Ok(())
    }
}

async fn serve_connection<R, W>(
    reader: R,
    writer: W,
    handler: Arc<dyn SwitchEventHandler>,
    shutdown: CancellationToken,
) -> SliceResult<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_EVENT_LINE));
    let (reply_tx, reply_rx) = mpsc::channel(REPLY_QUEUE);
    let writer_task = tokio::spawn(write_replies(writer, reply_rx));
    let mut workers: HashMap<Dpid, mpsc::Sender<TaggedEvent>> = HashMap::new();

    let read_result = loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            line = lines.next() => match line {
                Some(Ok(line)) => line,
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!(limit = MAX_EVENT_LINE, "Event line too long, closing connection");
                    let message = format!("event line exceeds {} bytes", MAX_EVENT_LINE);
                    let _ = reply_tx.send(error_reply(None, message)).await;
                    break Ok(());
                }
                Some(Err(LinesCodecError::Io(e))) => break Err(SliceError::from(e)),
                None => break Ok(()),
            },
        };
        if line.trim().is_empty() {
            continue;
        }

        let (id, event) = match decode_event(&line) {
            (id, Ok(event)) => (id, event),
            (id, Err(message)) => {
                debug!(error = %message, "Undecodable switch event");
                if reply_tx.send(error_reply(id, message)).await.is_err() {
                    break Ok(());
                }
                continue;
            }
        };

        let dpid = event.dpid();
        let worker = workers
            .entry(dpid)
            .or_insert_with(|| spawn_switch_worker(dpid, handler.clone(), reply_tx.clone()));
        if let Err(e) = worker.try_send((id, event)) {
            let message = match e {
                TrySendError::Full(_) => format!("event queue for switch {} is full", dpid),
                TrySendError::Closed(_) => format!("event worker for switch {} stopped", dpid),
            };
            warn!(dpid = %dpid, error = %message, "Switch event refused");
            if reply_tx.send(error_reply(id, message)).await.is_err() {
                break Ok(());
            }
        }
    };

    // Workers drain their queues, then the writer sees every sender gone
    drop(workers);
    drop(reply_tx);
    let write_result = writer_task
        .await
        .map_err(|e| SliceError::internal(format!("reply writer failed: {}", e)))?;
    read_result.and(write_result)
}

/// Splits a line into its optional id and the decoded event
fn decode_event(line: &str) -> (Option<u64>, Result<SwitchEvent, String>) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return (None, Err(e.to_string())),
    };
    let id = value.get("id").and_then(Value::as_u64);
    (id, serde_json::from_value(value).map_err(|e| e.to_string()))
}

fn error_reply(id: Option<u64>, message: String) -> ReplyLine {
    ReplyLine {
        id,
        reply: EventReply::Error { message },
    }
}

fn spawn_switch_worker(
    dpid: Dpid,
    handler: Arc<dyn SwitchEventHandler>,
    replies: mpsc::Sender<ReplyLine>,
) -> mpsc::Sender<TaggedEvent> {
    let (tx, mut rx) = mpsc::channel::<TaggedEvent>(SWITCH_QUEUE);
    tokio::spawn(async move {
        debug!(dpid = %dpid, "Switch event worker started");
        while let Some((id, event)) = rx.recv().await {
            let reply = handler.handle_event(event).await;
            if replies.send(ReplyLine { id, reply }).await.is_err() {
                break;
            }
        }
        debug!(dpid = %dpid, "Switch event worker stopped");
    });
    tx
}

async fn write_replies<W>(mut writer: W, mut replies: mpsc::Receiver<ReplyLine>) -> SliceResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = replies.recv().await {
        let mut encoded = serde_json::to_vec(&reply)
            .map_err(|e| SliceError::internal(format!("failed to encode reply: {}", e)))?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
    }
    writer.shutdown().await?;
    Ok(())
}
