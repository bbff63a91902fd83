//! Realtime session engine: owns the duplex channel, multiplexes inbound
//! frames, heartbeats, outbound calls and shutdown, and correlates
//! acknowledgements back to their callers.

pub mod write_once;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::mangle;
use crate::protocol::{
    self, EVENT_JOIN_PROJECT, EVENT_PRESENCE_PREFIX, EventPayload, FrameError, JoinProjectArgs,
    Opcode, Packet, RPC_JOIN_DOCUMENT, RPC_LEAVE_DOCUMENT,
};
use crate::transport::{QueueStats, SendQueue, Transport, TransportError};
use write_once::WriteOnce;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed wire frame; fatal to the session.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
    /// Well-framed but semantically unexpected traffic.
    #[error("unexpected content: {0}")]
    Content(String),
    /// Undecodable JSON payload; fatal, the stream cannot be trusted.
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    /// The remote call outlived its timeout. Caller-recoverable; the
    /// session keeps running.
    #[error("remote call timed out")]
    Timeout,
    /// The session terminated before (or while) the operation completed.
    #[error("session closed")]
    Closed,
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server rejected a document lookup; carries its error value.
    #[error("document lookup failed: {0}")]
    Document(Value),
}

/// What a pending register eventually receives.
#[derive(Debug, Clone)]
enum Delivery<T> {
    Value(T),
    Closed,
}

type ReplySlot = Arc<WriteOnce<Delivery<Vec<Value>>>>;

struct Shared {
    outbound: SendQueue<Vec<u8>>,
    /// Correlation table: outstanding call id to its reply register. Each
    /// id is inserted once by its caller and removed once, by the loop on
    /// ACK or by the caller on timeout.
    pending: StdMutex<HashMap<u64, ReplySlot>>,
    /// Monotonic packet number; ids are never reused within a session.
    next_id: AtomicU64,
    join: WriteOnce<Delivery<JoinProjectArgs>>,
    /// ACKs that matched no table entry (late after a timeout, or
    /// duplicated by the server). Dropped, but observable.
    unmatched_acks: AtomicU64,
}

impl Shared {
    fn remove_pending(&self, id: u64) {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&id);
    }
}

/// Handle to one open realtime session.
///
/// Owns exactly one multiplexing task for its lifetime. Any number of
/// caller tasks may issue [`call`](Self::call), [`get_document`],
/// [`join_info`] and [`close`] concurrently.
///
/// [`get_document`]: Self::get_document
/// [`join_info`]: Self::join_info
/// [`close`]: Self::close
pub struct Session {
    shared: Arc<Shared>,
    call_timeout: Duration,
    loop_task: AsyncMutex<Option<JoinHandle<Result<(), SessionError>>>>,
}

impl Session {
    /// Takes over an already-authenticated duplex channel and spawns the
    /// multiplexing loop.
    pub fn start<T>(transport: T, config: SessionConfig) -> Self
    where
        T: Transport + 'static,
    {
        let shared = Arc::new(Shared {
            outbound: SendQueue::new(config.outbound_capacity),
            pending: StdMutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            join: WriteOnce::new(),
            unmatched_acks: AtomicU64::new(0),
        });
        let task = tokio::spawn(run_loop(transport, shared.clone()));
        Session {
            shared,
            call_timeout: config.call_timeout,
            loop_task: AsyncMutex::new(Some(task)),
        }
    }

    /// Issues a remote call and waits for its acknowledgement data.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, SessionError> {
        call_remote(
            self.shared.clone(),
            self.call_timeout,
            name.to_string(),
            args,
        )
        .await
    }

    /// The server's one-shot join confirmation; waits until it arrives.
    pub async fn join_info(&self) -> Result<JoinProjectArgs, SessionError> {
        match self.shared.join.get().await {
            Delivery::Value(info) => Ok(info),
            Delivery::Closed => Err(SessionError::Closed),
        }
    }

    /// Fetches a document's lines by id, unmangling the transmitted text.
    pub async fn get_document(&self, doc_id: &str) -> Result<Vec<String>, SessionError> {
        let reply = self
            .call(
                RPC_JOIN_DOCUMENT,
                vec![json!(doc_id), json!({ "encodeRanges": true })],
            )
            .await?;

        // Reply is a tuple: [error-or-null, lines].
        let error = reply.first().cloned().unwrap_or(Value::Null);
        if !error.is_null() {
            return Err(SessionError::Document(error));
        }
        let lines = reply.get(1).and_then(Value::as_array).ok_or_else(|| {
            SessionError::Content("document reply carried no line array".to_string())
        })?;

        let mut out = Vec::with_capacity(lines.len());
        for line in lines {
            let text = line.as_str().ok_or_else(|| {
                SessionError::Content("document line is not a string".to_string())
            })?;
            out.push(
                mangle::unmangle(text).map_err(|err| SessionError::Content(err.to_string()))?,
            );
        }

        // Best-effort release; the fetch is already complete, so the
        // caller gets its lines without riding out this call's timeout.
        let shared = self.shared.clone();
        let call_timeout = self.call_timeout;
        let doc = doc_id.to_string();
        tokio::spawn(async move {
            let args = vec![json!(doc)];
            if let Err(err) =
                call_remote(shared, call_timeout, RPC_LEAVE_DOCUMENT.to_string(), args).await
            {
                debug!(%err, doc_id = %doc, "leaveDoc cleanup failed");
            }
        });

        Ok(out)
    }

    /// Closes the outbound queue and waits for the multiplexing loop to
    /// exit, surfacing the error it died with, if any.
    ///
    /// The task slot stays locked across the join, so concurrent closers
    /// also block until the loop is gone; the first one gets its error.
    pub async fn close(&self) -> Result<(), SessionError> {
        self.shared.outbound.close();
        let mut task = self.loop_task.lock().await;
        match task.take() {
            Some(handle) => handle
                .await
                .unwrap_or_else(|err| Err(SessionError::Content(format!("session task failed: {err}")))),
            None => Ok(()),
        }
    }

    /// ACK frames that matched no outstanding call since the session opened.
    pub fn unmatched_acks(&self) -> u64 {
        self.shared.unmatched_acks.load(Ordering::SeqCst)
    }

    pub fn outbound_stats(&self) -> QueueStats {
        self.shared.outbound.stats()
    }
}

/// The call body proper, over the shared state so cleanup calls can run
/// detached from the [`Session`] handle.
async fn call_remote(
    shared: Arc<Shared>,
    call_timeout: Duration,
    name: String,
    args: Vec<Value>,
) -> Result<Vec<Value>, SessionError> {
    let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
    let slot: ReplySlot = Arc::new(WriteOnce::new());
    {
        let mut pending = shared.pending.lock().expect("pending lock poisoned");
        let prev = pending.insert(id, slot.clone());
        assert!(prev.is_none(), "duplicate packet id {id}");
    }

    let payload = EventPayload { name, args };
    let frame = protocol::encode_packet(&Packet::event(id, &payload));
    if shared.outbound.push(frame).is_err() {
        shared.remove_pending(id);
        return Err(SessionError::Closed);
    }
    trace!(id, name = %payload.name, "call enqueued");

    match tokio::time::timeout(call_timeout, slot.get()).await {
        Ok(Delivery::Value(reply)) => Ok(reply),
        Ok(Delivery::Closed) => Err(SessionError::Closed),
        Err(_) => {
            // Reclaim the table entry now so a late ACK lands in the
            // unmatched path instead of an abandoned register.
            shared.remove_pending(id);
            Err(SessionError::Timeout)
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Lets an abandoned loop wind down instead of idling on the select.
        self.shared.outbound.close();
    }
}

enum Flow {
    Continue,
    Stop,
}

async fn run_loop<T: Transport>(mut transport: T, shared: Arc<Shared>) -> Result<(), SessionError> {
    let result = pump(&mut transport, &shared).await;
    shutdown(&shared);
    match &result {
        Ok(()) => debug!("session loop finished"),
        Err(err) => warn!(%err, "session loop terminated"),
    }
    result
}

/// The single multiplexing loop: forwards outbound frames and dispatches
/// inbound ones until the queue closes, the peer disconnects, or a
/// protocol error makes the stream untrustworthy.
async fn pump<T: Transport>(transport: &mut T, shared: &Shared) -> Result<(), SessionError> {
    loop {
        tokio::select! {
            outbound = shared.outbound.recv() => match outbound {
                Some(frame) => transport.send(frame).await?,
                None => {
                    debug!("outbound queue closed");
                    return Ok(());
                }
            },
            inbound = transport.recv() => match inbound {
                Some(frame) => {
                    if let Flow::Stop = dispatch(frame, shared)? {
                        return Ok(());
                    }
                }
                None => {
                    debug!("transport ended");
                    return Ok(());
                }
            },
        }
    }
}

fn dispatch(frame: Vec<u8>, shared: &Shared) -> Result<Flow, SessionError> {
    let packet = protocol::decode_packet(&frame)?;
    match packet.opcode {
        // Handshake acknowledgement; nothing to do.
        Opcode::Connect => {}

        // Echo the identical frame to keep the connection alive. A closed
        // queue means the session is already winding down.
        Opcode::Heartbeat => {
            let _ = shared.outbound.push(frame);
        }

        Opcode::Event => {
            let event = packet.event_payload()?;
            if event.name.starts_with(EVENT_PRESENCE_PREFIX) {
                // Other collaborators' cursor traffic; nothing we model.
                trace!(name = %event.name, "presence event discarded");
            } else if event.name == EVENT_JOIN_PROJECT {
                let args = event.args.into_iter().next().ok_or_else(|| {
                    SessionError::Content("join confirmation without arguments".to_string())
                })?;
                let info: JoinProjectArgs = serde_json::from_value(args)?;
                if shared.join.peek().is_some() {
                    warn!("duplicate join confirmation ignored");
                } else {
                    shared.join.set(Delivery::Value(info));
                }
            } else {
                return Err(SessionError::Content(format!(
                    "unexpected server event '{}'",
                    event.name
                )));
            }
        }

        Opcode::Ack => {
            // The codec guarantees an id on ACK frames.
            let id = packet.id.ok_or(FrameError::AckIdMissing)?;
            let slot = shared
                .pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&id);
            match slot {
                Some(slot) => {
                    // An ACK without data carries no payload at all.
                    let reply: Vec<Value> = if packet.payload.is_empty() {
                        Vec::new()
                    } else {
                        serde_json::from_str(&packet.payload)?
                    };
                    slot.set(Delivery::Value(reply));
                }
                None => {
                    shared.unmatched_acks.fetch_add(1, Ordering::SeqCst);
                    warn!(id, "ack matched no pending call, dropped");
                }
            }
        }

        Opcode::Disconnect => return Ok(Flow::Stop),

        Opcode::Error => {
            let err = packet.error_payload();
            return Err(SessionError::Content(format!(
                "server error: {} ({})",
                err.reason, err.advice
            )));
        }

        other => {
            return Err(SessionError::Content(format!(
                "unexpected opcode {other:?}"
            )));
        }
    }
    Ok(Flow::Continue)
}

/// Runs on every loop exit path: unblocks `close()` via the queue, fails
/// every outstanding waiter immediately instead of letting it time out,
/// and resolves a never-set join register.
fn shutdown(shared: &Shared) {
    shared.outbound.close();
    let drained: Vec<ReplySlot> = {
        let mut pending = shared.pending.lock().expect("pending lock poisoned");
        pending.drain().map(|(_, slot)| slot).collect()
    };
    for slot in drained {
        slot.set(Delivery::Closed);
    }
    if shared.join.peek().is_none() {
        shared.join.set(Delivery::Closed);
    }
}
