// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The protocol base shared by every client- and session-side phase:
//! middleware chains, reply correlation, and timeout sweeping.
//!
//! Every `ProtocolIo` is owned exclusively by a single task for its whole
//! lifetime, so the pending-reply map never needs its own lock: mutation
//! only ever happens from the task driving that hop's phases.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::SyncError;
use crate::message::{Message, MessageId};
use crate::transport::{Transport, TransportEvent, TransportHandle};
use std::sync::Arc;

/// Runs before a message is handed to the transport. Returning `None`
/// drops the message (and rejects any waiting reply).
pub trait SendMiddleware: Send + Sync {
    fn before_send(&self, message: Message) -> Option<Message>;
}

/// Runs on every inbound message before reply correlation or dispatch.
/// Returning `None` drops the message silently.
pub trait RecvMiddleware: Send + Sync {
    fn before_recv(&self, message: Message) -> Option<Message>;
}

/// A resolved reply: the raw JSON value of the reply's payload body,
/// alongside the full reply `Message`.
pub type ReplyResult = Result<(Value, Message), SyncError>;

struct OutstandingReply {
    resolver: oneshot::Sender<ReplyResult>,
    deadline: Option<Instant>,
    reason: String,
}

/// A fully dispatched inbound event, after middleware and reply
/// correlation have been applied.
pub enum Incoming {
    /// A non-reply message the phase-specific code must still handle.
    Dispatch(Message),
    Closed,
    TransportError(String),
}

/// The shared machinery every phase runs on top of.
pub struct ProtocolIo {
    handle: TransportHandle,
    pending: HashMap<MessageId, OutstandingReply>,
    send_middleware: Vec<Arc<dyn SendMiddleware>>,
    recv_middleware: Vec<Arc<dyn RecvMiddleware>>,
}

impl ProtocolIo {
    pub fn new(handle: TransportHandle) -> Self {
        Self { handle, pending: HashMap::new(), send_middleware: Vec::new(), recv_middleware: Vec::new() }
    }

    pub fn with_middleware(
        handle: TransportHandle,
        send_middleware: Vec<Arc<dyn SendMiddleware>>,
        recv_middleware: Vec<Arc<dyn RecvMiddleware>>,
    ) -> Self {
        Self { handle, pending: HashMap::new(), send_middleware, recv_middleware }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.handle.transport
    }

    /// Sends `message`, optionally registering a reply waiter. `timeout`
    /// of `None` (or zero) means the reply, if any, never expires on its
    /// own; the caller is expected to eventually close the transport.
    pub fn send_message(
        &mut self,
        mut message: Message,
        reply: Option<oneshot::Sender<ReplyResult>>,
        timeout: Option<Duration>,
    ) {
        for middleware in &self.send_middleware {
            match middleware.before_send(message) {
                Some(m) => message = m,
                None => {
                    if let Some(tx) = reply {
                        let _ = tx.send(Err(SyncError::MiddlewareDropped));
                    }
                    return;
                }
            }
        }

        if let Some(tx) = reply {
            let reason = format!("timed out waiting for reply to '{}'", message.payload.kind);
            let deadline = timeout.filter(|d| !d.is_zero()).map(|d| Instant::now() + d);
            self.pending.insert(message.id, OutstandingReply { resolver: tx, deadline, reason });
        }

        self.handle.send(message);
    }

    /// Sends `message` with no reply correlation: queueing it into the
    /// pending map at all would be pure memory growth, so the simple
    /// fire-and-forget case skips `send_message`'s bookkeeping entirely.
    pub fn send_fire_and_forget(&mut self, message: Message) {
        self.send_message(message, None, None);
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.handle.recv().await
    }

    /// Applies recv middleware and, if the message is a reply, resolves
    /// the matching outstanding entry; otherwise returns it for dispatch.
    pub fn ingest(&mut self, event: TransportEvent) -> Option<Incoming> {
        match event {
            TransportEvent::Recv(mut message) => {
                for middleware in &self.recv_middleware {
                    match middleware.before_recv(message) {
                        Some(m) => message = m,
                        None => return None,
                    }
                }

                if let Some(reply_to_id) = message.reply_to_id {
                    if !self.resolve_reply(reply_to_id, message) {
                        tracing::warn!(reply_to = %reply_to_id, "unknown reply correlation");
                    }
                    None
                } else {
                    Some(Incoming::Dispatch(message))
                }
            }
            TransportEvent::Closed => Some(Incoming::Closed),
            TransportEvent::Error(reason) => Some(Incoming::TransportError(reason)),
        }
    }

    fn resolve_reply(&mut self, reply_to_id: MessageId, message: Message) -> bool {
        let Some(pending) = self.pending.remove(&reply_to_id) else {
            return false;
        };
        let value = serde_json::to_value(&message.payload).unwrap_or(Value::Null);
        let _ = pending.resolver.send(Ok((value, message)));
        true
    }

    /// Sweeps expired outstanding replies, rejecting each with a timeout
    /// error. A reply timeout is fatal to the protocol: this closes the
    /// transport itself rather than leave it to callers to notice and
    /// react to the returned `bool`. Returns whether anything fired.
    pub fn check_timeouts(&mut self) -> bool {
        let now = Instant::now();
        let expired: Vec<MessageId> = self
            .pending
            .iter()
            .filter(|(_, reply)| reply.deadline.is_some_and(|d| now >= d))
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(reply) = self.pending.remove(id) {
                let _ = reply.resolver.send(Err(SyncError::ReplyTimeout(reply.reason)));
            }
        }
        if !expired.is_empty() {
            self.handle.close();
        }
        !expired.is_empty()
    }

    pub fn has_outstanding(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Polls until every outstanding reply has resolved or timed out.
    /// `interval` should stay at or below 100ms; callers must not assume
    /// a bounded wait, only eventual completion.
    pub async fn drain_promises(&mut self, interval: Duration) {
        while self.has_outstanding() {
            tokio::time::sleep(interval).await;
            self.check_timeouts();
        }
    }

    /// Rejects every outstanding reply with `ConnectionClosed`, then
    /// closes the transport. Call this once, when a phase is tearing
    /// down for good.
    pub fn stop_listening(&mut self) {
        for (_, reply) in self.pending.drain() {
            let _ = reply.resolver.send(Err(SyncError::ConnectionClosed));
        }
        self.handle.close();
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
