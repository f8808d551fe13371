// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The duck-typed transport boundary.
//!
//! Wiring a [`Transport`] up to a real socket (WebSocket, TCP, in-process
//! queue) is the caller's job; this crate never opens a connection itself.
//! [`ChannelTransport`] is a reference implementation used by tests and by
//! callers that want to bridge two in-process endpoints without a real
//! network hop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::message::Message;

/// Events a transport pushes toward its owner.
#[derive(Debug)]
pub enum TransportEvent {
    Recv(Message),
    Closed,
    Error(String),
}

/// Byte-level counters and subscriptions used to forward an authoritative
/// client's I/O volume onto the app transport's own tracker.
#[derive(Debug, Default)]
pub struct StatsTracker {
    incoming_bytes: AtomicU64,
    outgoing_bytes: AtomicU64,
    incoming_tx: std::sync::OnceLock<broadcast::Sender<u64>>,
    outgoing_tx: std::sync::OnceLock<broadcast::Sender<u64>>,
}

impl StatsTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn incoming_sender(&self) -> &broadcast::Sender<u64> {
        self.incoming_tx.get_or_init(|| broadcast::channel(64).0)
    }

    fn outgoing_sender(&self) -> &broadcast::Sender<u64> {
        self.outgoing_tx.get_or_init(|| broadcast::channel(64).0)
    }

    pub fn record_incoming(&self, bytes: u64) {
        self.incoming_bytes.fetch_add(bytes, Ordering::Relaxed);
        let _ = self.incoming_sender().send(bytes);
    }

    pub fn record_outgoing(&self, bytes: u64) {
        self.outgoing_bytes.fetch_add(bytes, Ordering::Relaxed);
        let _ = self.outgoing_sender().send(bytes);
    }

    pub fn total_incoming(&self) -> u64 {
        self.incoming_bytes.load(Ordering::Relaxed)
    }

    pub fn total_outgoing(&self) -> u64 {
        self.outgoing_bytes.load(Ordering::Relaxed)
    }

    pub fn subscribe_incoming(&self) -> broadcast::Receiver<u64> {
        self.incoming_sender().subscribe()
    }

    pub fn subscribe_outgoing(&self) -> broadcast::Receiver<u64> {
        self.outgoing_sender().subscribe()
    }
}

/// The minimal surface every endpoint (app, client) must provide.
///
/// `send` never suspends the caller: a slow or dead peer is the
/// transport's problem, not the protocol base's.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, message: Message);
    fn close(&self);
    fn is_closed(&self) -> bool;
    fn stats(&self) -> Option<Arc<StatsTracker>> {
        None
    }
}

/// A transport plus the event stream it feeds, handed to a
/// [`crate::protocol::ProtocolIo`] on construction.
pub struct TransportHandle {
    pub transport: Arc<dyn Transport>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportHandle {
    pub fn new(transport: Arc<dyn Transport>, events: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        Self { transport, events }
    }

    pub fn send(&self, message: Message) {
        self.transport.send(message);
    }

    pub fn close(&self) {
        self.transport.close();
    }

    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// An in-process, channel-backed [`Transport`]. `channel_pair` wires two
/// of these together so that sending on one delivers a `Recv` event on
/// the other, which is enough to drive the whole protocol stack without
/// a real socket.
pub struct ChannelTransport {
    peer_events: mpsc::UnboundedSender<TransportEvent>,
    own_events: mpsc::UnboundedSender<TransportEvent>,
    closed: AtomicBool,
    stats: Arc<StatsTracker>,
}

impl Transport for ChannelTransport {
    fn send(&self, message: Message) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.stats.record_outgoing(1);
        let _ = self.peer_events.send(TransportEvent::Recv(message));
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.peer_events.send(TransportEvent::Closed);
        let _ = self.own_events.send(TransportEvent::Closed);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn stats(&self) -> Option<Arc<StatsTracker>> {
        Some(Arc::clone(&self.stats))
    }
}

/// Builds two connected `ChannelTransport` endpoints, each returned as a
/// ready-to-use [`TransportHandle`].
pub fn channel_pair() -> (TransportHandle, TransportHandle) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let side_a = Arc::new(ChannelTransport {
        peer_events: b_tx.clone(),
        own_events: a_tx.clone(),
        closed: AtomicBool::new(false),
        stats: StatsTracker::new(),
    });
    let side_b = Arc::new(ChannelTransport {
        peer_events: a_tx,
        own_events: b_tx,
        closed: AtomicBool::new(false),
        stats: StatsTracker::new(),
    });

    (TransportHandle::new(side_a, a_rx), TransportHandle::new(side_b, b_rx))
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
