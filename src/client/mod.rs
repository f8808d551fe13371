// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The client side of the multiplexer: one of these exists per engine
//! client connected to a session, carried through Handshake, Sync, and
//! Execution by a single dedicated task (see [`crate::session::multiplexer::run_client`]).

pub mod execution;
pub mod handshake;
pub mod sync;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use uuid::Uuid;

use crate::message::Message;
use crate::transport::Transport;

pub type ClientId = Uuid;

/// The phase a client is currently in. Monotonically advances
/// Handshake -> Sync -> Execution -> Closed; never goes backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientPhase {
    Handshake,
    Sync,
    Execution,
    Closed,
}

/// A single connected engine client.
pub struct Client {
    pub id: ClientId,
    /// Monotonic join order, used to break authoritative-election ties
    /// and to order replay fan-out deterministically.
    pub order: u64,
    user_id: RwLock<Option<String>>,
    phase_tx: watch::Sender<ClientPhase>,
    pub authoritative: AtomicBool,
    queued: Mutex<Vec<Message>>,
    pub transport: Arc<dyn Transport>,
}

impl Client {
    pub fn new(id: ClientId, order: u64, transport: Arc<dyn Transport>) -> Arc<Self> {
        let (phase_tx, _) = watch::channel(ClientPhase::Handshake);
        Arc::new(Self {
            id,
            order,
            user_id: RwLock::new(None),
            phase_tx,
            authoritative: AtomicBool::new(false),
            queued: Mutex::new(Vec::new()),
            transport,
        })
    }

    pub fn phase(&self) -> ClientPhase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ClientPhase> {
        self.phase_tx.subscribe()
    }

    pub(crate) fn set_phase(&self, phase: ClientPhase) {
        let _ = self.phase_tx.send(phase);
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_user_id(&self, user_id: String) {
        *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = Some(user_id);
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative.load(Ordering::Relaxed)
    }

    /// Buffers `message` for delivery once this client reaches
    /// Execution. Messages are returned in insertion order by
    /// `filter_queued_messages`.
    pub fn queue_message(&self, message: Message) {
        self.queued.lock().unwrap_or_else(|e| e.into_inner()).push(message);
    }

    /// Removes and returns every queued message matching `predicate`,
    /// in original order, leaving the rest queued for a later drain.
    pub fn filter_queued_messages(&self, mut predicate: impl FnMut(&Message) -> bool) -> Vec<Message> {
        let mut queued = self.queued.lock().unwrap_or_else(|e| e.into_inner());
        let mut matched = Vec::new();
        queued.retain(|message| {
            if predicate(message) {
                matched.push(message.clone());
                false
            } else {
                true
            }
        });
        matched
    }

    pub fn drain_all_queued(&self) -> Vec<Message> {
        self.filter_queued_messages(|_| true)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
