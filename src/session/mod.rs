// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session side of the multiplexer: one app endpoint, many client
//! endpoints, one sync cache.

pub mod execution;
pub mod handshake;
pub mod multiplexer;
pub mod sync;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use uuid::Uuid;

use crate::cache::SyncCache;
use crate::client::{Client, ClientId, ClientPhase};
use crate::config::SessionConfig;
use crate::error::SyncError;
use crate::message::{payload_type, Message, Payload};
use crate::protocol::{ProtocolIo, RecvMiddleware, ReplyResult, SendMiddleware};
use crate::rules::{self, PayloadRule};
use crate::transport::{StatsTracker, Transport, TransportHandle};

/// A message queued for the app's `ProtocolIo`, crossing from whichever
/// client task forwarded it into the task driving the app transport.
/// This is how Execution-phase client->app traffic gets the same
/// middleware and timeout-correlated reply handling as every other hop,
/// instead of going straight to the raw transport.
pub(crate) struct AppOutbound {
    pub message: Message,
    pub reply: Option<oneshot::Sender<ReplyResult>>,
    pub timeout: Option<Duration>,
}

/// The session's own lifecycle phase, mirroring [`ClientPhase`] but for
/// the single app-facing hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    Handshake,
    Sync,
    Execution,
    Closed,
}

/// One multiplexer instance: an app transport fanning out to however
/// many client transports join over the session's lifetime.
pub struct Session {
    pub session_id: String,
    pub config: SessionConfig,
    pub clients: RwLock<HashMap<ClientId, Arc<Client>>>,
    pub cache: RwLock<SyncCache>,
    app_transport: Arc<dyn Transport>,
    app_io: Mutex<Option<ProtocolIo>>,
    app_outbound_tx: mpsc::UnboundedSender<AppOutbound>,
    app_outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<AppOutbound>>>,
    client_send_middleware: Vec<Arc<dyn SendMiddleware>>,
    client_recv_middleware: Vec<Arc<dyn RecvMiddleware>>,
    authoritative: RwLock<Option<ClientId>>,
    stats_forward: Mutex<Option<tokio::task::JoinHandle<()>>>,
    phase_tx: watch::Sender<SessionPhase>,
    next_order: AtomicU64,
}

impl Session {
    pub fn new(session_id: impl Into<String>, config: SessionConfig, app_handle: TransportHandle) -> Arc<Self> {
        Self::new_with_middleware(session_id, config, app_handle, Vec::new(), Vec::new())
    }

    /// Like [`Session::new`], but attaches `send_middleware`/`recv_middleware`
    /// to every `ProtocolIo` the session constructs: the app's own, and
    /// each client's as it joins via [`Session::add_client`].
    pub fn new_with_middleware(
        session_id: impl Into<String>,
        config: SessionConfig,
        app_handle: TransportHandle,
        send_middleware: Vec<Arc<dyn SendMiddleware>>,
        recv_middleware: Vec<Arc<dyn RecvMiddleware>>,
    ) -> Arc<Self> {
        let app_transport = Arc::clone(&app_handle.transport);
        let io = ProtocolIo::with_middleware(app_handle, send_middleware.clone(), recv_middleware.clone());
        let (phase_tx, _) = watch::channel(SessionPhase::Handshake);
        let (app_outbound_tx, app_outbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            session_id: session_id.into(),
            config,
            clients: RwLock::new(HashMap::new()),
            cache: RwLock::new(SyncCache::new()),
            app_transport,
            app_io: Mutex::new(Some(io)),
            app_outbound_tx,
            app_outbound_rx: Mutex::new(Some(app_outbound_rx)),
            client_send_middleware: send_middleware,
            client_recv_middleware: recv_middleware,
            authoritative: RwLock::new(None),
            stats_forward: Mutex::new(None),
            phase_tx,
            next_order: AtomicU64::new(0),
        })
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase_tx.borrow()
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        let _ = self.phase_tx.send(phase);
    }

    /// Drives the session's own Handshake -> Sync -> Execution lifecycle
    /// against the app transport. Returns once the app transport closes
    /// or every client has left.
    pub async fn run(self: Arc<Self>) -> Result<(), SyncError> {
        let mut io = self.app_io.lock().await.take().ok_or(SyncError::InvalidPhaseTransition {
            from: "Closed",
            to: "Handshake",
        })?;
        let mut outbound_rx = self.app_outbound_rx.lock().await.take().ok_or(SyncError::InvalidPhaseTransition {
            from: "Closed",
            to: "Handshake",
        })?;
        multiplexer::drive_app(&self, &mut io, &mut outbound_rx).await
    }

    /// Accepts a newly connected client transport and spawns its
    /// dedicated lifecycle task. Returns the assigned client id.
    pub async fn add_client(self: &Arc<Self>, handle: TransportHandle) -> ClientId {
        let id = Uuid::new_v4();
        let order = self.next_order.fetch_add(1, Ordering::Relaxed);
        let client = Client::new(id, order, Arc::clone(&handle.transport));

        let is_first = {
            let mut clients = self.clients.write().await;
            let is_first = clients.is_empty();
            clients.insert(id, Arc::clone(&client));
            is_first
        };
        if self.config.peer_authoritative && is_first {
            self.elect(id).await;
        }

        let session = Arc::clone(self);
        tokio::spawn(async move {
            multiplexer::run_client(session, client, handle).await;
        });
        id
    }

    /// Sends a message straight to the app with no reply expected, same
    /// as `route_to_client` does for client-bound fan-out. Non-suspending:
    /// a slow app endpoint is the transport's problem, not the caller's.
    pub fn send_to_app(&self, message: Message) {
        self.app_transport.send(message);
    }

    /// Applies the rules table to a message arriving from `client_id` on
    /// its way to the app, recording asset-creator correlation as a side
    /// effect. Most messages are handed back to the caller to forward as
    /// a plain fire-and-forget send; an asset-creator request (the one
    /// payload kind that genuinely expects an app reply routed back to a
    /// specific client — see spec scenario 5) is instead forwarded here
    /// directly, through the app's own `ProtocolIo`, so it gets a real
    /// reply correlation and timeout the same as every other hop (see
    /// `ProtocolIo::check_timeouts`) rather than a side map with no
    /// expiry. Takes `self` by `Arc` so the reply-awaiting task below can
    /// outlive this call.
    pub async fn preprocess_from_client(self: Arc<Self>, client_id: ClientId, message: Message) -> Option<Message> {
        let rule = rules::lookup(&message.payload.kind);
        match rule {
            PayloadRule::AssetCreatorRequest => {
                self.cache.write().await.record_asset_creator(&message);
            }
            PayloadRule::AssetUpdate => {
                self.cache.write().await.apply_asset_update(&message);
            }
            PayloadRule::Missing => {
                tracing::debug!(kind = %message.payload.kind, "no rule registered for client-originated payload");
            }
            _ => {}
        }

        // A client-originated reply can itself be the completion of an
        // app-originated asset creator (the engine created the asset and
        // is reporting its id/duration back); that's the other half of
        // the symmetric check in the reply-forwarding task below.
        if let Some(reply_to) = message.reply_to_id {
            if self.cache.read().await.has_asset_creator(&reply_to) {
                self.cache.write().await.complete_asset_creation(reply_to, &message);
            }
            return Some(message);
        }

        if rule != PayloadRule::AssetCreatorRequest {
            return Some(message);
        }

        let (tx, rx) = oneshot::channel();
        let timeout = self.config.default_reply_timeout();
        let sent =
            self.app_outbound_tx.send(AppOutbound { message, reply: Some(tx), timeout: Some(timeout) }).is_ok();
        if sent {
            tokio::spawn(async move {
                let Ok(Ok((_, reply))) = rx.await else { return };
                let reply_to = reply.reply_to_id.unwrap_or(reply.id);
                if self.cache.read().await.has_asset_creator(&reply_to) {
                    self.cache.write().await.complete_asset_creation(reply_to, &reply);
                }
                self.send_to_client(client_id, reply).await;
            });
        }
        None
    }

    /// Applies the rules table to a message arriving from the app,
    /// mutating the cache as needed, then fans it out to every client.
    /// A reply to a client-forwarded request never reaches here: it's
    /// resolved directly against the waiter registered in
    /// `preprocess_from_client`, the same as any other `ProtocolIo`
    /// reply correlation (see `ProtocolIo::ingest`).
    pub(crate) async fn route_from_app(&self, message: Message) {
        match rules::lookup(&message.payload.kind) {
            PayloadRule::ReserveActor | PayloadRule::CreateActor => {
                self.cache.write().await.initialize_actor(&message);
            }
            PayloadRule::ActorUpdate => {
                self.cache.write().await.update_actor(&message);
            }
            PayloadRule::AssetCreatorRequest => {
                self.cache.write().await.record_asset_creator(&message);
            }
            PayloadRule::AssetUpdate => {
                self.cache.write().await.apply_asset_update(&message);
            }
            PayloadRule::UnloadAssets => {
                self.cache.write().await.unload_assets(&message);
            }
            PayloadRule::Missing => {
                tracing::debug!(kind = %message.payload.kind, "no rule registered for app-originated payload");
            }
            PayloadRule::UserLeft => {
                tracing::debug!(kind = %message.payload.kind, "unexpected app-originated payload kind");
            }
        }

        self.broadcast(message).await;
    }

    /// Fans `message` out to every client, respecting the actor
    /// exclusivity rule (if the message targets an exclusive actor, only
    /// that actor's owning user's client receives it).
    pub(crate) async fn broadcast(&self, message: Message) {
        let exclusive_owner = self.exclusive_owner_of(&message).await;
        let clients = self.clients.read().await;
        let mut ordered: Vec<_> = clients.values().collect();
        ordered.sort_by_key(|c| c.order);
        for client in ordered {
            if let Some(owner) = &exclusive_owner {
                if client.user_id().as_deref() != Some(owner.as_str()) {
                    continue;
                }
            }
            self.route_to_client(client, message.clone());
        }
    }

    async fn send_to_client(&self, client_id: ClientId, message: Message) {
        let clients = self.clients.read().await;
        if let Some(client) = clients.get(&client_id) {
            self.route_to_client(client, message);
        }
    }

    fn route_to_client(&self, client: &Arc<Client>, message: Message) {
        if client.phase() == ClientPhase::Execution {
            client.transport.send(message);
        } else {
            client.queue_message(message);
        }
    }

    async fn exclusive_owner_of(&self, message: &Message) -> Option<String> {
        let actor_id = message
            .payload
            .get("actorId")
            .and_then(|v| v.as_str())
            .or_else(|| message.payload.get("actor").and_then(|a| a.get("id")).and_then(|v| v.as_str()))?;
        self.cache.read().await.actors.get(actor_id).and_then(|a| a.exclusive_to_user.clone())
    }

    /// Runs authoritative election: uninstalls the previous authority's
    /// stats forwarding (if any), marks `client_id` authoritative, and
    /// installs forwarding from its transport stats onto the app's.
    pub(crate) async fn elect(&self, client_id: ClientId) {
        if let Some(previous) = self.authoritative.write().await.replace(client_id) {
            if previous == client_id {
                return;
            }
            if let Some(client) = self.clients.read().await.get(&previous) {
                client.authoritative.store(false, Ordering::Relaxed);
            }
        }
        if let Some(handle) = self.stats_forward.lock().await.take() {
            handle.abort();
        }

        let clients = self.clients.read().await;
        let Some(client) = clients.get(&client_id) else { return };
        client.authoritative.store(true, Ordering::Relaxed);

        if let (Some(client_stats), Some(app_stats)) = (client.transport.stats(), self.app_transport.stats()) {
            let handle = spawn_stats_forwarder(client_stats, app_stats);
            *self.stats_forward.lock().await = Some(handle);
        }
    }

    /// Called when a client's dedicated task exits, for any reason.
    pub(crate) async fn remove_client(&self, client_id: ClientId) {
        let (was_authoritative, user_id) = {
            let mut clients = self.clients.write().await;
            match clients.remove(&client_id) {
                Some(client) => {
                    let was_authoritative = client.is_authoritative();
                    // The client is already out of `self.clients`, so `elect`
                    // below can't find it to clear this itself.
                    client.authoritative.store(false, Ordering::Relaxed);
                    (was_authoritative, client.user_id())
                }
                None => return,
            }
        };

        if let Some(user_id) = &user_id {
            self.send_to_app(Message::new(Payload::new(payload_type::USER_LEFT, serde_json::json!({"userId": user_id}))));
        }

        if was_authoritative && self.config.peer_authoritative {
            self.handle_authority_vacated().await;
        }

        if self.clients.read().await.is_empty() {
            self.set_phase(SessionPhase::Closed);
            self.app_transport.close();
        }
    }

    async fn handle_authority_vacated(&self) {
        let next = {
            let clients = self.clients.read().await;
            let mut candidates: Vec<_> =
                clients.values().filter(|c| c.phase() == ClientPhase::Execution).collect();
            candidates.sort_by_key(|c| c.order);
            candidates.first().map(|c| c.id)
        };
        match next {
            Some(id) => self.elect(id).await,
            None => {
                *self.authoritative.write().await = None;
                if let Some(handle) = self.stats_forward.lock().await.take() {
                    handle.abort();
                }
            }
        }
    }
}

fn spawn_stats_forwarder(
    client_stats: Arc<StatsTracker>,
    app_stats: Arc<StatsTracker>,
) -> tokio::task::JoinHandle<()> {
    let mut incoming = client_stats.subscribe_incoming();
    let mut outgoing = client_stats.subscribe_outgoing();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = incoming.recv() => match result {
                    Ok(bytes) => app_stats.record_incoming(bytes),
                    Err(_) => break,
                },
                result = outgoing.recv() => match result {
                    Ok(bytes) => app_stats.record_outgoing(bytes),
                    Err(_) => break,
                },
            }
        }
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
