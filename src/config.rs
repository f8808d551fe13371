// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session configuration.
//!
//! Unlike the upstream mux this crate was grown from, there is no CLI
//! surface here: a library caller constructs a [`SessionConfig`] directly
//! and hands it to [`crate::session::Session::new`].

use std::time::Duration;

/// Tunables for a single session's lifecycle.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether the first-joined client (and its successors on handoff)
    /// is elected authoritative for the session.
    pub peer_authoritative: bool,
    /// How long the session waits for a client's handshake reply before
    /// treating the client as failed.
    pub handshake_timeout: Duration,
    /// Default reply timeout used when a caller does not specify one
    /// explicitly via `Protocol::send_message`.
    pub default_reply_timeout: Duration,
    /// Poll granularity used by `drain_promises` while waiting for the
    /// outstanding-reply map to empty. Must stay at or below 100ms.
    pub drain_poll_interval: Duration,
}

impl SessionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn default_reply_timeout(&self) -> Duration {
        self.default_reply_timeout
    }

    pub fn drain_poll_interval(&self) -> Duration {
        self.drain_poll_interval
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            peer_authoritative: true,
            handshake_timeout: Duration::from_secs(10),
            default_reply_timeout: Duration::from_secs(5),
            drain_poll_interval: Duration::from_millis(50),
        }
    }
}
