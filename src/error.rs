// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the session multiplexer core.

use std::fmt;

/// Errors surfaced by the protocol base, client/session phase machines, and
/// the sync cache.
#[derive(Debug, Clone)]
pub enum SyncError {
    /// A reply was awaited past its timeout.
    ReplyTimeout(String),
    /// The transport closed (or was closed) before a pending reply arrived.
    ConnectionClosed,
    /// Send middleware dropped the message before it reached the transport.
    MiddlewareDropped,
    /// A reply referenced a message ID with no outstanding entry.
    UnknownCorrelation(uuid::Uuid),
    /// The handshake did not complete (timeout, bad payload, or early close).
    HandshakeFailed(String),
    /// A phase transition was attempted out of order.
    InvalidPhaseTransition { from: &'static str, to: &'static str },
    /// The underlying transport reported an error.
    Transport(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::ReplyTimeout(reason) => write!(f, "reply timed out: {reason}"),
            SyncError::ConnectionClosed => write!(f, "connection closed"),
            SyncError::MiddlewareDropped => write!(f, "message dropped by send middleware"),
            SyncError::UnknownCorrelation(id) => write!(f, "unknown reply correlation: {id}"),
            SyncError::HandshakeFailed(reason) => write!(f, "handshake failed: {reason}"),
            SyncError::InvalidPhaseTransition { from, to } => {
                write!(f, "invalid phase transition from {from} to {to}")
            }
            SyncError::Transport(reason) => write!(f, "transport error: {reason}"),
        }
    }
}

impl std::error::Error for SyncError {}
