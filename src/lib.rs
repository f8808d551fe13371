// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Syncmux: the session multiplexer at the heart of a mixed-reality
//! extension SDK.
//!
//! A [`session::Session`] sits between one app endpoint (upstream,
//! authoritative) and however many engine clients (downstream) share its
//! `session_id`. Each client is brought up to the session's live state by
//! replaying a merged [`cache::SyncCache`], then forwarded real-time
//! traffic under a request/reply [`protocol`] with reply correlation and
//! timeouts.
//!
//! This crate owns no transport of its own — callers implement
//! [`transport::Transport`] against whatever actually carries bytes
//! (WebSocket, in-process channel, anything message-framed) and hand the
//! resulting handles to [`session::Session::new`] and
//! [`session::Session::add_client`].

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod protocol;
pub mod rules;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use error::SyncError;
pub use message::{Message, Payload};
pub use session::Session;
