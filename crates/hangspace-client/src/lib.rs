//! Client
//!
//! Action-based client state machine for Hangspace real-time sync. Owns the
//! event channel, presence, notifications, typing, per-chat message streams
//! and user search, and wires them to each other.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and Action-Based patterns as
//! [`hangspace_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`]) for
//! the caller to execute.
//!
//! # Components
//!
//! - [`Client`]: Top-level state machine
//! - [`ClientEvent`]: Events fed into the client
//! - [`ClientAction`]: Actions produced by the client
//! - [`ClientConfig`]: Timing and limits for every component
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::connect`]: Open the WebSocket event channel
//! - [`transport::HttpApi`]: REST client for the API requests

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod config;
mod error;
mod event;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::{Client, FriendView};
pub use config::{ClientConfig, ClientIdentity, DEFAULT_HISTORY_LIMIT};
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent, RequestId, Toast, ToastLevel, ViewChange};
pub use hangspace_core::env::Environment;
