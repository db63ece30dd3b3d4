//! Application layer for Hangspace
//!
//! Pure state machines and generic runtime for UI and sync orchestration,
//! enabling deterministic simulation testing with the same code that runs in
//! production.
//!
//! # Components
//!
//! - [`App`]: View-model state machine (input, commands, toasts, status line)
//! - [`Bridge`]: Sync bridge (translates App actions to Client events)
//! - [`Driver`]: Trait for platform-specific I/O abstraction
//! - [`Runtime`]: Generic orchestration loop using Driver

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod app;
mod bridge;
mod commands;
mod config;
mod driver;
mod event;
mod input;
mod runtime;
mod state;

pub use action::AppAction;
pub use app::{App, MAX_TOASTS};
pub use bridge::{Bridge, TransportCommand};
pub use commands::{Command, parse as parse_command};
pub use config::{AppConfig, DEFAULT_TOAST_DURATION};
pub use driver::{Driver, Inbound};
pub use event::AppEvent;
pub use input::KeyInput;
pub use runtime::{MAX_INBOUND_PER_CYCLE, Runtime};
pub use state::{
    ChatView, Focus, NotificationItem, NotificationsView, SearchView, ViewUpdate,
};
