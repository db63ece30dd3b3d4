//! Application input events.
//!
//! This module defines [`AppEvent`], the set of inputs that drive the
//! [`crate::App`] state machine.
//!
//! Events originate from two distinct sources:
//! - User interactions (keyboard) and system ticks.
//! - View updates and toasts translated from the underlying client.

use std::time::Instant;

use hangspace_client::Toast;

use crate::{KeyInput, ViewUpdate};

/// Events processed by the App state machine.
#[derive(Debug, Clone)]
pub enum AppEvent<I = Instant> {
    /// Keyboard input.
    Key(KeyInput),

    /// Periodic tick. Drives toast expiry.
    Tick {
        /// Current time.
        now: I,
    },

    /// Part of the view model changed.
    View(ViewUpdate),

    /// Transient notice from the client.
    Toast(Toast),

    /// Error occurred.
    Error {
        /// Error description.
        message: String,
    },
}
