//! Client errors.

use hangspace_core::{ChannelError, ValidationError};
use thiserror::Error;

/// Errors returned by [`crate::Client::handle`].
///
/// Inbound protocol problems and API failures are never returned: they are
/// logged or surfaced as toasts so the event loop keeps running. What remains
/// is input the caller should not have sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Channel operation invalid in the current state.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// User input rejected before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ClientError {
    /// Whether the error only reflects rejected user input.
    ///
    /// The UI drops these silently.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
