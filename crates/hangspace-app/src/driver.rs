//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::future::Future;

use hangspace_client::RequestId;
use hangspace_core::{DropReason, MonotonicInstant, RequestError};
use hangspace_proto::{ApiRequest, Frame};
use serde_json::Value;

use crate::{App, AppEvent};

/// Something that arrived from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A frame from the event channel.
    Frame(Frame),
    /// The event channel went away.
    Dropped(DropReason),
    /// An API call started with [`Driver::submit`] finished.
    Response {
        /// Request being answered.
        id: RequestId,
        /// Response body, or why there is none.
        result: Result<Value, RequestError>,
    },
}

/// Abstracts I/O operations for the application runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures
/// the same orchestration code runs in production and simulation.
///
/// # Implementations
///
/// - **CLI**: stdin lines for input, WebSocket channel, HTTP API
/// - **Simulation**: scripted input, in-memory server, virtual clock
///
/// # Associated Types
///
/// - [`Error`](Driver::Error): Platform-specific error type
/// - [`Instant`](Driver::Instant): Time representation (real or virtual)
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: MonotonicInstant;

    /// Poll for the next input event.
    ///
    /// Returns available events or `None` if no events are ready.
    fn poll_event(
        &mut self,
    ) -> impl Future<Output = Result<Option<AppEvent<Self::Instant>>, Self::Error>> + Send;

    /// Open the event channel.
    ///
    /// `attempt` is 0 for the first try, then the reconnect attempt number.
    /// Failure is reported as a reason string; the client decides whether to
    /// retry.
    fn open_channel(&mut self, attempt: u32) -> impl Future<Output = Result<(), String>> + Send;

    /// Close the event channel. Idempotent.
    fn close_channel(&mut self);

    /// Refresh credentials after a server-initiated close.
    fn reauthenticate(&mut self) -> impl Future<Output = Result<(), String>> + Send;

    /// Send a frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the send fails.
    fn send_frame(&mut self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receive a frame, a drop notice or a finished API call.
    ///
    /// Returns `None` if nothing is ready.
    fn recv_frame(&mut self) -> impl Future<Output = Option<Inbound>> + Send;

    /// Start a request/response API call without waiting for it.
    ///
    /// The outcome is delivered later by [`recv_frame`](Driver::recv_frame)
    /// as [`Inbound::Response`] carrying `id`. Calls may finish in any order.
    fn submit(&mut self, id: RequestId, request: ApiRequest);

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, app: &App<Self::Instant>) -> Result<(), Self::Error>;

    /// Stop the connection and clean up resources.
    fn stop(&mut self);
}
