//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the CLI driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`hangspace_app::Runtime`] orchestration code runs in both production and
//! simulation. The channel and API are served by an in-memory [`SimServer`];
//! time comes from a shared [`SimEnv`].
//!
//! API calls are answered as soon as they are submitted unless a test holds
//! them with [`SimDriver::hold_requests`]. Held calls stay unanswered while
//! the runtime keeps cycling, and are released in any order the test picks.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use hangspace_app::{App, AppEvent, Driver, Inbound, KeyInput, Runtime};
use hangspace_client::{ClientIdentity, RequestId};
use hangspace_core::{DropReason, env::Environment};
use hangspace_proto::{ApiRequest, Frame};

use crate::{
    SimEnv, SimInstant, SimServer,
    invariants::{ClientSnapshot, InvariantRegistry, SystemSnapshot},
    sim_env::lock,
};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Which submitted requests a test wants to answer by hand.
type HoldFilter = Box<dyn Fn(&ApiRequest) -> bool + Send>;

/// Shared state for event injection.
///
/// This allows injection from outside async contexts.
struct SharedState {
    pending_events: VecDeque<AppEvent<SimInstant>>,
    /// Injected frames, drop notices and API responses, in arrival order.
    injected: VecDeque<Inbound>,
    hold: Option<HoldFilter>,
    held: Vec<(RequestId, ApiRequest)>,
    server: SimServer,
    channel_open: bool,
    open_failures: VecDeque<String>,
    reauth_failures: VecDeque<String>,
    open_attempts: Vec<u32>,
    renders: usize,
}

/// Simulation driver for deterministic testing.
///
/// Implements [`Driver`] trait so the same [`hangspace_app::Runtime`]
/// orchestration code runs in both production and simulation tests.
pub struct SimDriver {
    env: SimEnv,
    state: Arc<Mutex<SharedState>>,
    invariants: Option<InvariantRegistry>,
}

impl SimDriver {
    /// Create a driver whose server serves `identity`.
    pub fn new(env: SimEnv, identity: ClientIdentity) -> Self {
        let state = SharedState {
            pending_events: VecDeque::new(),
            injected: VecDeque::new(),
            hold: None,
            held: Vec::new(),
            server: SimServer::new(identity),
            channel_open: false,
            open_failures: VecDeque::new(),
            reauth_failures: VecDeque::new(),
            open_attempts: Vec::new(),
            renders: 0,
        };
        Self { env, state: Arc::new(Mutex::new(state)), invariants: None }
    }

    /// Enable invariant checking.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Inject an `AppEvent` for processing.
    pub fn inject_event(&self, event: AppEvent<SimInstant>) {
        lock(&self.state).pending_events.push_back(event);
    }

    /// Inject a key press.
    pub fn inject_key(&self, key: KeyInput) {
        self.inject_event(AppEvent::Key(key));
    }

    /// Type `line` into the focused input and press Enter.
    pub fn type_line(&self, line: &str) {
        let mut state = lock(&self.state);
        for c in line.chars() {
            state.pending_events.push_back(AppEvent::Key(KeyInput::Char(c)));
        }
        state.pending_events.push_back(AppEvent::Key(KeyInput::Enter));
    }

    /// Inject a frame as if the server sent it.
    pub fn inject_frame(&self, frame: Frame) {
        lock(&self.state).injected.push_back(Inbound::Frame(frame));
    }

    /// Drop the channel with `reason`.
    pub fn drop_channel(&self, reason: DropReason) {
        let mut state = lock(&self.state);
        state.channel_open = false;
        state.injected.push_back(Inbound::Dropped(reason));
    }

    /// Make the next channel open attempt fail.
    pub fn fail_next_open(&self, reason: &str) {
        lock(&self.state).open_failures.push_back(reason.to_string());
    }

    /// Make the next credential refresh fail.
    pub fn fail_next_reauth(&self, reason: &str) {
        lock(&self.state).reauth_failures.push_back(reason.to_string());
    }

    /// Hold every later request matching `filter` instead of answering it.
    pub fn hold_requests(&self, filter: impl Fn(&ApiRequest) -> bool + Send + 'static) {
        lock(&self.state).hold = Some(Box::new(filter));
    }

    /// Answer later requests immediately again. Already held ones stay held.
    pub fn stop_holding(&self) {
        lock(&self.state).hold = None;
    }

    /// Requests waiting to be released, oldest first.
    pub fn held_requests(&self) -> Vec<ApiRequest> {
        lock(&self.state).held.iter().map(|(_, request)| request.clone()).collect()
    }

    /// Let the server answer the held request at `index` now.
    ///
    /// The response is queued behind anything already injected. Returns
    /// `false` if there is no such request.
    pub fn release(&self, index: usize) -> bool {
        let mut state = lock(&self.state);
        if index >= state.held.len() {
            return false;
        }
        let (id, request) = state.held.remove(index);
        let result = state.server.handle_request(&request);
        state.injected.push_back(Inbound::Response { id, result });
        true
    }

    /// Release every held request, oldest first.
    pub fn release_all(&self) {
        while self.release(0) {}
    }

    /// Work with the simulated server.
    pub fn with_server<R>(&self, f: impl FnOnce(&mut SimServer) -> R) -> R {
        f(&mut lock(&self.state).server)
    }

    /// Whether the channel is up.
    pub fn is_channel_open(&self) -> bool {
        lock(&self.state).channel_open
    }

    /// Attempt numbers of every channel open, in order.
    pub fn open_attempts(&self) -> Vec<u32> {
        lock(&self.state).open_attempts.clone()
    }

    /// Number of renders so far.
    pub fn renders(&self) -> usize {
        lock(&self.state).renders
    }

    /// Check if there are pending events to process.
    pub fn has_pending(&self) -> bool {
        let state = lock(&self.state);
        !state.pending_events.is_empty() || !state.injected.is_empty()
    }

    /// Nothing left to deliver: no queued input, no injected items and, while
    /// the channel is up, nothing in the server's outbox. Held requests do
    /// not count.
    pub fn is_idle(&self) -> bool {
        let state = lock(&self.state);
        let outbox_empty = !state.channel_open || !state.server.has_outbox();
        state.pending_events.is_empty() && state.injected.is_empty() && outbox_empty
    }

    /// Check invariants against the runtime's state.
    pub fn check_invariants(&self, runtime: &Runtime<SimDriver, SimEnv>, context: &str) {
        if let Some(registry) = &self.invariants {
            registry.assert_all(&snapshot(runtime), context);
        }
    }
}

/// Capture client and view state of a simulated runtime.
pub fn snapshot(runtime: &Runtime<SimDriver, SimEnv>) -> SystemSnapshot {
    let client = ClientSnapshot::from_client(runtime.bridge().client()).with_view(runtime.app());
    SystemSnapshot::single(client)
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll_event(&mut self) -> Result<Option<AppEvent<SimInstant>>, Self::Error> {
        Ok(lock(&self.state).pending_events.pop_front())
    }

    async fn open_channel(&mut self, attempt: u32) -> Result<(), String> {
        let mut state = lock(&self.state);
        state.open_attempts.push(attempt);
        if let Some(reason) = state.open_failures.pop_front() {
            return Err(reason);
        }
        state.channel_open = true;
        Ok(())
    }

    fn close_channel(&mut self) {
        lock(&self.state).channel_open = false;
    }

    async fn reauthenticate(&mut self) -> Result<(), String> {
        match lock(&self.state).reauth_failures.pop_front() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        let mut state = lock(&self.state);
        if !state.channel_open {
            return Err(SimDriverError("channel closed".to_string()));
        }
        state.server.handle_frame(frame);
        Ok(())
    }

    async fn recv_frame(&mut self) -> Option<Inbound> {
        let mut state = lock(&self.state);
        if let Some(inbound) = state.injected.pop_front() {
            return Some(inbound);
        }
        if !state.channel_open {
            return None;
        }
        state.server.pop_outbox().map(Inbound::Frame)
    }

    fn submit(&mut self, id: RequestId, request: ApiRequest) {
        let mut state = lock(&self.state);
        if state.hold.as_ref().is_some_and(|hold| hold(&request)) {
            tracing::debug!(%id, path = %request.path(), "holding request");
            state.held.push((id, request));
            return;
        }
        let result = state.server.handle_request(&request);
        state.injected.push_back(Inbound::Response { id, result });
    }

    fn now(&self) -> SimInstant {
        self.env.now()
    }

    fn render(&mut self, _app: &App<SimInstant>) -> Result<(), Self::Error> {
        lock(&self.state).renders += 1;
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.state).channel_open = false;
    }
}
