//! Event channel state machine.
//!
//! Owns the lifecycle of the single persistent bidirectional channel: connect,
//! bounded reconnect with exponential backoff, re-authentication after a
//! server-initiated disconnect, acknowledgement tracking, and per-kind
//! subscriptions. Uses the action pattern: methods take time as input and
//! return actions for the driver to execute.
//!
//! # State Machine
//!
//! ```text
//!                 connect                 opened
//! ┌──────────────┐──────>┌────────────┐─────────>┌───────────┐
//! │ Disconnected │       │ Connecting │          │ Connected │
//! └──────────────┘<──┐   └────────────┘          └───────────┘
//!        ^           │          │ open failed          │ dropped
//!        │ disconnect│          v                      v
//!        │           │   ┌──────────────┐  backoff ┌──────────────┐
//!        └───────────┴───│    Failed    │<─────────│ Reconnecting │
//!                 retry  └──────────────┘ attempts └──────────────┘
//!                                         exhausted
//! ```
//!
//! # Invariants
//!
//! - Reconnect attempts never exceed `max_reconnect_attempts`
//! - Backoff never exceeds `max_backoff`
//! - Every acked send is resolved exactly once (reply, timeout, or teardown)
//! - Inbound events are delivered in arrival order

use std::{
    collections::{BTreeMap, HashSet},
    time::Duration,
};

use hangspace_proto::{AckId, AckPayload, EventKind, Frame, InboundEvent, OutboundEvent};

use crate::{env::MonotonicInstant, error::ChannelError, timer::Timer};

/// Reconnect attempts before giving up and surfacing a failed status.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Delay before the first reconnect attempt. Doubles per attempt.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound on the reconnect delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Time to wait for an acknowledgement before failing the send.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Not connected and not trying to be
    Disconnected,
    /// First connection attempt in flight
    Connecting,
    /// Channel established
    Connected,
    /// Connection lost, retrying with backoff
    Reconnecting,
    /// Reconnect attempts exhausted or credentials rejected
    Failed,
}

impl ChannelState {
    /// Human-readable status for the status line.
    pub fn status_text(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting...",
            Self::Failed => "Connection failed",
        }
    }

    /// Whether frames can be sent.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// Why an established or pending connection went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Network failure. Reconnect directly.
    Network(String),
    /// Server closed the channel on purpose. Re-authenticate first.
    ServerInitiated,
}

/// Actions returned by the channel state machine.
///
/// The driver executes these in order:
/// - `Open`: open the underlying socket, then report `handle_opened` or
///   `handle_open_failed`
/// - `Close`: close the socket
/// - `Reauthenticate`: refresh credentials, then report `handle_reauthenticated`
/// - `Deliver`: hand the event to its subscriber
/// - `AckResolved`: the acked send completed (or will never complete)
/// - `StateChanged`: update the visible connection status
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelAction {
    /// Open the transport
    Open {
        /// 0 for the initial attempt, then 1..=max for reconnects
        attempt: u32,
    },

    /// Close the transport
    Close,

    /// Refresh credentials before reconnecting
    Reauthenticate,

    /// Deliver an inbound event to its subscriber
    Deliver(InboundEvent),

    /// An acked send finished
    AckResolved {
        /// Correlation id returned by [`Channel::send`]
        ack: AckId,
        /// Server acknowledgement, or why none will arrive
        result: Result<AckPayload, ChannelError>,
    },

    /// Connection status changed
    StateChanged(ChannelState),
}

/// Channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Reconnect attempts before entering [`ChannelState::Failed`]
    pub max_reconnect_attempts: u32,
    /// First reconnect delay
    pub initial_backoff: Duration,
    /// Cap on the reconnect delay
    pub max_backoff: Duration,
    /// Acknowledgement timeout for acked sends
    pub ack_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

impl ChannelConfig {
    /// Delay before reconnect attempt `attempt` (1-based).
    ///
    /// `initial * 2^(attempt-1)`, capped at `max_backoff`. No jitter.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent).min(self.max_backoff)
    }
}

/// Event channel state machine
///
/// Pure state machine: no I/O, no Environment storage. Time is passed as
/// parameters to methods that need it. Generic over `Instant` to support both
/// real time and virtual time for deterministic testing.
#[derive(Debug, Clone)]
pub struct Channel<I> {
    state: ChannelState,
    config: ChannelConfig,
    /// Reconnect attempt in progress. 0 while connected or on first connect.
    attempt: u32,
    backoff: Timer<I>,
    awaiting_reauth: bool,
    next_ack: u64,
    /// Acked sends awaiting a reply, with the instant they were sent.
    pending_acks: BTreeMap<AckId, I>,
    subscriptions: HashSet<EventKind>,
}

impl<I: MonotonicInstant> Channel<I> {
    /// Create a channel in [`ChannelState::Disconnected`] with no
    /// subscriptions.
    pub fn new(config: ChannelConfig) -> Self {
        let backoff = Timer::new(config.initial_backoff);
        Self {
            state: ChannelState::Disconnected,
            config,
            attempt: 0,
            backoff,
            awaiting_reauth: false,
            next_ack: 1,
            pending_acks: BTreeMap::new(),
            subscriptions: HashSet::new(),
        }
    }

    /// Current channel state
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Reconnect attempt in progress, 0 if none.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Number of acked sends awaiting a reply.
    #[must_use]
    pub fn pending_ack_count(&self) -> usize {
        self.pending_acks.len()
    }

    /// Status line text, including reconnect progress.
    pub fn status_text(&self) -> String {
        match self.state {
            ChannelState::Reconnecting if self.attempt > 0 => format!(
                "Reconnecting ({}/{})...",
                self.attempt, self.config.max_reconnect_attempts
            ),
            ChannelState::Failed => "Connection failed - press retry".to_string(),
            state => state.status_text().to_string(),
        }
    }

    /// Register interest in an inbound event kind.
    ///
    /// Events of kinds nobody subscribed to are dropped on arrival.
    pub fn subscribe(&mut self, kind: EventKind) {
        self.subscriptions.insert(kind);
    }

    /// Subscribe to several kinds at once.
    pub fn subscribe_all(&mut self, kinds: impl IntoIterator<Item = EventKind>) {
        self.subscriptions.extend(kinds);
    }

    /// Withdraw interest in an inbound event kind.
    pub fn unsubscribe(&mut self, kind: EventKind) {
        self.subscriptions.remove(&kind);
    }

    /// Whether events of `kind` are delivered.
    #[must_use]
    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        self.subscriptions.contains(&kind)
    }

    /// Start connecting.
    ///
    /// # Errors
    ///
    /// - `ChannelError::InvalidState` unless Disconnected or Failed
    pub fn connect(&mut self) -> Result<Vec<ChannelAction>, ChannelError> {
        if !matches!(self.state, ChannelState::Disconnected | ChannelState::Failed) {
            return Err(ChannelError::InvalidState {
                state: self.state,
                operation: "connect".to_string(),
            });
        }

        self.attempt = 0;
        self.awaiting_reauth = false;
        self.backoff.cancel();
        self.state = ChannelState::Connecting;

        Ok(vec![ChannelAction::StateChanged(self.state), ChannelAction::Open { attempt: 0 }])
    }

    /// User-requested retry after reconnect attempts were exhausted.
    ///
    /// # Errors
    ///
    /// - `ChannelError::InvalidState` unless Failed
    pub fn retry(&mut self) -> Result<Vec<ChannelAction>, ChannelError> {
        if self.state != ChannelState::Failed {
            return Err(ChannelError::InvalidState {
                state: self.state,
                operation: "retry".to_string(),
            });
        }
        self.connect()
    }

    /// Transport reports the socket is open.
    ///
    /// Resets the attempt counter.
    ///
    /// # Errors
    ///
    /// - `ChannelError::InvalidState` unless Connecting or Reconnecting
    pub fn handle_opened(&mut self) -> Result<Vec<ChannelAction>, ChannelError> {
        if !matches!(self.state, ChannelState::Connecting | ChannelState::Reconnecting) {
            return Err(ChannelError::InvalidState {
                state: self.state,
                operation: "handle_opened".to_string(),
            });
        }

        tracing::debug!(attempt = self.attempt, "channel connected");
        self.state = ChannelState::Connected;
        self.attempt = 0;
        self.backoff.cancel();

        Ok(vec![ChannelAction::StateChanged(self.state)])
    }

    /// Transport reports the open attempt failed.
    ///
    /// Schedules the next reconnect, or enters Failed when attempts are
    /// exhausted. Ignored after an explicit disconnect.
    pub fn handle_open_failed(&mut self, reason: &str, now: I) -> Vec<ChannelAction> {
        match self.state {
            ChannelState::Connecting | ChannelState::Reconnecting => {
                tracing::warn!(attempt = self.attempt, reason, "channel open failed");
                self.schedule_reconnect(now)
            },
            state => {
                tracing::debug!(?state, reason, "ignoring open failure");
                Vec::new()
            },
        }
    }

    /// Transport reports the connection went away.
    ///
    /// Pending acknowledgements fail with `ConnectionFailed`. A network drop
    /// schedules a reconnect; a server-initiated drop asks the driver to
    /// re-authenticate first.
    pub fn handle_dropped(&mut self, reason: DropReason, now: I) -> Vec<ChannelAction> {
        if matches!(self.state, ChannelState::Disconnected | ChannelState::Failed) {
            tracing::debug!(state = ?self.state, ?reason, "ignoring drop");
            return Vec::new();
        }

        let mut actions = self.fail_pending_acks(&ChannelError::ConnectionFailed(
            "connection lost before acknowledgement".to_string(),
        ));

        match reason {
            DropReason::Network(detail) => {
                tracing::warn!(detail, "channel dropped");
                actions.extend(self.schedule_reconnect(now));
            },
            DropReason::ServerInitiated => {
                tracing::info!("server closed channel, re-authenticating");
                self.awaiting_reauth = true;
                self.backoff.cancel();
                self.state = ChannelState::Reconnecting;
                actions.push(ChannelAction::StateChanged(self.state));
                actions.push(ChannelAction::Reauthenticate);
            },
        }

        actions
    }

    /// Driver reports the outcome of re-authentication.
    ///
    /// # Errors
    ///
    /// - `ChannelError::InvalidState` if no re-authentication was requested
    pub fn handle_reauthenticated(
        &mut self,
        outcome: Result<(), String>,
        now: I,
    ) -> Result<Vec<ChannelAction>, ChannelError> {
        if !self.awaiting_reauth {
            return Err(ChannelError::InvalidState {
                state: self.state,
                operation: "handle_reauthenticated".to_string(),
            });
        }
        self.awaiting_reauth = false;

        match outcome {
            Ok(()) => Ok(self.schedule_reconnect(now)),
            Err(reason) => {
                tracing::error!(reason, "re-authentication rejected");
                self.state = ChannelState::Failed;
                self.attempt = 0;
                Ok(vec![ChannelAction::StateChanged(self.state)])
            },
        }
    }

    /// Tear down the channel at the caller's request.
    ///
    /// Cancels any scheduled reconnect and fails pending acknowledgements with
    /// `NotConnected`.
    pub fn disconnect(&mut self) -> Vec<ChannelAction> {
        if self.state == ChannelState::Disconnected {
            return Vec::new();
        }

        let was_open = self.state == ChannelState::Connected;
        self.state = ChannelState::Disconnected;
        self.attempt = 0;
        self.awaiting_reauth = false;
        self.backoff.cancel();

        let mut actions = Vec::new();
        if was_open {
            actions.push(ChannelAction::Close);
        }
        actions.extend(
            self.fail_pending_acks(&ChannelError::NotConnected { state: self.state }),
        );
        actions.push(ChannelAction::StateChanged(self.state));
        actions
    }

    /// Process periodic maintenance (reconnect backoff and ack timeouts).
    pub fn tick(&mut self, now: I) -> Vec<ChannelAction> {
        let mut actions = Vec::new();

        if self.state == ChannelState::Reconnecting && self.backoff.poll(now) {
            tracing::debug!(attempt = self.attempt, "reconnecting");
            actions.push(ChannelAction::Open { attempt: self.attempt });
        }

        let timeout = self.config.ack_timeout;
        let expired: Vec<(AckId, Duration)> = self
            .pending_acks
            .iter()
            .filter_map(|(&ack, &sent_at)| {
                let elapsed = now - sent_at;
                (elapsed >= timeout).then_some((ack, elapsed))
            })
            .collect();

        for (ack, elapsed) in expired {
            self.pending_acks.remove(&ack);
            tracing::warn!(%ack, ?elapsed, "acknowledgement timed out");
            actions.push(ChannelAction::AckResolved {
                ack,
                result: Err(ChannelError::AckTimeout { elapsed }),
            });
        }

        actions
    }

    /// Encode an outbound event for transmission.
    ///
    /// Events that expect an acknowledgement get a fresh [`AckId`] which is
    /// tracked until the reply arrives or [`ChannelConfig::ack_timeout`]
    /// elapses.
    ///
    /// # Errors
    ///
    /// - `ChannelError::NotConnected` unless Connected
    pub fn send(
        &mut self,
        event: &OutboundEvent,
        now: I,
    ) -> Result<(Frame, Option<AckId>), ChannelError> {
        if !self.state.is_connected() {
            return Err(ChannelError::NotConnected { state: self.state });
        }

        let frame = event.to_frame();
        if !event.expects_ack() {
            return Ok((frame, None));
        }

        let ack = AckId(self.next_ack);
        self.next_ack += 1;
        self.pending_acks.insert(ack, now);

        Ok((frame.with_ack(ack), Some(ack)))
    }

    /// Process an inbound frame.
    ///
    /// Ack replies resolve their pending send. Other frames are decoded and
    /// delivered when their kind has a subscriber. Frames received while not
    /// connected are dropped.
    ///
    /// # Errors
    ///
    /// - `ChannelError::Protocol` if the frame is not a known event or its
    ///   payload is malformed. The caller logs and continues.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Vec<ChannelAction>, ChannelError> {
        if !self.state.is_connected() {
            tracing::debug!(event = %frame.event, state = ?self.state, "dropping frame");
            return Ok(Vec::new());
        }

        if let Some(ack) = frame.ack_reply_id() {
            if self.pending_acks.remove(&ack).is_none() {
                tracing::debug!(%ack, "late or unknown acknowledgement");
                return Ok(Vec::new());
            }
            let result = AckPayload::from_frame(frame).map_err(ChannelError::from);
            return Ok(vec![ChannelAction::AckResolved { ack, result }]);
        }

        let event = InboundEvent::from_frame(frame)?;
        if !self.is_subscribed(event.kind()) {
            tracing::trace!(event = %frame.event, "no subscriber");
            return Ok(Vec::new());
        }

        Ok(vec![ChannelAction::Deliver(event)])
    }

    fn schedule_reconnect(&mut self, now: I) -> Vec<ChannelAction> {
        self.attempt += 1;

        if self.attempt > self.config.max_reconnect_attempts {
            tracing::error!(
                attempts = self.config.max_reconnect_attempts,
                "reconnect attempts exhausted"
            );
            self.state = ChannelState::Failed;
            self.attempt = 0;
            self.backoff.cancel();
            return vec![ChannelAction::StateChanged(self.state)];
        }

        let delay = self.config.backoff_for(self.attempt);
        tracing::debug!(attempt = self.attempt, ?delay, "scheduling reconnect");
        self.backoff.set_period(delay);
        self.backoff.arm(now);
        self.state = ChannelState::Reconnecting;

        vec![ChannelAction::StateChanged(self.state)]
    }

    fn fail_pending_acks(&mut self, error: &ChannelError) -> Vec<ChannelAction> {
        std::mem::take(&mut self.pending_acks)
            .into_keys()
            .map(|ack| ChannelAction::AckResolved { ack, result: Err(error.clone()) })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use hangspace_proto::{ChatId, UserId, inbound::UserRef};
    use serde_json::json;

    use super::*;

    fn connected() -> Channel<Instant> {
        let mut channel = Channel::new(ChannelConfig::default());
        channel.connect().unwrap();
        channel.handle_opened().unwrap();
        channel.subscribe(EventKind::UserOnline);
        channel
    }

    fn send_message() -> OutboundEvent {
        OutboundEvent::SendMessage {
            chat_id: ChatId::from("c1"),
            message: "hi".to_string(),
            kind: Default::default(),
            client_msg_id: "temp-1-1".to_string(),
        }
    }

    #[test]
    fn connect_then_open() {
        let mut channel = Channel::<Instant>::new(ChannelConfig::default());

        let actions = channel.connect().unwrap();
        assert_eq!(actions, vec![
            ChannelAction::StateChanged(ChannelState::Connecting),
            ChannelAction::Open { attempt: 0 },
        ]);

        channel.handle_opened().unwrap();
        assert_eq!(channel.state(), ChannelState::Connected);
    }

    #[test]
    fn connect_twice_rejected() {
        let mut channel = Channel::<Instant>::new(ChannelConfig::default());
        channel.connect().unwrap();

        let result = channel.connect();
        assert!(matches!(result, Err(ChannelError::InvalidState { .. })));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = ChannelConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(1));
        assert_eq!(config.backoff_for(2), Duration::from_secs(2));
        assert_eq!(config.backoff_for(3), Duration::from_secs(4));
        assert_eq!(config.backoff_for(4), Duration::from_secs(5));
        assert_eq!(config.backoff_for(40), Duration::from_secs(5));
    }

    #[test]
    fn network_drop_reconnects_after_backoff() {
        let t0 = Instant::now();
        let mut channel = connected();

        let actions = channel.handle_dropped(DropReason::Network("reset".into()), t0);
        assert_eq!(actions, vec![ChannelAction::StateChanged(ChannelState::Reconnecting)]);

        assert!(channel.tick(t0 + Duration::from_millis(999)).is_empty());
        let actions = channel.tick(t0 + Duration::from_secs(1));
        assert_eq!(actions, vec![ChannelAction::Open { attempt: 1 }]);

        channel.handle_opened().unwrap();
        assert_eq!(channel.state(), ChannelState::Connected);
        assert_eq!(channel.attempt(), 0);
    }

    #[test]
    fn exhausted_attempts_enter_failed() {
        let t0 = Instant::now();
        let mut channel = connected();
        let mut now = t0;

        channel.handle_dropped(DropReason::Network("reset".into()), now);
        for attempt in 1..=DEFAULT_MAX_RECONNECT_ATTEMPTS {
            now += DEFAULT_MAX_BACKOFF;
            assert_eq!(channel.tick(now), vec![ChannelAction::Open { attempt }]);
            channel.handle_open_failed("refused", now);
        }

        assert_eq!(channel.state(), ChannelState::Failed);
        assert!(channel.tick(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn retry_from_failed() {
        let t0 = Instant::now();
        let mut channel = Channel::new(ChannelConfig {
            max_reconnect_attempts: 0,
            ..ChannelConfig::default()
        });
        channel.connect().unwrap();
        channel.handle_open_failed("refused", t0);
        assert_eq!(channel.state(), ChannelState::Failed);

        let actions = channel.retry().unwrap();
        assert!(actions.contains(&ChannelAction::Open { attempt: 0 }));
    }

    #[test]
    fn server_initiated_drop_reauthenticates_first() {
        let t0 = Instant::now();
        let mut channel = connected();

        let actions = channel.handle_dropped(DropReason::ServerInitiated, t0);
        assert!(actions.contains(&ChannelAction::Reauthenticate));
        assert!(channel.tick(t0 + Duration::from_secs(10)).is_empty());

        channel.handle_reauthenticated(Ok(()), t0).unwrap();
        assert_eq!(channel.tick(t0 + Duration::from_secs(1)), vec![ChannelAction::Open {
            attempt: 1
        }]);
    }

    #[test]
    fn rejected_reauthentication_fails() {
        let t0 = Instant::now();
        let mut channel = connected();
        channel.handle_dropped(DropReason::ServerInitiated, t0);

        channel.handle_reauthenticated(Err("expired".into()), t0).unwrap();
        assert_eq!(channel.state(), ChannelState::Failed);
    }

    #[test]
    fn send_while_down_rejected() {
        let t0 = Instant::now();
        let mut channel = Channel::<Instant>::new(ChannelConfig::default());

        let result = channel.send(&send_message(), t0);
        assert_eq!(
            result,
            Err(ChannelError::NotConnected { state: ChannelState::Disconnected })
        );
    }

    #[test]
    fn ack_reply_resolves_send() {
        let t0 = Instant::now();
        let mut channel = connected();

        let (frame, ack) = channel.send(&send_message(), t0).unwrap();
        let ack = ack.unwrap();
        assert_eq!(frame.ack, Some(ack));

        let reply = Frame::ack_reply(ack, json!({ "message_id": "m1" }));
        let actions = channel.handle_frame(&reply).unwrap();
        assert_eq!(actions, vec![ChannelAction::AckResolved {
            ack,
            result: Ok(AckPayload { error: None, message_id: Some("m1".into()) }),
        }]);
        assert_eq!(channel.pending_ack_count(), 0);
    }

    #[test]
    fn ack_times_out_once() {
        let t0 = Instant::now();
        let mut channel = connected();
        let (_, ack) = channel.send(&send_message(), t0).unwrap();

        let actions = channel.tick(t0 + DEFAULT_ACK_TIMEOUT);
        assert!(matches!(
            actions.as_slice(),
            [ChannelAction::AckResolved { result: Err(ChannelError::AckTimeout { .. }), .. }]
        ));

        let late = Frame::ack_reply(ack.unwrap(), serde_json::Value::Null);
        assert!(channel.handle_frame(&late).unwrap().is_empty());
        assert!(channel.tick(t0 + DEFAULT_ACK_TIMEOUT * 2).is_empty());
    }

    #[test]
    fn drop_fails_pending_acks() {
        let t0 = Instant::now();
        let mut channel = connected();
        channel.send(&send_message(), t0).unwrap();

        let actions = channel.handle_dropped(DropReason::Network("reset".into()), t0);
        assert!(matches!(
            actions.first(),
            Some(ChannelAction::AckResolved { result: Err(ChannelError::ConnectionFailed(_)), .. })
        ));
    }

    #[test]
    fn typing_send_has_no_ack() {
        let t0 = Instant::now();
        let mut channel = connected();

        let typing = OutboundEvent::Typing { chat_id: ChatId::from("c1"), is_typing: true };
        let (frame, ack) = channel.send(&typing, t0).unwrap();
        assert_eq!(ack, None);
        assert_eq!(frame.ack, None);
    }

    #[test]
    fn delivers_only_subscribed_kinds() {
        let _t0 = Instant::now();
        let mut channel = connected();

        let online = InboundEvent::UserOnline(UserRef { user_id: UserId::from("u1") });
        let frame = online.clone().into_frame().unwrap();
        assert_eq!(channel.handle_frame(&frame).unwrap(), vec![ChannelAction::Deliver(online)]);

        let offline = InboundEvent::UserOffline(UserRef { user_id: UserId::from("u1") });
        let frame = offline.into_frame().unwrap();
        assert!(channel.handle_frame(&frame).unwrap().is_empty());
    }

    #[test]
    fn unknown_event_is_protocol_error() {
        let _t0 = Instant::now();
        let mut channel = connected();

        let frame = Frame::new("mystery", json!({}));
        assert!(matches!(channel.handle_frame(&frame), Err(ChannelError::Protocol(_))));
    }

    #[test]
    fn disconnect_cancels_reconnect() {
        let t0 = Instant::now();
        let mut channel = connected();
        channel.handle_dropped(DropReason::Network("reset".into()), t0);

        channel.disconnect();
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert!(channel.tick(t0 + Duration::from_secs(30)).is_empty());
        assert!(channel.handle_open_failed("late", t0).is_empty());
    }
}
