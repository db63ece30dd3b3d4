//! Client-to-Application translation layer.
//!
//! The [`Bridge`] wraps the low-level [`hangspace_client::Client`] and adapts
//! it to the high-level application lifecycle.
//!
//! # Responsibilities
//!
//! - Converts high-level [`crate::AppAction`] into client events.
//! - Accumulates outgoing [`hangspace_proto::Frame`]s, API requests and
//!   transport commands to be executed by the driver in the next I/O cycle.
//! - Turns the client's coarse render hints into formatted view snapshots
//!   ([`crate::ViewUpdate`]) so the App never touches client state.
//! - Manages time ticks generically to support both real-time execution and
//!   deterministic simulation.

use chrono::FixedOffset;
use hangspace_client::{
    Client, ClientAction, ClientConfig, ClientError, ClientEvent, ClientIdentity, RequestId,
    Toast, ViewChange,
};
use hangspace_core::{
    DeliveryState, DropReason, LocalId, RequestError, env::Environment, format::format_timestamp,
};
use hangspace_proto::{ApiRequest, ChatId, Frame, MessageId};
use serde_json::Value;

use crate::{
    AppAction, AppEvent, ChatView, NotificationItem, NotificationsView, SearchView, ViewUpdate,
};

/// Transport lifecycle work requested by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Open the event channel. `attempt` is 0 for the first try.
    Open {
        /// Reconnect attempt number.
        attempt: u32,
    },
    /// Close the event channel.
    Close,
    /// Refresh credentials before reconnecting.
    Reauthenticate,
}

/// Bridge between App and Client logic.
///
/// Generic over Environment to support both production and simulation.
/// The Instant type is determined by the Environment's associated type.
pub struct Bridge<E: Environment> {
    client: Client<E>,
    offset: FixedOffset,
    /// Chat currently shown by the App, if any.
    shown_chat: Option<ChatId>,
    outgoing: Vec<Frame>,
    requests: Vec<(RequestId, ApiRequest)>,
    commands: Vec<TransportCommand>,
}

impl<E: Environment> Bridge<E> {
    /// Create a new Bridge. Timestamps are rendered at `offset`.
    pub fn new(
        env: E,
        identity: ClientIdentity,
        config: ClientConfig,
        offset: FixedOffset,
    ) -> Self {
        Self {
            client: Client::new(env, identity, config),
            offset,
            shown_chat: None,
            outgoing: Vec::new(),
            requests: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Underlying client.
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    /// Process an App action and return resulting App events.
    pub fn process_app_action(&mut self, action: AppAction) -> Vec<AppEvent<E::Instant>> {
        let event = match action {
            AppAction::Connect => ClientEvent::Connect,
            AppAction::RetryConnection => ClientEvent::RetryConnection,
            AppAction::OpenChat { chat_id } => ClientEvent::OpenChat { chat_id },
            AppAction::CloseChat => ClientEvent::CloseChat,
            AppAction::SendMessage { content } => ClientEvent::SendMessage { content },
            AppAction::Keystroke => ClientEvent::Keystroke,
            AppAction::RetryFailed => match self.newest_failed() {
                Some(local_id) => ClientEvent::RetryMessage { local_id },
                None => return vec![AppEvent::Toast(Toast::info("Nothing to retry"))],
            },
            AppAction::EditLast { content } => match self.newest_own() {
                Some(message_id) => ClientEvent::EditMessage { message_id, content },
                None => return vec![AppEvent::Toast(Toast::info("Nothing to edit"))],
            },
            AppAction::DeleteLast => match self.newest_own() {
                Some(message_id) => ClientEvent::DeleteMessage { message_id },
                None => return vec![AppEvent::Toast(Toast::info("Nothing to delete"))],
            },
            AppAction::MarkRead { notification_id, sender_id } => {
                ClientEvent::MarkRead { notification_id, sender_id }
            },
            AppAction::MarkAllRead => ClientEvent::MarkAllRead,
            AppAction::MarkSenderRead { sender_id } => ClientEvent::MarkSenderRead { sender_id },
            AppAction::RefreshNotifications => ClientEvent::RefreshNotifications,
            AppAction::SearchInput { text } => ClientEvent::SearchInput { text },
            AppAction::SearchSubmit => ClientEvent::SearchSubmit,
            AppAction::LoadFriends => ClientEvent::LoadFriends,
            AppAction::SendFriendRequest { user_id } => ClientEvent::SendFriendRequest { user_id },
            AppAction::RespondFriendRequest { request_id, action } => {
                ClientEvent::RespondFriendRequest { request_id, action }
            },
            AppAction::RemoveFriend { friend_id } => ClientEvent::RemoveFriend { friend_id },
            AppAction::CreateChat { participants, is_group } => {
                ClientEvent::CreateChat { participants, is_group }
            },
            AppAction::Render | AppAction::Quit => return Vec::new(),
        };

        self.handle_client_event(event)
    }

    /// Feed any client event and translate the outcome.
    pub fn handle_client_event(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Vec<AppEvent<E::Instant>> {
        let result = self.client.handle(event);
        self.handle_client_result(result)
    }

    /// Handle a frame from the server.
    pub fn handle_frame(&mut self, frame: Frame) -> Vec<AppEvent<E::Instant>> {
        self.handle_client_event(ClientEvent::FrameReceived(frame))
    }

    /// Handle the channel going away.
    pub fn handle_dropped(&mut self, reason: DropReason) -> Vec<AppEvent<E::Instant>> {
        self.handle_client_event(ClientEvent::ChannelDropped(reason))
    }

    /// Handle the outcome of an API request.
    pub fn handle_response(
        &mut self,
        id: RequestId,
        result: Result<Value, RequestError>,
    ) -> Vec<AppEvent<E::Instant>> {
        self.handle_client_event(ClientEvent::ApiResponse { id, result })
    }

    /// Process a time tick.
    pub fn handle_tick(&mut self, now: E::Instant) -> Vec<AppEvent<E::Instant>> {
        self.handle_client_event(ClientEvent::Tick { now })
    }

    /// Take pending outgoing frames.
    pub fn take_outgoing(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.outgoing)
    }

    /// Take pending API requests.
    pub fn take_requests(&mut self) -> Vec<(RequestId, ApiRequest)> {
        std::mem::take(&mut self.requests)
    }

    /// Take pending transport commands.
    pub fn take_commands(&mut self) -> Vec<TransportCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Whether the driver has work queued.
    pub fn has_pending_io(&self) -> bool {
        !self.outgoing.is_empty() || !self.requests.is_empty() || !self.commands.is_empty()
    }

    fn newest_failed(&self) -> Option<LocalId> {
        self.client
            .active_stream()?
            .entries()
            .iter()
            .rev()
            .filter(|entry| entry.own && matches!(entry.state, DeliveryState::Failed { .. }))
            .find_map(|entry| entry.local_id.clone())
    }

    fn newest_own(&self) -> Option<MessageId> {
        self.client.active_stream()?.newest_own_stored().cloned()
    }

    fn handle_client_result(
        &mut self,
        result: Result<Vec<ClientAction>, ClientError>,
    ) -> Vec<AppEvent<E::Instant>> {
        match result {
            Ok(actions) => self.process_client_actions(actions),
            Err(e) if e.is_validation() => {
                tracing::debug!(error = %e, "input rejected");
                Vec::new()
            },
            Err(e) => vec![AppEvent::Error { message: e.to_string() }],
        }
    }

    fn process_client_actions(&mut self, actions: Vec<ClientAction>) -> Vec<AppEvent<E::Instant>> {
        let mut events = Vec::new();
        let mut changes: Vec<ViewChange> = Vec::new();

        for action in actions {
            match action {
                ClientAction::OpenChannel { attempt } => {
                    self.commands.push(TransportCommand::Open { attempt });
                },
                ClientAction::CloseChannel => self.commands.push(TransportCommand::Close),
                ClientAction::Reauthenticate => {
                    self.commands.push(TransportCommand::Reauthenticate);
                },
                ClientAction::Send(frame) => self.outgoing.push(frame),
                ClientAction::Request { id, request } => self.requests.push((id, request)),
                ClientAction::Render(change) => {
                    if !changes.contains(&change) {
                        changes.push(change);
                    }
                },
                ClientAction::Toast(toast) => events.push(AppEvent::Toast(toast)),
                ClientAction::ChatCreated { chat_id } => {
                    events.push(AppEvent::Toast(Toast::success(format!("Opened chat {chat_id}"))));
                },
            }
        }

        let mut updates = self.snapshot(&changes);
        updates.extend(events);
        updates
    }

    /// Build view snapshots for the changed parts, each at most once.
    fn snapshot(&mut self, changes: &[ViewChange]) -> Vec<AppEvent<E::Instant>> {
        let mut updates = Vec::new();
        let mut friends_done = false;
        let mut chat_done = false;

        for change in changes {
            match change {
                ViewChange::Connection => updates.push(ViewUpdate::Connection {
                    state: self.client.state(),
                    status: self.client.status_text(),
                }),
                ViewChange::Presence(_) | ViewChange::Friends => {
                    if !friends_done {
                        friends_done = true;
                        updates.push(ViewUpdate::Friends(self.client.friends()));
                    }
                },
                ViewChange::Notifications => {
                    updates.push(ViewUpdate::Notifications(self.notifications_view()));
                },
                ViewChange::Messages(chat_id) | ViewChange::Typing(chat_id) => {
                    let active = self.client.active_chat();
                    let concerns_view =
                        active == Some(chat_id) || self.shown_chat.as_ref() == Some(chat_id);
                    if concerns_view && !chat_done {
                        chat_done = true;
                        let view = self.chat_view();
                        self.shown_chat = view.as_ref().map(|chat| chat.chat_id.clone());
                        updates.push(ViewUpdate::Chat(view));
                    }
                },
                ViewChange::Search => updates.push(ViewUpdate::Search(self.search_view())),
            }
        }

        updates.into_iter().map(AppEvent::View).collect()
    }

    fn chat_view(&self) -> Option<ChatView> {
        let chat_id = self.client.active_chat()?.clone();
        Some(ChatView {
            chat_id,
            entries: self.client.render_active(self.offset),
            typing: self.client.typing_indicator(),
        })
    }

    fn notifications_view(&self) -> NotificationsView {
        let now = self.client.wall_clock();
        let items = self
            .client
            .notifications()
            .bundles()
            .into_iter()
            .map(|bundle| NotificationItem {
                sender_id: bundle.sender_id.clone(),
                summary: bundle.summary(),
                time: format_timestamp(bundle.latest_at, now, self.offset),
                notification_id: bundle.notification_id.clone(),
            })
            .collect();

        NotificationsView { unread: self.client.unread_count(), items }
    }

    fn search_view(&self) -> SearchView {
        let search = self.client.search();
        SearchView {
            query: search.query().to_string(),
            status: search.status().clone(),
            results: search.results().to_vec(),
        }
    }
}
