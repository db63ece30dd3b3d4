//! Client state machine.
//!
//! The `Client` is the application-root object: it owns one instance of every
//! synchronization component, routes inbound events to them, and turns user
//! intents into channel frames and API requests.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use hangspace_core::{
    Channel, ChannelAction, ChannelError, ChannelState, Environment, LocalId, MessageStream,
    NotificationAggregator, PresenceTracker, Push, PushSender, RenderedEntry, RequestError, Roster,
    SearchRequest, SearchSession, TypingCoordinator, TypingEmit, ValidationError,
};
use hangspace_proto::{
    AckId, AckPayload, ApiRequest, ChatId, EventKind, FriendResponse, InboundEvent, MessageId,
    MessageKind, NotificationId, NotificationKind, OutboundEvent, Presence, UserId, UserRecord,
    api::{
        ActionResponse, ChatMessagesResponse, CreateChatResponse, FriendsResponse,
        SearchUsersResponse, UnreadCountResponse,
    },
    inbound::NotificationsData,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    config::{ClientConfig, ClientIdentity},
    error::ClientError,
    event::{ClientAction, ClientEvent, RequestId, Toast, ViewChange},
};

/// What an in-flight API request was for.
#[derive(Debug, Clone)]
enum PendingRequest {
    Notifications,
    UnreadCount,
    MarkRead,
    MarkAllRead,
    Search { token: u64 },
    Friends,
    SendFriendRequest,
    RespondFriendRequest { action: FriendResponse },
    RemoveFriend { friend_id: UserId },
    CreateChat,
    History { chat_id: ChatId },
    EditMessage { chat_id: ChatId, message_id: MessageId, content: String },
    DeleteMessage { chat_id: ChatId, message_id: MessageId },
}

/// An acked send awaiting its acknowledgement.
#[derive(Debug, Clone)]
struct PendingSend {
    chat_id: ChatId,
    local_id: LocalId,
}

/// Friend list row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendView {
    /// Friend id
    pub id: UserId,
    /// Handle
    pub username: String,
    /// Display name
    pub display_name: String,
    /// Current presence
    pub presence: Presence,
}

/// Real-time sync client.
///
/// Pure state machine: every call returns the actions the caller must perform.
/// All component state is owned here and only mutated through [`handle`].
///
/// [`handle`]: Client::handle
pub struct Client<E: Environment> {
    env: E,
    identity: ClientIdentity,
    config: ClientConfig,
    /// Random per-session nonce embedded in local message ids.
    session: u64,
    next_local: u64,
    next_request: u64,
    channel: Channel<E::Instant>,
    presence: PresenceTracker,
    roster: Roster,
    notifications: NotificationAggregator<E::Instant>,
    typing: TypingCoordinator<E::Instant>,
    search: SearchSession<E::Instant>,
    streams: HashMap<ChatId, MessageStream>,
    active_chat: Option<ChatId>,
    pending_sends: HashMap<AckId, PendingSend>,
    requests: HashMap<RequestId, PendingRequest>,
}

impl<E: Environment> Client<E> {
    /// Create a disconnected client.
    pub fn new(env: E, identity: ClientIdentity, config: ClientConfig) -> Self {
        let session = env.random_u64();

        let mut channel = Channel::new(config.channel.clone());
        channel.subscribe_all(EventKind::ALL);

        let mut roster = Roster::new();
        roster.remember(&identity.user_id, &identity.username);

        Self {
            notifications: NotificationAggregator::new(config.notifications.clone()),
            typing: TypingCoordinator::new(config.typing.clone()),
            search: SearchSession::new(config.search.clone()),
            env,
            identity,
            config,
            session,
            next_local: 1,
            next_request: 1,
            channel,
            presence: PresenceTracker::new(),
            roster,
            streams: HashMap::new(),
            active_chat: None,
            pending_sends: HashMap::new(),
            requests: HashMap::new(),
        }
    }

    /// Who we are logged in as.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Channel state.
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Status line text.
    pub fn status_text(&self) -> String {
        self.channel.status_text()
    }

    /// Current wall-clock time, for formatting.
    pub fn wall_clock(&self) -> DateTime<Utc> {
        self.env.wall_clock()
    }

    /// Presence of a user. Unknown users are offline.
    pub fn presence(&self, user_id: &UserId) -> Presence {
        self.presence.get(user_id)
    }

    /// Known users.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Notification bundles and counter.
    pub fn notifications(&self) -> &NotificationAggregator<E::Instant> {
        &self.notifications
    }

    /// Global unread counter.
    pub fn unread_count(&self) -> u64 {
        self.notifications.unread_count()
    }

    /// Search box state.
    pub fn search(&self) -> &SearchSession<E::Instant> {
        &self.search
    }

    /// Open chat, if any.
    pub fn active_chat(&self) -> Option<&ChatId> {
        self.active_chat.as_ref()
    }

    /// Message stream of a chat opened during this session.
    pub fn stream(&self, chat_id: &ChatId) -> Option<&MessageStream> {
        self.streams.get(chat_id)
    }

    /// Message stream of the open chat.
    pub fn active_stream(&self) -> Option<&MessageStream> {
        self.active_chat.as_ref().and_then(|chat_id| self.streams.get(chat_id))
    }

    /// Open chat rendered at the current wall-clock time.
    pub fn render_active(&self, offset: FixedOffset) -> Vec<RenderedEntry> {
        self.active_stream()
            .map(|stream| stream.render(self.env.wall_clock(), offset))
            .unwrap_or_default()
    }

    /// Typing indicator of the open chat.
    pub fn typing_indicator(&self) -> Option<String> {
        self.active_chat.as_ref().and_then(|chat_id| self.typing.indicator(chat_id))
    }

    /// Friends with their presence, ordered by display name.
    pub fn friends(&self) -> Vec<FriendView> {
        self.roster
            .friends()
            .into_iter()
            .map(|user| FriendView {
                id: user.id.clone(),
                username: user.username.clone(),
                display_name: user.display_name.clone(),
                presence: self.presence.get(&user.id),
            })
            .collect()
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// - `ClientError::Channel` for connect/retry in the wrong state
    /// - `ClientError::Validation` for rejected user input; nothing was sent
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();

        match event {
            ClientEvent::Connect => {
                let actions = self.channel.connect()?;
                Ok(self.apply_channel(actions))
            },
            ClientEvent::Disconnect => {
                self.notifications.stop();
                let actions = self.channel.disconnect();
                Ok(self.apply_channel(actions))
            },
            ClientEvent::RetryConnection => {
                let actions = self.channel.retry()?;
                Ok(self.apply_channel(actions))
            },
            ClientEvent::ChannelOpened => {
                let actions = self.channel.handle_opened()?;
                Ok(self.apply_channel(actions))
            },
            ClientEvent::ChannelOpenFailed { reason } => {
                let actions = self.channel.handle_open_failed(&reason, now);
                Ok(self.apply_channel(actions))
            },
            ClientEvent::ChannelDropped(reason) => {
                let actions = self.channel.handle_dropped(reason, now);
                Ok(self.apply_channel(actions))
            },
            ClientEvent::Reauthenticated(outcome) => {
                let actions = self.channel.handle_reauthenticated(outcome, now)?;
                Ok(self.apply_channel(actions))
            },
            ClientEvent::FrameReceived(frame) => match self.channel.handle_frame(&frame) {
                Ok(actions) => Ok(self.apply_channel(actions)),
                Err(err) => {
                    tracing::warn!(event = %frame.event, %err, "dropping inbound frame");
                    Ok(Vec::new())
                },
            },
            ClientEvent::ApiResponse { id, result } => Ok(self.handle_response(id, result)),
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
            ClientEvent::OpenChat { chat_id } => Ok(self.open_chat(chat_id)),
            ClientEvent::CloseChat => Ok(self.leave_active()),
            ClientEvent::Keystroke => {
                let chat_id = self.active_chat.clone().ok_or(ValidationError::NoActiveChat)?;
                let emits = self.typing.keystroke(&chat_id, now);
                Ok(self.emit_typing(emits))
            },
            ClientEvent::SendMessage { content } => self.send_message(&content),
            ClientEvent::RetryMessage { local_id } => self.retry_message(&local_id),
            ClientEvent::EditMessage { message_id, content } => {
                self.edit_message(message_id, &content)
            },
            ClientEvent::DeleteMessage { message_id } => {
                let chat_id = self.own_message_chat(&message_id)?;
                Ok(vec![self.request(
                    ApiRequest::DeleteMessage { message_id: message_id.clone() },
                    PendingRequest::DeleteMessage { chat_id, message_id },
                )])
            },
            ClientEvent::MarkRead { notification_id, sender_id } => {
                Ok(self.mark_read(notification_id, sender_id))
            },
            ClientEvent::MarkSenderRead { sender_id } => Ok(self.mark_sender_read(sender_id)),
            ClientEvent::MarkAllRead => {
                self.notifications.mark_all_read();
                Ok(vec![
                    ClientAction::Render(ViewChange::Notifications),
                    self.request(ApiRequest::MarkAllRead, PendingRequest::MarkAllRead),
                ])
            },
            ClientEvent::RefreshNotifications => {
                match self.send_best_effort(&OutboundEvent::RequestNotifications) {
                    Some(send) => Ok(vec![send]),
                    None => Ok(vec![self.request_snapshot()]),
                }
            },
            ClientEvent::SearchInput { text } => {
                self.search.input(&text, now);
                if self.search.query().is_empty() {
                    return Ok(vec![ClientAction::Render(ViewChange::Search)]);
                }
                Ok(Vec::new())
            },
            ClientEvent::SearchSubmit => match self.search.submit() {
                Some(request) => Ok(vec![self.search_request(request)]),
                None => Ok(Vec::new()),
            },
            ClientEvent::LoadFriends => {
                Ok(vec![self.request(ApiRequest::Friends, PendingRequest::Friends)])
            },
            ClientEvent::SendFriendRequest { user_id } => Ok(vec![self.request(
                ApiRequest::SendFriendRequest { user_id },
                PendingRequest::SendFriendRequest,
            )]),
            ClientEvent::RespondFriendRequest { request_id, action } => Ok(vec![self.request(
                ApiRequest::RespondFriendRequest { request_id, action },
                PendingRequest::RespondFriendRequest { action },
            )]),
            ClientEvent::RemoveFriend { friend_id } => Ok(vec![self.request(
                ApiRequest::RemoveFriend { friend_id: friend_id.clone() },
                PendingRequest::RemoveFriend { friend_id },
            )]),
            ClientEvent::CreateChat { participants, is_group } => Ok(vec![self.request(
                ApiRequest::CreateChat { participants, is_group },
                PendingRequest::CreateChat,
            )]),
        }
    }

    fn apply_channel(&mut self, actions: Vec<ChannelAction>) -> Vec<ClientAction> {
        let mut out = Vec::new();
        for action in actions {
            match action {
                ChannelAction::Open { attempt } => out.push(ClientAction::OpenChannel { attempt }),
                ChannelAction::Close => out.push(ClientAction::CloseChannel),
                ChannelAction::Reauthenticate => out.push(ClientAction::Reauthenticate),
                ChannelAction::Deliver(event) => out.extend(self.apply_inbound(event)),
                ChannelAction::AckResolved { ack, result } => {
                    out.extend(self.resolve_ack(ack, result));
                },
                ChannelAction::StateChanged(state) => {
                    out.push(ClientAction::Render(ViewChange::Connection));
                    out.extend(self.on_state_changed(state));
                },
            }
        }
        out
    }

    fn on_state_changed(&mut self, state: ChannelState) -> Vec<ClientAction> {
        tracing::info!(status = state.status_text(), "channel state changed");

        match state {
            ChannelState::Connected => {
                self.notifications.start(self.env.now());
                let mut out = vec![self.request_snapshot()];
                if let Some(chat_id) = self.active_chat.clone() {
                    out.extend(self.join(&chat_id));
                    out.extend(self.send_read_receipts(&chat_id));
                }
                out
            },
            ChannelState::Failed => {
                vec![ClientAction::Toast(Toast::error("Connection lost. Retry to reconnect."))]
            },
            ChannelState::Disconnected | ChannelState::Connecting | ChannelState::Reconnecting => {
                Vec::new()
            },
        }
    }

    fn apply_inbound(&mut self, event: InboundEvent) -> Vec<ClientAction> {
        let wall = self.env.wall_clock();

        match event {
            InboundEvent::UserOnline(user) => self.set_presence(&user.user_id, Presence::Online),
            InboundEvent::UserOffline(user) => self.set_presence(&user.user_id, Presence::Offline),
            InboundEvent::InitialStatuses(snapshot) => self
                .presence
                .apply_all(&snapshot.statuses)
                .into_iter()
                .map(|user_id| ClientAction::Render(ViewChange::Presence(user_id)))
                .collect(),
            InboundEvent::FriendRequestReceived(request) => {
                let sender_id = request.from_id.clone().or_else(|| {
                    self.roster.find_by_username(&request.from_username).map(|u| u.id.clone())
                });
                let sender = match &sender_id {
                    Some(id) => self.resolve_sender(Some(id), Some(&request.from_username)),
                    None => PushSender::Anonymous,
                };
                let message = format!("{} sent you a friend request", request.from_username);
                self.notifications.ingest(Push {
                    sender,
                    kind: NotificationKind::FriendRequest,
                    message: message.clone(),
                    chat_id: None,
                    count: None,
                    notification_id: None,
                    at: wall,
                });
                vec![
                    ClientAction::Render(ViewChange::Notifications),
                    ClientAction::Toast(Toast::info(message)),
                    self.request(ApiRequest::Friends, PendingRequest::Friends),
                ]
            },
            InboundEvent::FriendRequestAccepted(accepted) => {
                let sender_id = accepted.user_id.clone().or_else(|| {
                    self.roster.find_by_username(&accepted.username).map(|u| u.id.clone())
                });
                let sender = match &sender_id {
                    Some(id) => self.resolve_sender(Some(id), Some(&accepted.username)),
                    None => PushSender::Anonymous,
                };
                let message = format!("{} accepted your friend request", accepted.username);
                self.notifications.ingest(Push {
                    sender,
                    kind: NotificationKind::FriendRequestAccepted,
                    message: message.clone(),
                    chat_id: None,
                    count: None,
                    notification_id: None,
                    at: wall,
                });
                vec![
                    ClientAction::Render(ViewChange::Notifications),
                    ClientAction::Toast(Toast::success(message)),
                    self.request(ApiRequest::Friends, PendingRequest::Friends),
                ]
            },
            InboundEvent::NewMessage(message) => {
                let chat_id = message.chat_id.clone();
                self.roster.remember(&message.sender_id, &message.sender_username);
                let Some(stream) = self.streams.get_mut(&chat_id) else {
                    tracing::debug!(%chat_id, "message for a chat that is not open");
                    return Vec::new();
                };
                let outcome = stream.ingest_remote(&message, wall);
                tracing::trace!(%chat_id, ?outcome, "message ingested");

                let mut out = vec![ClientAction::Render(ViewChange::Messages(chat_id.clone()))];
                out.extend(self.send_read_receipts(&chat_id));
                let now = self.env.now();
                if message.sender_id != self.identity.user_id
                    && self.typing.remote_update(&chat_id, &message.sender_username, false, now)
                {
                    out.push(ClientAction::Render(ViewChange::Typing(chat_id)));
                }
                out
            },
            InboundEvent::MessageUpdated(update) => {
                let changed = self.streams.get_mut(&update.chat_id).is_some_and(|stream| {
                    stream.apply_edit(&update.message_id, &update.new_content)
                });
                render_if(changed, ViewChange::Messages(update.chat_id))
            },
            InboundEvent::MessageDeleted(deleted) => {
                let changed = self
                    .streams
                    .get_mut(&deleted.chat_id)
                    .is_some_and(|stream| stream.remove(&deleted.message_id));
                render_if(changed, ViewChange::Messages(deleted.chat_id))
            },
            InboundEvent::MessageError(error) => {
                let mut out = vec![ClientAction::Toast(Toast::error(format!(
                    "Message not sent: {}",
                    error.error
                )))];
                if let Some(chat_id) = self.active_chat.clone()
                    && let Some(stream) = self.streams.get_mut(&chat_id)
                    && stream.fail_latest_pending(&error.error).is_some()
                {
                    out.push(ClientAction::Render(ViewChange::Messages(chat_id)));
                }
                out
            },
            InboundEvent::MessageReadReceipt(receipt) => {
                let changed = self
                    .streams
                    .get_mut(&receipt.chat_id)
                    .is_some_and(|stream| stream.mark_read(&receipt.message_id));
                render_if(changed, ViewChange::Messages(receipt.chat_id))
            },
            InboundEvent::NewNotification(notification) => {
                let sender = self.resolve_sender(
                    notification.sender_id.as_ref(),
                    notification.sender_username.as_deref(),
                );
                self.notifications.ingest(Push {
                    sender,
                    kind: notification.kind,
                    message: notification.message,
                    chat_id: notification.chat_id,
                    count: None,
                    notification_id: notification.notification_id,
                    at: wall,
                });
                vec![ClientAction::Render(ViewChange::Notifications)]
            },
            InboundEvent::NotificationUpdated(_) => {
                vec![self.request(ApiRequest::UnreadCount, PendingRequest::UnreadCount)]
            },
            InboundEvent::NotificationBadgeUpdated(badge) => {
                self.notifications.set_unread_count(badge.unread_count);
                vec![ClientAction::Render(ViewChange::Notifications)]
            },
            InboundEvent::NotificationsData(snapshot) => {
                self.reconcile_notifications(&snapshot);
                vec![ClientAction::Render(ViewChange::Notifications)]
            },
            InboundEvent::NotificationsCleared(cleared) => match cleared.sender_id {
                Some(sender_id) => {
                    self.notifications.evict_sender(&sender_id);
                    vec![
                        ClientAction::Render(ViewChange::Notifications),
                        self.request(ApiRequest::UnreadCount, PendingRequest::UnreadCount),
                    ]
                },
                None => vec![self.request_snapshot()],
            },
            InboundEvent::NewMessageNotification(notification) => {
                let sender = self.resolve_sender(
                    Some(&notification.sender_id),
                    notification.sender_username.as_deref(),
                );
                self.notifications.ingest(Push {
                    sender,
                    kind: NotificationKind::NewMessage,
                    message: notification.message.unwrap_or_default(),
                    chat_id: notification.chat_id,
                    count: notification.message_count,
                    notification_id: None,
                    at: wall,
                });
                vec![ClientAction::Render(ViewChange::Notifications)]
            },
            InboundEvent::SenderUnreadCount(count) => match count.sender_id {
                Some(sender_id) => {
                    self.notifications.set_sender_count(&sender_id, count.count);
                    vec![ClientAction::Render(ViewChange::Notifications)]
                },
                None => Vec::new(),
            },
            InboundEvent::UserTyping(typing) => {
                if typing.username == self.identity.username {
                    return Vec::new();
                }
                let Some(chat_id) = self.active_chat.clone() else {
                    return Vec::new();
                };
                let changed = self.typing.remote_update(
                    &chat_id,
                    &typing.username,
                    typing.is_typing,
                    self.env.now(),
                );
                render_if(changed, ViewChange::Typing(chat_id))
            },
            InboundEvent::UserJoined(member) => {
                self.system_line(format!("{} joined the chat", member.username))
            },
            InboundEvent::UserLeft(member) => {
                self.system_line(format!("{} left the chat", member.username))
            },
        }
    }

    fn resolve_ack(
        &mut self,
        ack: AckId,
        result: Result<AckPayload, ChannelError>,
    ) -> Vec<ClientAction> {
        let Some(PendingSend { chat_id, local_id }) = self.pending_sends.remove(&ack) else {
            tracing::debug!(%ack, "acknowledgement for untracked send");
            return Vec::new();
        };
        let Some(stream) = self.streams.get_mut(&chat_id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let changed = match result.map(AckPayload::into_result) {
            Ok(Ok(server_id)) => stream.confirm(&local_id, server_id),
            Ok(Err(reason)) => {
                out.push(ClientAction::Toast(Toast::error(format!("Message not sent: {reason}"))));
                stream.fail(&local_id, &reason)
            },
            Err(err) => {
                tracing::warn!(%local_id, %err, "send not acknowledged");
                stream.fail(&local_id, &err.to_string())
            },
        };
        if changed {
            out.push(ClientAction::Render(ViewChange::Messages(chat_id)));
        }
        out
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let channel_actions = self.channel.tick(now);
        let mut out = self.apply_channel(channel_actions);

        if let Some(emit) = self.typing.poll_local(now) {
            out.extend(self.emit_typing(vec![emit]));
        }
        for chat_id in self.typing.expire_remote(now) {
            out.push(ClientAction::Render(ViewChange::Typing(chat_id)));
        }
        if let Some(request) = self.search.tick(now) {
            out.push(self.search_request(request));
        }
        if self.notifications.tick(now) {
            out.push(self.request_snapshot());
        }

        out
    }

    fn open_chat(&mut self, chat_id: ChatId) -> Vec<ClientAction> {
        if self.active_chat.as_ref() == Some(&chat_id) {
            return Vec::new();
        }

        let mut out = self.leave_active();
        self.streams.entry(chat_id.clone()).or_insert_with(|| {
            MessageStream::new(
                chat_id.clone(),
                self.identity.user_id.clone(),
                self.identity.username.clone(),
            )
        });
        self.active_chat = Some(chat_id.clone());

        out.extend(self.join(&chat_id));
        out.extend(self.send_read_receipts(&chat_id));
        let limit = self.config.history_limit;
        out.push(self.request(
            ApiRequest::ChatMessages { chat_id: chat_id.clone(), limit },
            PendingRequest::History { chat_id: chat_id.clone() },
        ));
        out.push(ClientAction::Render(ViewChange::Messages(chat_id)));
        out
    }

    fn join(&mut self, chat_id: &ChatId) -> Vec<ClientAction> {
        let mut out = Vec::new();
        let chat_id = chat_id.clone();
        out.extend(self.send_best_effort(&OutboundEvent::JoinChat { chat_id: chat_id.clone() }));
        out.extend(self.send_best_effort(&OutboundEvent::RequestInitialStatuses { chat_id }));
        out
    }

    fn leave_active(&mut self) -> Vec<ClientAction> {
        let Some(chat_id) = self.active_chat.take() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        if let Some(emit) = self.typing.reset_local() {
            out.extend(self.emit_typing(vec![emit]));
        }
        self.typing.clear_chat(&chat_id);
        out.extend(self.send_best_effort(&OutboundEvent::LeaveChat { chat_id: chat_id.clone() }));
        out.push(ClientAction::Render(ViewChange::Typing(chat_id)));
        out
    }

    fn send_message(&mut self, content: &str) -> Result<Vec<ClientAction>, ClientError> {
        let chat_id = self.active_chat.clone().ok_or(ValidationError::NoActiveChat)?;
        let local_id = LocalId::new(self.session, self.next_local);
        let at = self.env.wall_clock();

        let stream = self.streams.entry(chat_id.clone()).or_insert_with(|| {
            MessageStream::new(
                chat_id.clone(),
                self.identity.user_id.clone(),
                self.identity.username.clone(),
            )
        });
        let entry = stream.send_local(local_id.clone(), content, MessageKind::Text, at)?;
        let body = entry.content.clone();
        self.next_local += 1;

        let mut out = vec![ClientAction::Render(ViewChange::Messages(chat_id.clone()))];
        out.extend(self.dispatch_send(&chat_id, &local_id, body, MessageKind::Text));
        let emits = self.typing.message_sent(&chat_id);
        out.extend(self.emit_typing(emits));
        Ok(out)
    }

    fn retry_message(&mut self, local_id: &LocalId) -> Result<Vec<ClientAction>, ClientError> {
        let unknown = || ValidationError::UnknownMessage(local_id.to_string());
        let chat_id = self
            .streams
            .iter()
            .find(|(_, stream)| stream.get_local(local_id).is_some())
            .map(|(chat_id, _)| chat_id.clone())
            .ok_or_else(unknown)?;

        let at = self.env.wall_clock();
        let stream = self.streams.get_mut(&chat_id).ok_or_else(unknown)?;
        let (body, kind) = stream.retry(local_id, at)?;

        let mut out = vec![ClientAction::Render(ViewChange::Messages(chat_id.clone()))];
        out.extend(self.dispatch_send(&chat_id, local_id, body, kind));
        Ok(out)
    }

    fn edit_message(
        &mut self,
        message_id: MessageId,
        content: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let chat_id = self.own_message_chat(&message_id)?;

        Ok(vec![self.request(
            ApiRequest::UpdateMessage {
                message_id: message_id.clone(),
                new_content: content.to_string(),
            },
            PendingRequest::EditMessage { chat_id, message_id, content: content.to_string() },
        )])
    }

    /// Chat holding our stored message `message_id`.
    fn own_message_chat(&self, message_id: &MessageId) -> Result<ChatId, ValidationError> {
        self.streams
            .iter()
            .find(|(_, stream)| stream.get(message_id).is_some_and(|entry| entry.own))
            .map(|(chat_id, _)| chat_id.clone())
            .ok_or_else(|| ValidationError::UnknownMessage(message_id.to_string()))
    }

    /// Report messages from others in the open chat as read.
    fn send_read_receipts(&mut self, chat_id: &ChatId) -> Vec<ClientAction> {
        if self.active_chat.as_ref() != Some(chat_id) || !self.channel.state().is_connected() {
            return Vec::new();
        }
        let Some(stream) = self.streams.get_mut(chat_id) else {
            return Vec::new();
        };

        stream
            .take_read_receipts()
            .into_iter()
            .filter_map(|message_id| {
                self.send_best_effort(&OutboundEvent::MessageRead { message_id })
            })
            .collect()
    }

    fn dispatch_send(
        &mut self,
        chat_id: &ChatId,
        local_id: &LocalId,
        message: String,
        kind: MessageKind,
    ) -> Vec<ClientAction> {
        let event = OutboundEvent::SendMessage {
            chat_id: chat_id.clone(),
            message,
            kind,
            client_msg_id: local_id.to_string(),
        };

        match self.channel.send(&event, self.env.now()) {
            Ok((frame, ack)) => {
                if let Some(ack) = ack {
                    self.pending_sends.insert(ack, PendingSend {
                        chat_id: chat_id.clone(),
                        local_id: local_id.clone(),
                    });
                }
                vec![ClientAction::Send(frame)]
            },
            Err(err) => {
                tracing::warn!(%local_id, %err, "message not sent");
                if let Some(stream) = self.streams.get_mut(chat_id) {
                    stream.fail(local_id, "not connected");
                }
                vec![ClientAction::Toast(Toast::error("Not connected. Message not sent."))]
            },
        }
    }

    fn mark_read(
        &mut self,
        notification_id: NotificationId,
        sender_id: Option<UserId>,
    ) -> Vec<ClientAction> {
        self.notifications.mark_read(&notification_id, sender_id.as_ref());
        vec![
            ClientAction::Render(ViewChange::Notifications),
            self.request(ApiRequest::MarkRead { notification_id }, PendingRequest::MarkRead),
        ]
    }

    fn mark_sender_read(&mut self, sender_id: UserId) -> Vec<ClientAction> {
        self.notifications.evict_sender(&sender_id);
        let mut out = vec![ClientAction::Render(ViewChange::Notifications)];
        out.extend(self.send_best_effort(&OutboundEvent::MarkAllMessageNotificationsRead {
            sender_id,
        }));
        out
    }

    fn handle_response(
        &mut self,
        id: RequestId,
        result: Result<Value, RequestError>,
    ) -> Vec<ClientAction> {
        let Some(pending) = self.requests.remove(&id) else {
            tracing::debug!(%id, "response to unknown request");
            return Vec::new();
        };

        match pending {
            PendingRequest::Notifications => {
                match result.and_then(decode::<NotificationsData>) {
                    Ok(snapshot) => {
                        self.reconcile_notifications(&snapshot);
                        vec![ClientAction::Render(ViewChange::Notifications)]
                    },
                    Err(err) => {
                        tracing::warn!(%err, "notification snapshot failed");
                        Vec::new()
                    },
                }
            },
            PendingRequest::UnreadCount => match result.and_then(decode::<UnreadCountResponse>) {
                Ok(body) => {
                    self.notifications.set_unread_count(body.unread_count);
                    vec![ClientAction::Render(ViewChange::Notifications)]
                },
                Err(err) => {
                    tracing::warn!(%err, "unread count refresh failed");
                    Vec::new()
                },
            },
            PendingRequest::MarkRead => match result.and_then(decode_action) {
                Ok(()) => Vec::new(),
                Err(err) => vec![
                    ClientAction::Toast(Toast::error(format!("Could not mark as read: {err}"))),
                    self.request_snapshot(),
                ],
            },
            PendingRequest::MarkAllRead => match result.and_then(decode_action) {
                Ok(()) => {
                    self.notifications.confirm_mark_all();
                    Vec::new()
                },
                Err(err) => {
                    self.notifications.rollback_mark_all();
                    vec![
                        ClientAction::Render(ViewChange::Notifications),
                        ClientAction::Toast(Toast::error(format!(
                            "Could not clear notifications: {err}"
                        ))),
                    ]
                },
            },
            PendingRequest::Search { token } => {
                let result = result.and_then(decode_users);
                let failure = result.as_ref().err().map(ToString::to_string);
                if !self.search.apply_response(token, result) {
                    return Vec::new();
                }
                let mut out = vec![ClientAction::Render(ViewChange::Search)];
                if let Some(err) = failure {
                    out.push(ClientAction::Toast(Toast::error(format!("Search failed: {err}"))));
                }
                out
            },
            PendingRequest::Friends => match result.and_then(decode::<FriendsResponse>) {
                Ok(body) => {
                    self.roster.set_friends(&body.friends);
                    for friend in &body.friends {
                        if let Some(status) = friend.status {
                            self.presence.set(&friend.id, status);
                        }
                    }
                    vec![ClientAction::Render(ViewChange::Friends)]
                },
                Err(err) => {
                    let message = format!("Could not load friends: {err}");
                    vec![ClientAction::Toast(Toast::error(message))]
                },
            },
            PendingRequest::SendFriendRequest => match result.and_then(decode_action) {
                Ok(()) => vec![ClientAction::Toast(Toast::success("Friend request sent"))],
                Err(err) => vec![ClientAction::Toast(Toast::error(format!(
                    "Could not send friend request: {err}"
                )))],
            },
            PendingRequest::RespondFriendRequest { action } => {
                match result.and_then(decode_action) {
                    Ok(()) => {
                        let message = match action {
                            FriendResponse::Accept => "Friend request accepted",
                            FriendResponse::Decline => "Friend request declined",
                        };
                        vec![
                            ClientAction::Toast(Toast::success(message)),
                            self.request(ApiRequest::Friends, PendingRequest::Friends),
                        ]
                    },
                    Err(err) => vec![ClientAction::Toast(Toast::error(format!(
                        "Could not respond to friend request: {err}"
                    )))],
                }
            },
            PendingRequest::RemoveFriend { friend_id } => match result.and_then(decode_action) {
                Ok(()) => {
                    self.roster.remove_friend(&friend_id);
                    vec![
                        ClientAction::Render(ViewChange::Friends),
                        ClientAction::Toast(Toast::success("Friend removed")),
                    ]
                },
                Err(err) => {
                    let message = format!("Could not remove friend: {err}");
                    vec![ClientAction::Toast(Toast::error(message))]
                },
            },
            PendingRequest::CreateChat => match result.and_then(decode::<CreateChatResponse>) {
                Ok(body) => {
                    let mut out = vec![ClientAction::ChatCreated { chat_id: body.chat_id.clone() }];
                    out.extend(self.open_chat(body.chat_id));
                    out
                },
                Err(err) => {
                    vec![ClientAction::Toast(Toast::error(format!("Could not create chat: {err}")))]
                },
            },
            PendingRequest::History { chat_id } => {
                match result.and_then(decode::<ChatMessagesResponse>) {
                    Ok(body) => self.load_history(&chat_id, &body),
                    Err(err) => {
                        tracing::warn!(%chat_id, %err, "history load failed");
                        let message = format!("Could not load messages: {err}");
                        vec![ClientAction::Toast(Toast::error(message))]
                    },
                }
            },
            PendingRequest::EditMessage { chat_id, message_id, content } => {
                match result.and_then(decode_action) {
                    Ok(()) => {
                        let changed = self
                            .streams
                            .get_mut(&chat_id)
                            .is_some_and(|stream| stream.apply_edit(&message_id, &content));
                        render_if(changed, ViewChange::Messages(chat_id))
                    },
                    Err(err) => {
                        let message = format!("Could not edit message: {err}");
                        vec![ClientAction::Toast(Toast::error(message))]
                    },
                }
            },
            PendingRequest::DeleteMessage { chat_id, message_id } => {
                match result.and_then(decode_action) {
                    Ok(()) => {
                        let changed = self
                            .streams
                            .get_mut(&chat_id)
                            .is_some_and(|stream| stream.remove(&message_id));
                        render_if(changed, ViewChange::Messages(chat_id))
                    },
                    Err(err) => {
                        let message = format!("Could not delete message: {err}");
                        vec![ClientAction::Toast(Toast::error(message))]
                    },
                }
            },
        }
    }

    fn load_history(
        &mut self,
        chat_id: &ChatId,
        body: &ChatMessagesResponse,
    ) -> Vec<ClientAction> {
        for message in &body.messages {
            if let Some(name) = &message.sender_username {
                self.roster.remember(&message.sender_id, name);
            }
        }

        let wall = self.env.wall_clock();
        let roster = &self.roster;
        let resolve = |id: &UserId| roster.display_name(id).map(str::to_string);
        let added = self
            .streams
            .get_mut(chat_id)
            .map_or(0, |stream| stream.load_history(&body.messages, wall, resolve));
        tracing::debug!(%chat_id, added, "history loaded");

        let mut out = render_if(added > 0, ViewChange::Messages(chat_id.clone()));
        out.extend(self.send_read_receipts(chat_id));
        out
    }

    fn reconcile_notifications(&mut self, snapshot: &NotificationsData) {
        for record in &snapshot.notifications {
            if let (Some(id), Some(name)) = (&record.data.sender_id, &record.data.sender_username) {
                self.roster.remember(id, name);
            }
        }

        let roster = &self.roster;
        self.notifications.reconcile(snapshot, self.env.now(), self.env.wall_clock(), |id| {
            roster.display_name(id).map(str::to_string)
        });
    }

    fn resolve_sender(&mut self, id: Option<&UserId>, username: Option<&str>) -> PushSender {
        let Some(id) = id else {
            return PushSender::Anonymous;
        };
        if let Some(name) = username {
            self.roster.remember(id, name);
        }
        match self.roster.display_name(id) {
            Some(name) => PushSender::Known { id: id.clone(), name: name.to_string() },
            None => PushSender::Unresolved(id.clone()),
        }
    }

    fn set_presence(&mut self, user_id: &UserId, presence: Presence) -> Vec<ClientAction> {
        render_if(self.presence.set(user_id, presence), ViewChange::Presence(user_id.clone()))
    }

    fn system_line(&mut self, text: String) -> Vec<ClientAction> {
        let at = self.env.wall_clock();
        let Some(chat_id) = self.active_chat.clone() else {
            return Vec::new();
        };
        match self.streams.get_mut(&chat_id) {
            Some(stream) => {
                stream.push_system(text, at);
                vec![ClientAction::Render(ViewChange::Messages(chat_id))]
            },
            None => Vec::new(),
        }
    }

    fn emit_typing(&mut self, emits: Vec<TypingEmit>) -> Vec<ClientAction> {
        emits
            .into_iter()
            .filter_map(|emit| {
                self.send_best_effort(&OutboundEvent::Typing {
                    chat_id: emit.chat_id,
                    is_typing: emit.is_typing,
                })
            })
            .collect()
    }

    /// Send if connected; otherwise drop. Used for events that are pointless
    /// to replay later (typing, joins are re-sent on reconnect).
    fn send_best_effort(&mut self, event: &OutboundEvent) -> Option<ClientAction> {
        match self.channel.send(event, self.env.now()) {
            Ok((frame, _)) => Some(ClientAction::Send(frame)),
            Err(err) => {
                tracing::debug!(event = event.name(), %err, "not sent");
                None
            },
        }
    }

    fn search_request(&mut self, request: SearchRequest) -> ClientAction {
        self.request(
            ApiRequest::SearchUsers { query: request.query },
            PendingRequest::Search { token: request.token },
        )
    }

    fn request_snapshot(&mut self) -> ClientAction {
        let limit = self.config.notifications.page_limit;
        self.request(ApiRequest::Notifications { limit }, PendingRequest::Notifications)
    }

    fn request(&mut self, request: ApiRequest, pending: PendingRequest) -> ClientAction {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        self.requests.insert(id, pending);
        ClientAction::Request { id, request }
    }
}

fn render_if(changed: bool, view: ViewChange) -> Vec<ClientAction> {
    if changed { vec![ClientAction::Render(view)] } else { Vec::new() }
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, RequestError> {
    serde_json::from_value(body).map_err(|e| RequestError::Decode(e.to_string()))
}

/// Mutation endpoints answer with `{success, error?}` or nothing at all.
fn decode_action(body: Value) -> Result<(), RequestError> {
    if body.is_null() {
        return Ok(());
    }
    let body: ActionResponse = decode(body)?;
    if body.success {
        Ok(())
    } else {
        Err(RequestError::Rejected(body.error.unwrap_or_else(|| "request rejected".to_string())))
    }
}

/// Search answers with either a bare array or `{users: [...]}`.
fn decode_users(body: Value) -> Result<Vec<UserRecord>, RequestError> {
    if body.is_array() {
        return decode(body);
    }
    decode::<SearchUsersResponse>(body).map(|body| body.users)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use hangspace_core::{DeliveryState, env::test_utils::MockEnv};
    use hangspace_proto::{
        AckId, Frame,
        inbound::{ChatMessage, NewMessageNotification},
    };
    use serde_json::json;

    use super::*;

    fn client() -> (MockEnv, Client<MockEnv>) {
        let env = MockEnv::new();
        let client =
            Client::new(env.clone(), ClientIdentity::new("me", "me"), ClientConfig::default());
        (env, client)
    }

    fn connected() -> (MockEnv, Client<MockEnv>) {
        let (env, mut client) = client();
        client.handle(ClientEvent::Connect).unwrap();
        client.handle(ClientEvent::ChannelOpened).unwrap();
        (env, client)
    }

    fn sent_frames(actions: &[ClientAction]) -> Vec<&Frame> {
        actions
            .iter()
            .filter_map(|a| match a {
                ClientAction::Send(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn connect_fetches_snapshot() {
        let (_, mut client) = client();
        let actions = client.handle(ClientEvent::Connect).unwrap();
        assert!(actions.contains(&ClientAction::OpenChannel { attempt: 0 }));

        let actions = client.handle(ClientEvent::ChannelOpened).unwrap();
        assert!(actions.iter().any(|a| matches!(
            a,
            ClientAction::Request { request: ApiRequest::Notifications { limit: 20 }, .. }
        )));
        assert_eq!(client.state(), ChannelState::Connected);
    }

    #[test]
    fn open_chat_joins_and_requests_statuses() {
        let (_, mut client) = connected();
        let actions = client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).unwrap();

        let events: Vec<&str> = sent_frames(&actions).iter().map(|f| f.event.as_str()).collect();
        assert_eq!(events, vec!["join_chat", "request_initial_statuses"]);
    }

    #[test]
    fn empty_message_sends_nothing() {
        let (_, mut client) = connected();
        client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).unwrap();

        let result = client.handle(ClientEvent::SendMessage { content: "  ".into() });
        assert_eq!(result, Err(ClientError::Validation(ValidationError::EmptyMessage)));
        assert!(client.active_stream().unwrap().is_empty());
    }

    #[test]
    fn send_without_chat_rejected() {
        let (_, mut client) = connected();
        let result = client.handle(ClientEvent::SendMessage { content: "hi".into() });
        assert_eq!(result, Err(ClientError::Validation(ValidationError::NoActiveChat)));
    }

    #[test]
    fn ack_confirms_pending_message() {
        let (_, mut client) = connected();
        client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).unwrap();

        let actions = client.handle(ClientEvent::SendMessage { content: "hi".into() }).unwrap();
        let frames = sent_frames(&actions);
        assert_eq!(frames[0].event, "send_message");
        assert_eq!(frames[1].event, "typing");
        let ack = frames[0].ack.unwrap();
        assert_eq!(client.active_stream().unwrap().pending_count(), 1);

        let reply = Frame::ack_reply(ack, json!({ "message_id": "m1" }));
        client.handle(ClientEvent::FrameReceived(reply)).unwrap();

        let stream = client.active_stream().unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.entries()[0].state, DeliveryState::Confirmed);
    }

    #[test]
    fn ack_timeout_fails_message_and_retry_reuses_it() {
        let (env, mut client) = connected();
        client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).unwrap();
        client.handle(ClientEvent::SendMessage { content: "hi".into() }).unwrap();

        env.advance(Duration::from_secs(11));
        client.handle(ClientEvent::Tick { now: env.now() }).unwrap();

        let entry = client.active_stream().unwrap().entries()[0].clone();
        assert!(matches!(entry.state, DeliveryState::Failed { .. }));

        let local_id = entry.local_id.unwrap();
        let actions = client.handle(ClientEvent::RetryMessage { local_id }).unwrap();
        assert_eq!(sent_frames(&actions).len(), 1);
        assert_eq!(client.active_stream().unwrap().len(), 1);
        assert_eq!(client.active_stream().unwrap().pending_count(), 1);
    }

    #[test]
    fn own_echo_does_not_duplicate() {
        let (_, mut client) = connected();
        client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).unwrap();
        let actions = client.handle(ClientEvent::SendMessage { content: "hi".into() }).unwrap();
        let client_msg_id =
            sent_frames(&actions)[0].data["client_msg_id"].as_str().unwrap().to_string();

        let echo = InboundEvent::NewMessage(ChatMessage {
            message_id: "m1".into(),
            chat_id: "c1".into(),
            sender_id: "me".into(),
            sender_username: "me".into(),
            content: "hi".into(),
            kind: MessageKind::Text,
            timestamp: None,
            client_msg_id: Some(client_msg_id),
        });
        client.handle(ClientEvent::FrameReceived(echo.into_frame().unwrap())).unwrap();

        assert_eq!(client.active_stream().unwrap().len(), 1);
    }

    #[test]
    fn mark_all_failure_restores_bundles() {
        let (_, mut client) = connected();
        let push = InboundEvent::NewMessageNotification(NewMessageNotification {
            sender_id: "u1".into(),
            sender_username: Some("Bob".into()),
            message_count: Some(1),
            chat_id: Some("c1".into()),
            message: Some("hey".into()),
        });
        client.handle(ClientEvent::FrameReceived(push.into_frame().unwrap())).unwrap();
        assert_eq!(client.unread_count(), 1);

        let actions = client.handle(ClientEvent::MarkAllRead).unwrap();
        assert_eq!(client.unread_count(), 0);
        let Some(ClientAction::Request { id, .. }) =
            actions.iter().find(|a| matches!(a, ClientAction::Request { .. }))
        else {
            panic!("mark-all request expected");
        };

        let failure = Err(RequestError::Status { code: 500, message: String::new() });
        let actions = client.handle(ClientEvent::ApiResponse { id: *id, result: failure }).unwrap();
        assert!(actions.iter().any(|a| matches!(a, ClientAction::Toast(_))));
        assert_eq!(client.unread_count(), 1);
        assert_eq!(client.notifications().bundle_count(), 1);
    }

    #[test]
    fn stale_search_response_ignored() {
        let (_, mut client) = connected();
        client.handle(ClientEvent::SearchInput { text: "bob".into() }).unwrap();
        let first = client.handle(ClientEvent::SearchSubmit).unwrap();
        client.handle(ClientEvent::SearchInput { text: "al".into() }).unwrap();
        let second = client.handle(ClientEvent::SearchSubmit).unwrap();

        let id = |actions: &[ClientAction]| match actions.first() {
            Some(ClientAction::Request { id, .. }) => *id,
            other => panic!("expected request, got {other:?}"),
        };
        let (first, second) = (id(&first), id(&second));

        let alice = json!([{ "_id": "u2", "username": "alice" }]);
        let bob = json!({ "users": [{ "_id": "u1", "username": "bob" }] });
        client.handle(ClientEvent::ApiResponse { id: second, result: Ok(alice) }).unwrap();
        let actions =
            client.handle(ClientEvent::ApiResponse { id: first, result: Ok(bob) }).unwrap();

        assert!(actions.is_empty());
        assert_eq!(client.search().results()[0].username, "alice");
    }

    #[test]
    fn typing_from_others_shows_indicator_and_expires() {
        let (env, mut client) = connected();
        client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).unwrap();

        let typing = InboundEvent::UserTyping(hangspace_proto::inbound::UserTyping {
            username: "bob".into(),
            user_id: None,
            is_typing: true,
        });
        client.handle(ClientEvent::FrameReceived(typing.into_frame().unwrap())).unwrap();
        assert_eq!(client.typing_indicator().as_deref(), Some("bob is typing..."));

        env.advance(Duration::from_secs(5));
        client.handle(ClientEvent::Tick { now: env.now() }).unwrap();
        assert_eq!(client.typing_indicator(), None);
    }

    #[test]
    fn late_ack_after_timeout_is_ignored() {
        let (env, mut client) = connected();
        client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).unwrap();
        client.handle(ClientEvent::SendMessage { content: "hi".into() }).unwrap();
        env.advance(Duration::from_secs(11));
        client.handle(ClientEvent::Tick { now: env.now() }).unwrap();

        let late = Frame::ack_reply(AckId(1), serde_json::Value::Null);
        assert!(client.handle(ClientEvent::FrameReceived(late)).unwrap().is_empty());
    }
}
