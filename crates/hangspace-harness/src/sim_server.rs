//! In-memory chat server for simulation.
//!
//! Answers the channel events and API calls the client makes, the way the
//! production server does, without any networking. Tests script the world
//! (directory, friends, presence, stored notifications) and inject
//! server-initiated events; the [`crate::SimDriver`] wires it to the runtime.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use hangspace_client::ClientIdentity;
use hangspace_core::RequestError;
use hangspace_proto::{
    ApiRequest, ChatId, Frame, MessageId, MessageKind, NotificationData, NotificationId,
    NotificationKind, NotificationRecord, Presence, StoredMessage, UserId, UserRecord,
};
use serde_json::{Value, json};

/// Scripted server state.
#[derive(Debug)]
pub struct SimServer {
    identity: ClientIdentity,
    /// Stored messages per chat, oldest first.
    history: BTreeMap<ChatId, Vec<StoredMessage>>,
    directory: Vec<UserRecord>,
    friends: BTreeMap<UserId, UserRecord>,
    presence: BTreeMap<UserId, Presence>,
    notifications: Vec<NotificationRecord>,
    joined: BTreeSet<ChatId>,
    reject_sends: Option<String>,
    failing_requests: BTreeMap<String, RequestError>,
    next_id: u64,
    outbox: VecDeque<Frame>,
    received: Vec<Frame>,
    requests: Vec<ApiRequest>,
}

impl SimServer {
    /// Server for a single logged-in client.
    pub fn new(identity: ClientIdentity) -> Self {
        Self {
            identity,
            history: BTreeMap::new(),
            directory: Vec::new(),
            friends: BTreeMap::new(),
            presence: BTreeMap::new(),
            notifications: Vec::new(),
            joined: BTreeSet::new(),
            reject_sends: None,
            failing_requests: BTreeMap::new(),
            next_id: 1,
            outbox: VecDeque::new(),
            received: Vec::new(),
            requests: Vec::new(),
        }
    }

    /// Add a user to the search directory.
    pub fn add_user(&mut self, user: UserRecord) {
        self.directory.push(user);
    }

    /// Make `user` a friend (and searchable).
    pub fn add_friend(&mut self, user: UserRecord) {
        self.friends.insert(user.id.clone(), user.clone());
        self.directory.push(user);
    }

    /// Set a user's presence without telling the client.
    pub fn set_presence(&mut self, user_id: &UserId, presence: Presence) {
        self.presence.insert(user_id.clone(), presence);
    }

    /// Answer every `send_message` with an error ack, or stop doing so.
    pub fn reject_sends(&mut self, reason: Option<&str>) {
        self.reject_sends = reason.map(str::to_string);
    }

    /// Fail every API call whose path starts with `path_prefix`.
    pub fn fail_requests(&mut self, path_prefix: &str, error: RequestError) {
        self.failing_requests.insert(path_prefix.to_string(), error);
    }

    /// Queue a server-initiated frame for the client.
    pub fn push(&mut self, frame: Frame) {
        self.outbox.push_back(frame);
    }

    /// Store a message notification from `from` and push it the way the
    /// server does after an unread message.
    pub fn notify_message(&mut self, from: &UserRecord, chat_id: &ChatId, content: &str) {
        let count = self.unread_messages_from(&from.id) + 1;
        let id = self.next_id("n");
        self.notifications.push(NotificationRecord {
            id: NotificationId::from(id.as_str()),
            kind: NotificationKind::NewMessage,
            message: content.to_string(),
            data: NotificationData {
                sender_id: Some(from.id.clone()),
                sender_username: Some(from.username.clone()),
                chat_id: Some(chat_id.clone()),
                message_count: Some(count),
                latest_content: Some(content.to_string()),
                latest_timestamp: None,
            },
            is_read: false,
            created_at: None,
        });

        self.push(Frame::new(
            "new_message_notification",
            json!({
                "sender_id": from.id,
                "sender_username": from.username,
                "message_count": count,
                "chat_id": chat_id,
                "message": content,
            }),
        ));
    }

    /// Store a message sent before the client connected, without pushing it.
    pub fn store_message(
        &mut self,
        from: &UserRecord,
        chat_id: &ChatId,
        content: &str,
        at: DateTime<Utc>,
    ) -> MessageId {
        let message_id = MessageId::from(self.next_id("m").as_str());
        self.record(chat_id, StoredMessage {
            message_id: message_id.clone(),
            sender_id: from.id.clone(),
            sender_username: None,
            content: content.to_string(),
            kind: MessageKind::Text,
            timestamp: Some(at),
            is_edited: false,
            is_deleted: false,
            read_by: Vec::new(),
        });
        message_id
    }

    /// Deliver a chat message from another user.
    pub fn deliver_message(
        &mut self,
        from: &UserRecord,
        chat_id: &ChatId,
        content: &str,
        at: DateTime<Utc>,
    ) {
        let message_id = self.store_message(from, chat_id, content, at);
        self.push(Frame::new(
            "new_message",
            json!({
                "message_id": message_id,
                "chat_id": chat_id,
                "sender_id": from.id,
                "sender_username": from.username,
                "content": content,
                "type": "text",
                "timestamp": at.to_rfc3339(),
            }),
        ));
    }

    /// Unread notifications the server holds.
    pub fn unread_count(&self) -> u64 {
        self.notifications.iter().filter(|n| !n.is_read).count() as u64
    }

    /// Stored messages of a chat, oldest first.
    pub fn history(&self, chat_id: &ChatId) -> &[StoredMessage] {
        self.history.get(chat_id).map_or(&[], Vec::as_slice)
    }

    /// Chats the client has joined.
    pub fn joined(&self) -> &BTreeSet<ChatId> {
        &self.joined
    }

    /// Every frame received from the client, in order.
    pub fn received(&self) -> &[Frame] {
        &self.received
    }

    /// Received frames with the given event name.
    pub fn received_named(&self, event: &str) -> Vec<&Frame> {
        self.received.iter().filter(|frame| frame.event == event).collect()
    }

    /// Every API call made, in order.
    pub fn requests(&self) -> &[ApiRequest] {
        &self.requests
    }

    /// Take frames waiting for the client.
    pub fn take_outbox(&mut self) -> Vec<Frame> {
        self.outbox.drain(..).collect()
    }

    /// Whether frames are waiting for the client.
    pub fn has_outbox(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Pop the next frame waiting for the client.
    pub fn pop_outbox(&mut self) -> Option<Frame> {
        self.outbox.pop_front()
    }

    /// Handle a frame sent by the client.
    pub fn handle_frame(&mut self, frame: Frame) {
        self.received.push(frame.clone());
        let chat_id = frame.data.get("chat_id").and_then(Value::as_str).map(ChatId::from);

        match (frame.event.as_str(), chat_id) {
            ("join_chat", Some(chat_id)) => {
                self.joined.insert(chat_id);
            },
            ("leave_chat", Some(chat_id)) => {
                self.joined.remove(&chat_id);
            },
            ("request_initial_statuses", Some(_)) => {
                let statuses: Vec<Value> = self
                    .presence
                    .iter()
                    .map(|(user_id, status)| json!({ "user_id": user_id, "status": status }))
                    .collect();
                self.push(Frame::new("initial_statuses", json!({ "statuses": statuses })));
            },
            ("send_message", Some(chat_id)) => self.accept_message(&frame, &chat_id),
            ("mark_all_message_notifications_read", _) => {
                if let Some(sender) = frame.data.get("sender_id").and_then(Value::as_str) {
                    let sender = UserId::from(sender);
                    self.mark_where(|n| {
                        n.kind == NotificationKind::NewMessage
                            && n.data.sender_id.as_ref() == Some(&sender)
                    });
                }
            },
            ("request_notifications", _) => {
                let data = self.notifications_body(u32::MAX);
                self.push(Frame::new("notifications_data", data));
            },
            ("message_read", _) => {
                let reader = self.identity.user_id.clone();
                if let Some(id) = frame.data.get("message_id").and_then(Value::as_str)
                    && let Some(message) = self.find_message_mut(&MessageId::from(id))
                    && !message.read_by.contains(&reader)
                {
                    message.read_by.push(reader);
                }
            },
            (event, _) => tracing::trace!(event, "sim server ignored frame"),
        }
    }

    /// Answer an API call.
    pub fn handle_request(&mut self, request: &ApiRequest) -> Result<Value, RequestError> {
        self.requests.push(request.clone());

        let path = request.path();
        if let Some(error) = self
            .failing_requests
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, error)| error.clone())
        {
            return Err(error);
        }

        let body = match request {
            ApiRequest::Notifications { limit } => self.notifications_body(*limit),
            ApiRequest::UnreadCount => json!({ "unread_count": self.unread_count() }),
            ApiRequest::MarkRead { notification_id } => {
                let id = notification_id.clone();
                self.mark_where(|n| n.id == id);
                json!({ "success": true })
            },
            ApiRequest::MarkAllRead => {
                self.mark_where(|_| true);
                json!({ "success": true })
            },
            ApiRequest::SearchUsers { query } => {
                let query = query.to_lowercase();
                let users: Vec<&UserRecord> = self
                    .directory
                    .iter()
                    .filter(|user| user.id != self.identity.user_id)
                    .filter(|user| user.username.to_lowercase().contains(&query))
                    .collect();
                json!({ "users": users })
            },
            ApiRequest::Friends => {
                let friends: Vec<UserRecord> = self
                    .friends
                    .values()
                    .map(|friend| UserRecord {
                        status: self.presence.get(&friend.id).copied(),
                        ..friend.clone()
                    })
                    .collect();
                json!({ "friends": friends })
            },
            ApiRequest::SendFriendRequest { user_id } => {
                if self.friends.contains_key(user_id) {
                    json!({ "success": false, "error": "Already friends" })
                } else {
                    json!({ "success": true })
                }
            },
            ApiRequest::RespondFriendRequest { .. } => json!({ "success": true }),
            ApiRequest::RemoveFriend { friend_id } => {
                let removed = self.friends.remove(friend_id).is_some();
                json!({ "success": removed })
            },
            ApiRequest::CreateChat { .. } => json!({ "chat_id": self.next_id("chat") }),
            ApiRequest::ChatMessages { chat_id, limit } => {
                let stored = self.history(chat_id);
                let limit = usize::try_from(*limit).unwrap_or(usize::MAX);
                let newest = &stored[stored.len().saturating_sub(limit)..];
                json!({ "success": true, "messages": newest, "count": newest.len() })
            },
            ApiRequest::UpdateMessage { message_id, new_content } => {
                match self.own_message(message_id) {
                    Ok(chat_id) => {
                        if let Some(message) = self.find_message_mut(message_id) {
                            message.content.clone_from(new_content);
                            message.is_edited = true;
                        }
                        self.broadcast(&chat_id, Frame::new(
                            "message_updated",
                            json!({
                                "message_id": message_id,
                                "chat_id": chat_id,
                                "new_content": new_content,
                            }),
                        ));
                        json!({ "success": true })
                    },
                    Err(error) => json!({ "success": false, "error": error }),
                }
            },
            ApiRequest::DeleteMessage { message_id } => match self.own_message(message_id) {
                Ok(chat_id) => {
                    if let Some(message) = self.find_message_mut(message_id) {
                        message.is_deleted = true;
                        message.content = "This message was deleted".to_string();
                    }
                    self.broadcast(&chat_id, Frame::new(
                        "message_deleted",
                        json!({ "message_id": message_id, "chat_id": chat_id }),
                    ));
                    json!({ "success": true })
                },
                Err(error) => json!({ "success": false, "error": error }),
            },
        };

        Ok(body)
    }

    fn accept_message(&mut self, frame: &Frame, chat_id: &ChatId) {
        let Some(ack) = frame.ack else {
            return;
        };
        if let Some(reason) = &self.reject_sends {
            let reply = Frame::ack_reply(ack, json!({ "error": reason }));
            self.push(reply);
            return;
        }

        let message_id = self.next_id("m");
        let content = frame.data.get("message").and_then(Value::as_str).unwrap_or_default();
        self.record(chat_id, StoredMessage {
            message_id: MessageId::from(message_id.as_str()),
            sender_id: self.identity.user_id.clone(),
            sender_username: None,
            content: content.to_string(),
            kind: MessageKind::Text,
            timestamp: None,
            is_edited: false,
            is_deleted: false,
            read_by: Vec::new(),
        });
        self.push(Frame::ack_reply(ack, json!({ "message_id": message_id })));
        self.push(Frame::new(
            "new_message",
            json!({
                "message_id": message_id,
                "chat_id": chat_id,
                "sender_id": self.identity.user_id,
                "sender_username": self.identity.username,
                "content": frame.data.get("message").cloned().unwrap_or(Value::Null),
                "type": frame.data.get("type").cloned().unwrap_or_else(|| json!("text")),
                "client_msg_id": frame.data.get("client_msg_id").cloned().unwrap_or(Value::Null),
            }),
        ));
    }

    fn record(&mut self, chat_id: &ChatId, message: StoredMessage) {
        self.history.entry(chat_id.clone()).or_default().push(message);
    }

    fn find_message_mut(&mut self, message_id: &MessageId) -> Option<&mut StoredMessage> {
        self.history.values_mut().flatten().find(|message| message.message_id == *message_id)
    }

    /// Chat of a live message the client wrote, or why it cannot be changed.
    fn own_message(&self, message_id: &MessageId) -> Result<ChatId, &'static str> {
        let (chat_id, message) = self
            .history
            .iter()
            .flat_map(|(chat_id, messages)| messages.iter().map(move |m| (chat_id, m)))
            .find(|(_, message)| message.message_id == *message_id && !message.is_deleted)
            .ok_or("Message not found")?;
        if message.sender_id != self.identity.user_id {
            return Err("Not your message");
        }
        Ok(chat_id.clone())
    }

    /// Push to the client if it has joined `chat_id`.
    fn broadcast(&mut self, chat_id: &ChatId, frame: Frame) {
        if self.joined.contains(chat_id) {
            self.push(frame);
        }
    }

    fn notifications_body(&self, limit: u32) -> Value {
        let page: Vec<&NotificationRecord> = self
            .notifications
            .iter()
            .rev()
            .filter(|n| !n.is_read)
            .take(limit as usize)
            .collect();
        json!({ "notifications": page, "unread_count": self.unread_count() })
    }

    fn unread_messages_from(&self, sender: &UserId) -> u32 {
        self.notifications
            .iter()
            .filter(|n| !n.is_read && n.kind == NotificationKind::NewMessage)
            .filter(|n| n.data.sender_id.as_ref() == Some(sender))
            .count() as u32
    }

    fn mark_where(&mut self, matches: impl Fn(&NotificationRecord) -> bool) {
        for notification in self.notifications.iter_mut().filter(|n| matches(n)) {
            notification.is_read = true;
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}-{}", self.next_id);
        self.next_id += 1;
        id
    }
}
