//! Application state machine.
//!
//! This module defines the [`App`] state machine, which manages the interactive
//! state of the application completely decoupled from I/O and sync mechanics.
//!
//! This is a pure state machine: it consumes [`crate::AppEvent`] inputs and
//! produces [`crate::AppAction`] instructions for the runtime to execute.
//!
//! # Responsibilities
//!
//! - Owns the composer and search input buffers and which one has focus.
//! - Parses composer commands into intents.
//! - Holds the latest view snapshots pushed by the bridge.
//! - Shows toasts and dismisses them after [`AppConfig::toast_duration`].

use std::time::Instant;

use hangspace_client::{FriendView, Toast};
use hangspace_core::{ChannelState, MonotonicInstant};
use hangspace_proto::FriendResponse;

use crate::{
    AppAction, AppConfig, AppEvent, ChatView, Focus, KeyInput, NotificationsView, SearchView,
    ViewUpdate,
    commands::{self, Command},
};

/// Toasts kept on screen at once. Older ones are dropped first.
pub const MAX_TOASTS: usize = 5;

#[derive(Debug, Clone)]
struct ActiveToast<I> {
    toast: Toast,
    /// Set on the first tick after the toast appeared.
    shown_at: Option<I>,
}

/// Application state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies - fully testable in simulation.
#[derive(Debug, Clone)]
pub struct App<I = Instant> {
    config: AppConfig,
    connection: ChannelState,
    status_line: String,
    chat: Option<ChatView>,
    notifications: NotificationsView,
    search: SearchView,
    friends: Vec<FriendView>,
    toasts: Vec<ActiveToast<I>>,
    /// Time of the latest tick. `None` before the first tick.
    clock: Option<I>,
    focus: Focus,
    composer: String,
    search_input: String,
}

impl<I: MonotonicInstant> App<I> {
    /// Create a new App in disconnected state.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            connection: ChannelState::Disconnected,
            status_line: ChannelState::Disconnected.status_text().to_string(),
            chat: None,
            notifications: NotificationsView::default(),
            search: SearchView::default(),
            friends: Vec::new(),
            toasts: Vec::new(),
            clock: None,
            focus: Focus::Composer,
            composer: String::new(),
            search_input: String::new(),
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent<I>) -> Vec<AppAction> {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Tick { now } => self.tick(now),
            AppEvent::View(update) => {
                self.apply_view(update);
                vec![AppAction::Render]
            },
            AppEvent::Toast(toast) => {
                self.show_toast(toast);
                vec![AppAction::Render]
            },
            AppEvent::Error { message } => {
                self.show_toast(Toast::error(message));
                vec![AppAction::Render]
            },
        }
    }

    /// Initiate connection to the server.
    pub fn connect(&mut self) -> Vec<AppAction> {
        vec![AppAction::Connect, AppAction::Render]
    }

    /// Quit the application.
    pub fn quit(&self) -> Vec<AppAction> {
        vec![AppAction::Quit]
    }

    /// Settings.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Channel state as last reported.
    pub fn connection(&self) -> ChannelState {
        self.connection
    }

    /// Status line text.
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Open chat. `None` if no chat is open.
    pub fn chat(&self) -> Option<&ChatView> {
        self.chat.as_ref()
    }

    /// Badge and bundles.
    pub fn notifications(&self) -> &NotificationsView {
        &self.notifications
    }

    /// Search results.
    pub fn search(&self) -> &SearchView {
        &self.search
    }

    /// Friends with presence.
    pub fn friends(&self) -> &[FriendView] {
        &self.friends
    }

    /// Visible toasts, oldest first.
    pub fn toasts(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter().map(|active| &active.toast)
    }

    /// Which input has focus.
    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// Composer contents.
    pub fn composer(&self) -> &str {
        &self.composer
    }

    /// Search box contents.
    pub fn search_input(&self) -> &str {
        &self.search_input
    }

    fn handle_key(&mut self, key: KeyInput) -> Vec<AppAction> {
        match (key, self.focus) {
            (KeyInput::Esc, _) => self.quit(),
            (KeyInput::Tab, focus) => {
                self.focus = focus.toggled();
                vec![AppAction::Render]
            },
            (KeyInput::Char(c), Focus::Composer) => {
                self.composer.push(c);
                if self.chat.is_some() && !self.composer.trim_start().starts_with('/') {
                    vec![AppAction::Keystroke, AppAction::Render]
                } else {
                    vec![AppAction::Render]
                }
            },
            (KeyInput::Backspace, Focus::Composer) => {
                self.composer.pop();
                vec![AppAction::Render]
            },
            (KeyInput::Enter, Focus::Composer) => self.submit_composer(),
            (KeyInput::Char(c), Focus::Search) => {
                self.search_input.push(c);
                vec![AppAction::SearchInput { text: self.search_input.clone() }, AppAction::Render]
            },
            (KeyInput::Backspace, Focus::Search) => {
                if self.search_input.pop().is_none() {
                    return Vec::new();
                }
                vec![AppAction::SearchInput { text: self.search_input.clone() }, AppAction::Render]
            },
            (KeyInput::Enter, Focus::Search) => vec![AppAction::SearchSubmit, AppAction::Render],
        }
    }

    fn submit_composer(&mut self) -> Vec<AppAction> {
        let text = std::mem::take(&mut self.composer);
        if text.trim().is_empty() {
            return vec![AppAction::Render];
        }

        let action = match commands::parse(&text) {
            Command::Message { content } => {
                if self.chat.is_none() {
                    return self.notice(Toast::error("No open chat. Use /open <chat>"));
                }
                AppAction::SendMessage { content }
            },
            Command::Open { chat_id } => AppAction::OpenChat { chat_id },
            Command::Close => AppAction::CloseChat,
            Command::Retry => AppAction::RetryFailed,
            Command::Edit { content } => {
                if self.chat.is_none() {
                    return self.notice(Toast::error("No open chat. Use /open <chat>"));
                }
                AppAction::EditLast { content }
            },
            Command::Delete => AppAction::DeleteLast,
            Command::Read { notification_id } => {
                let sender_id = self
                    .notifications
                    .items
                    .iter()
                    .find(|item| item.notification_id.as_ref() == Some(&notification_id))
                    .map(|item| item.sender_id.clone());
                AppAction::MarkRead { notification_id, sender_id }
            },
            Command::ReadAll => AppAction::MarkAllRead,
            Command::Clear { sender_id } => AppAction::MarkSenderRead { sender_id },
            Command::Refresh => AppAction::RefreshNotifications,
            Command::Friends => AppAction::LoadFriends,
            Command::Add { user_id } => AppAction::SendFriendRequest { user_id },
            Command::Accept { request_id } => {
                AppAction::RespondFriendRequest { request_id, action: FriendResponse::Accept }
            },
            Command::Decline { request_id } => {
                AppAction::RespondFriendRequest { request_id, action: FriendResponse::Decline }
            },
            Command::Remove { friend_id } => AppAction::RemoveFriend { friend_id },
            Command::CreateChat { participants, is_group } => {
                AppAction::CreateChat { participants, is_group }
            },
            Command::Reconnect => match self.connection {
                ChannelState::Failed => AppAction::RetryConnection,
                ChannelState::Disconnected => AppAction::Connect,
                ChannelState::Connecting | ChannelState::Connected | ChannelState::Reconnecting => {
                    return self.notice(Toast::info(format!("Already {}", self.status_line)));
                },
            },
            Command::Quit => return self.quit(),
            Command::Unknown { input } => {
                return self.notice(Toast::error(format!("Unknown command: {input}")));
            },
            Command::InvalidArgs { command, error } => {
                return self.notice(Toast::error(format!("/{command}: {error}")));
            },
        };

        vec![action, AppAction::Render]
    }

    fn tick(&mut self, now: I) -> Vec<AppAction> {
        self.clock = Some(now);
        let duration = self.config.toast_duration;

        let before = self.toasts.len();
        self.toasts.retain_mut(|active| {
            let shown_at = *active.shown_at.get_or_insert(now);
            now - shown_at < duration
        });

        if self.toasts.len() == before { Vec::new() } else { vec![AppAction::Render] }
    }

    fn apply_view(&mut self, update: ViewUpdate) {
        match update {
            ViewUpdate::Connection { state, status } => {
                self.connection = state;
                self.status_line = status;
            },
            ViewUpdate::Chat(chat) => self.chat = chat,
            ViewUpdate::Notifications(view) => self.notifications = view,
            ViewUpdate::Search(view) => self.search = view,
            ViewUpdate::Friends(friends) => self.friends = friends,
        }
    }

    fn show_toast(&mut self, toast: Toast) {
        if self.toasts.len() >= MAX_TOASTS {
            self.toasts.remove(0);
        }
        self.toasts.push(ActiveToast { toast, shown_at: self.clock });
    }

    fn notice(&mut self, toast: Toast) -> Vec<AppAction> {
        self.show_toast(toast);
        vec![AppAction::Render]
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hangspace_client::ToastLevel;
    use hangspace_proto::{ChatId, NotificationId, UserId};

    use super::*;
    use crate::NotificationItem;

    fn app() -> App {
        App::new(AppConfig::default())
    }

    fn type_text(app: &mut App, text: &str) -> Vec<AppAction> {
        text.chars().flat_map(|c| app.handle(AppEvent::Key(KeyInput::Char(c)))).collect()
    }

    fn with_chat(app: &mut App) {
        app.handle(AppEvent::View(ViewUpdate::Chat(Some(ChatView {
            chat_id: ChatId::from("c1"),
            entries: Vec::new(),
            typing: None,
        }))));
    }

    #[test]
    fn typing_in_open_chat_emits_keystrokes() {
        let mut app = app();
        assert!(!type_text(&mut app, "hi").contains(&AppAction::Keystroke));

        with_chat(&mut app);
        assert!(type_text(&mut app, "!").contains(&AppAction::Keystroke));
    }

    #[test]
    fn commands_do_not_signal_typing() {
        let mut app = app();
        with_chat(&mut app);
        let actions = type_text(&mut app, "/close");
        assert!(!actions.contains(&AppAction::Keystroke));
    }

    #[test]
    fn enter_sends_message_and_clears_composer() {
        let mut app = app();
        with_chat(&mut app);
        type_text(&mut app, "hello");

        let actions = app.handle(AppEvent::Key(KeyInput::Enter));
        assert_eq!(actions, vec![
            AppAction::SendMessage { content: "hello".into() },
            AppAction::Render
        ]);
        assert!(app.composer().is_empty());
    }

    #[test]
    fn message_without_chat_toasts() {
        let mut app = app();
        type_text(&mut app, "hello");
        let actions = app.handle(AppEvent::Key(KeyInput::Enter));

        assert_eq!(actions, vec![AppAction::Render]);
        assert_eq!(app.toasts().next().map(|t| t.level), Some(ToastLevel::Error));
    }

    #[test]
    fn read_command_looks_up_sender() {
        let mut app = app();
        app.handle(AppEvent::View(ViewUpdate::Notifications(NotificationsView {
            unread: 1,
            items: vec![NotificationItem {
                sender_id: UserId::from("u-bob"),
                summary: "Bob: hi".into(),
                time: "just now".into(),
                notification_id: Some(NotificationId::from("n1")),
            }],
        })));

        type_text(&mut app, "/read n1");
        let actions = app.handle(AppEvent::Key(KeyInput::Enter));
        assert_eq!(actions[0], AppAction::MarkRead {
            notification_id: NotificationId::from("n1"),
            sender_id: Some(UserId::from("u-bob")),
        });
    }

    #[test]
    fn reconnect_depends_on_state() {
        let mut app = app();
        type_text(&mut app, "/reconnect");
        assert_eq!(app.handle(AppEvent::Key(KeyInput::Enter))[0], AppAction::Connect);

        app.handle(AppEvent::View(ViewUpdate::Connection {
            state: ChannelState::Failed,
            status: "Connection failed - press retry".into(),
        }));
        type_text(&mut app, "/reconnect");
        assert_eq!(app.handle(AppEvent::Key(KeyInput::Enter))[0], AppAction::RetryConnection);
    }

    #[test]
    fn search_focus_routes_input() {
        let mut app = app();
        app.handle(AppEvent::Key(KeyInput::Tab));
        assert_eq!(app.focus(), Focus::Search);

        let actions = type_text(&mut app, "al");
        assert!(actions.contains(&AppAction::SearchInput { text: "al".into() }));

        let actions = app.handle(AppEvent::Key(KeyInput::Enter));
        assert_eq!(actions[0], AppAction::SearchSubmit);
        assert_eq!(app.search_input(), "al");
    }

    #[test]
    fn toasts_dismiss_after_duration() {
        let t0 = Instant::now();
        let mut app = app();
        app.handle(AppEvent::Tick { now: t0 });
        app.handle(AppEvent::Toast(Toast::info("saved")));

        assert!(app.handle(AppEvent::Tick { now: t0 + Duration::from_millis(2999) }).is_empty());
        assert_eq!(app.toasts().count(), 1);

        let actions = app.handle(AppEvent::Tick { now: t0 + Duration::from_secs(3) });
        assert_eq!(actions, vec![AppAction::Render]);
        assert_eq!(app.toasts().count(), 0);
    }

    #[test]
    fn toast_before_first_tick_starts_on_tick() {
        let t0 = Instant::now();
        let mut app = app();
        app.handle(AppEvent::Error { message: "boom".into() });

        app.handle(AppEvent::Tick { now: t0 });
        app.handle(AppEvent::Tick { now: t0 + Duration::from_secs(2) });
        assert_eq!(app.toasts().count(), 1);
        app.handle(AppEvent::Tick { now: t0 + Duration::from_secs(3) });
        assert_eq!(app.toasts().count(), 0);
    }

    #[test]
    fn toast_count_is_capped() {
        let mut app = app();
        for n in 0..8 {
            app.handle(AppEvent::Toast(Toast::info(format!("t{n}"))));
        }
        let messages: Vec<&str> = app.toasts().map(|t| t.message.as_str()).collect();
        assert_eq!(messages, vec!["t3", "t4", "t5", "t6", "t7"]);
    }

    #[test]
    fn esc_quits() {
        let mut app = app();
        assert_eq!(app.handle(AppEvent::Key(KeyInput::Esc)), vec![AppAction::Quit]);
    }
}
