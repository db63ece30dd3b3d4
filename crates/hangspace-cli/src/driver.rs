//! Command-line driver.
//!
//! Implements the [`Driver`] trait over stdin lines, a WebSocket event
//! channel and the HTTP API. Screen output goes through `tracing`.
//!
//! API requests run on their own tasks; their results come back through
//! the same inbound queue as socket frames.

use std::{
    collections::VecDeque,
    io,
    time::{Duration, Instant},
};

use hangspace_app::{App, AppEvent, Driver, Inbound, KeyInput};
use hangspace_client::{
    RequestId,
    transport::{self, ConnectedChannel, HttpApi, SocketEvent},
};
use hangspace_core::{DropReason, RequestError};
use hangspace_proto::{ApiRequest, Frame};
use serde_json::Value;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::mpsc,
};

use crate::{input::line_to_keys, render::Screen};

/// How long `poll_event` waits before letting the runtime tick.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// CLI driver errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading stdin failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame was sent with no channel open.
    #[error("not connected")]
    NotConnected,

    /// The socket task is gone.
    #[error("channel closed")]
    ChannelClosed,
}

/// A finished API request.
type Completed = (RequestId, Result<Value, RequestError>);

/// What woke `poll_event`.
enum Wake {
    Line(Option<String>),
    Socket(Option<SocketEvent>),
    Response(Option<Completed>),
    Tick,
}

/// Driver for the headless client.
pub struct CliDriver {
    channel_url: String,
    api: HttpApi,
    channel: Option<ConnectedChannel>,
    lines: Lines<BufReader<Stdin>>,
    stdin_open: bool,
    pending: VecDeque<AppEvent<Instant>>,
    inbound: VecDeque<Inbound>,
    responses_tx: mpsc::UnboundedSender<Completed>,
    responses_rx: mpsc::UnboundedReceiver<Completed>,
    search_len: usize,
    screen: Option<Screen>,
}

impl CliDriver {
    /// Driver that opens its channel at `channel_url` and calls `api`.
    pub fn new(channel_url: impl Into<String>, api: HttpApi) -> Self {
        let (responses_tx, responses_rx) = mpsc::unbounded_channel();
        Self {
            channel_url: channel_url.into(),
            api,
            channel: None,
            lines: BufReader::new(tokio::io::stdin()).lines(),
            stdin_open: true,
            pending: VecDeque::new(),
            inbound: VecDeque::new(),
            responses_tx,
            responses_rx,
            search_len: 0,
            screen: None,
        }
    }

    fn drop_channel(&mut self, reason: DropReason) -> Inbound {
        if let Some(channel) = self.channel.take() {
            channel.stop();
        }
        Inbound::Dropped(reason)
    }
}

async fn recv_socket(
    from_server: Option<&mut mpsc::Receiver<SocketEvent>>,
) -> Option<SocketEvent> {
    match from_server {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Driver for CliDriver {
    type Error = CliError;
    type Instant = Instant;

    async fn poll_event(&mut self) -> Result<Option<AppEvent<Instant>>, Self::Error> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        let stdin_open = self.stdin_open;
        let wake = tokio::select! {
            biased;

            line = self.lines.next_line(), if stdin_open => Wake::Line(line?),
            event = recv_socket(self.channel.as_mut().map(|c| &mut c.from_server)) => {
                Wake::Socket(event)
            },
            completed = self.responses_rx.recv() => Wake::Response(completed),
            () = tokio::time::sleep(TICK_INTERVAL) => Wake::Tick,
        };

        match wake {
            Wake::Line(Some(line)) => {
                self.pending.extend(
                    line_to_keys(&line, self.search_len).into_iter().map(AppEvent::Key),
                );
                Ok(self.pending.pop_front())
            },
            Wake::Line(None) => {
                tracing::info!("stdin closed, quitting");
                self.stdin_open = false;
                Ok(Some(AppEvent::Key(KeyInput::Esc)))
            },
            Wake::Socket(Some(SocketEvent::Frame(frame))) => {
                self.inbound.push_back(Inbound::Frame(frame));
                Ok(None)
            },
            Wake::Socket(Some(SocketEvent::Closed(reason))) => {
                let dropped = self.drop_channel(reason);
                self.inbound.push_back(dropped);
                Ok(None)
            },
            Wake::Socket(None) => {
                let dropped = self.drop_channel(DropReason::Network("socket task ended".into()));
                self.inbound.push_back(dropped);
                Ok(None)
            },
            Wake::Response(Some((id, result))) => {
                self.inbound.push_back(Inbound::Response { id, result });
                Ok(None)
            },
            Wake::Response(None) | Wake::Tick => Ok(None),
        }
    }

    async fn open_channel(&mut self, attempt: u32) -> Result<(), String> {
        self.close_channel();
        tracing::info!(attempt, url = %self.channel_url, "opening channel");

        match transport::connect(&self.channel_url).await {
            Ok(channel) => {
                self.channel = Some(channel);
                Ok(())
            },
            Err(err) => {
                tracing::warn!(attempt, %err, "channel open failed");
                Err(err.to_string())
            },
        }
    }

    fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.stop();
        }
        self.inbound.retain(|inbound| matches!(inbound, Inbound::Response { .. }));
    }

    async fn reauthenticate(&mut self) -> Result<(), String> {
        match self.api.execute(&ApiRequest::UnreadCount).await {
            Err(RequestError::Status { code: 401 | 403, message }) => Err(message),
            Err(err) => {
                tracing::warn!(%err, "credential check inconclusive, reconnecting anyway");
                Ok(())
            },
            Ok(_) => Ok(()),
        }
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        let channel = self.channel.as_ref().ok_or(CliError::NotConnected)?;
        channel.to_server.send(frame).await.map_err(|_| CliError::ChannelClosed)
    }

    async fn recv_frame(&mut self) -> Option<Inbound> {
        if let Some(inbound) = self.inbound.pop_front() {
            return Some(inbound);
        }
        if let Ok((id, result)) = self.responses_rx.try_recv() {
            return Some(Inbound::Response { id, result });
        }

        let channel = self.channel.as_mut()?;
        match channel.from_server.try_recv() {
            Ok(SocketEvent::Frame(frame)) => Some(Inbound::Frame(frame)),
            Ok(SocketEvent::Closed(reason)) => Some(self.drop_channel(reason)),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Some(self.drop_channel(DropReason::Network("socket task ended".into())))
            },
        }
    }

    fn submit(&mut self, id: RequestId, request: ApiRequest) {
        let api = self.api.clone();
        let done = self.responses_tx.clone();
        tokio::spawn(async move {
            let result = api.execute(&request).await;
            if done.send((id, result)).is_err() {
                tracing::debug!(%id, "driver gone, dropping api response");
            }
        });
    }

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn render(&mut self, app: &App<Instant>) -> Result<(), Self::Error> {
        self.search_len = app.search_input().chars().count();

        let screen = Screen::capture(app);
        for (section, lines) in screen.changes(self.screen.as_ref()) {
            if lines.is_empty() {
                tracing::info!(target: "hangspace::screen", section, "(empty)");
            }
            for line in lines {
                tracing::info!(target: "hangspace::screen", section, "{line}");
            }
        }
        self.screen = Some(screen);
        Ok(())
    }

    fn stop(&mut self) {
        self.close_channel();
    }
}
