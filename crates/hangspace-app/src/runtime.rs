//! Generic runtime for application orchestration.
//!
//! The Runtime drives the application event loop, coordinating between:
//! - [`App`]: UI state machine
//! - [`Bridge`]: translation layer to the Client
//! - [`Driver`]: Platform-specific I/O

use std::collections::VecDeque;

use hangspace_client::{ClientConfig, ClientEvent, ClientIdentity};
use hangspace_core::{DropReason, env::Environment};

use crate::{App, AppAction, AppConfig, AppEvent, Bridge, Driver, Inbound, TransportCommand};

/// Inbound items handled per cycle so input stays responsive under load.
pub const MAX_INBOUND_PER_CYCLE: usize = 64;

/// Generic runtime that orchestrates App, Bridge, and Driver.
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    app: App<E::Instant>,
    bridge: Bridge<E>,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a new runtime with the given driver and environment.
    pub fn new(
        driver: D,
        env: E,
        identity: ClientIdentity,
        client_config: ClientConfig,
        app_config: AppConfig,
    ) -> Self {
        let bridge = Bridge::new(env, identity, client_config, app_config.utc_offset);
        let app = App::new(app_config);
        Self { driver, app, bridge }
    }

    /// Run the main event loop.
    ///
    /// This is the core orchestration loop that:
    /// 1. Polls for input events from the driver
    /// 2. Receives frames and finished API calls
    /// 3. Ticks the client and the App
    /// 4. Executes transport commands and outgoing frames, and submits API
    ///    requests without waiting for them
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        if !self.start().await? {
            loop {
                let should_quit = self.process_cycle().await?;
                if should_quit {
                    break;
                }
            }
        }

        self.driver.stop();
        Ok(())
    }

    /// Draw the first frame and begin connecting.
    ///
    /// Returns `true` if the application should quit.
    pub async fn start(&mut self) -> Result<bool, D::Error> {
        self.driver.render(&self.app)?;
        let actions = self.app.connect();
        self.apply(actions).await
    }

    /// Process one cycle of the event loop.
    ///
    /// Returns `true` if the application should quit.
    pub async fn process_cycle(&mut self) -> Result<bool, D::Error> {
        if let Some(event) = self.driver.poll_event().await? {
            let actions = self.app.handle(event);
            if self.apply(actions).await? {
                return Ok(true);
            }
        }

        for _ in 0..MAX_INBOUND_PER_CYCLE {
            let Some(inbound) = self.driver.recv_frame().await else {
                break;
            };
            let events = match inbound {
                Inbound::Frame(frame) => self.bridge.handle_frame(frame),
                Inbound::Dropped(reason) => self.bridge.handle_dropped(reason),
                Inbound::Response { id, result } => self.bridge.handle_response(id, result),
            };
            if self.process_bridge_events(events).await? {
                return Ok(true);
            }
        }

        let now = self.driver.now();
        let events = self.bridge.handle_tick(now);
        if self.process_bridge_events(events).await? {
            return Ok(true);
        }

        let actions = self.app.handle(AppEvent::Tick { now });
        self.apply(actions).await
    }

    /// Get a reference to the App
    pub fn app(&self) -> &App<E::Instant> {
        &self.app
    }

    /// Get a mutable reference to the App
    pub fn app_mut(&mut self) -> &mut App<E::Instant> {
        &mut self.app
    }

    /// Get a reference to the Bridge
    pub fn bridge(&self) -> &Bridge<E> {
        &self.bridge
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Process actions returned by the App.
    ///
    /// Returns `true` if should quit. Renders are coalesced into one per
    /// batch.
    async fn apply(&mut self, actions: Vec<AppAction>) -> Result<bool, D::Error> {
        let mut pending: VecDeque<AppAction> = actions.into();
        let mut render = false;

        while let Some(action) = pending.pop_front() {
            match action {
                AppAction::Render => render = true,
                AppAction::Quit => return Ok(true),
                action => {
                    let events = self.bridge.process_app_action(action);
                    for event in events {
                        pending.extend(self.app.handle(event));
                    }
                    for event in self.flush().await? {
                        pending.extend(self.app.handle(event));
                    }
                },
            }
        }

        if render {
            self.driver.render(&self.app)?;
        }
        Ok(false)
    }

    /// Process events from Bridge back to App.
    async fn process_bridge_events(
        &mut self,
        events: Vec<AppEvent<E::Instant>>,
    ) -> Result<bool, D::Error> {
        let mut actions = Vec::new();
        for event in events {
            actions.extend(self.app.handle(event));
        }
        for event in self.flush().await? {
            actions.extend(self.app.handle(event));
        }
        self.apply(actions).await
    }

    /// Execute everything the bridge queued, feeding transport results back
    /// to the client until nothing is left. API requests are only submitted;
    /// their responses arrive through [`Driver::recv_frame`].
    async fn flush(&mut self) -> Result<Vec<AppEvent<E::Instant>>, D::Error> {
        let mut events = Vec::new();

        while self.bridge.has_pending_io() {
            for command in self.bridge.take_commands() {
                let event = match command {
                    TransportCommand::Open { attempt } => {
                        match self.driver.open_channel(attempt).await {
                            Ok(()) => ClientEvent::ChannelOpened,
                            Err(reason) => ClientEvent::ChannelOpenFailed { reason },
                        }
                    },
                    TransportCommand::Close => {
                        self.driver.close_channel();
                        continue;
                    },
                    TransportCommand::Reauthenticate => {
                        ClientEvent::Reauthenticated(self.driver.reauthenticate().await)
                    },
                };
                events.extend(self.bridge.handle_client_event(event));
            }

            for frame in self.bridge.take_outgoing() {
                if let Err(e) = self.driver.send_frame(frame).await {
                    tracing::warn!(error = %e, "send failed, dropping channel");
                    self.driver.close_channel();
                    let reason = DropReason::Network(e.to_string());
                    events.extend(self.bridge.handle_dropped(reason));
                    break;
                }
            }

            for (id, request) in self.bridge.take_requests() {
                tracing::debug!(%id, method = ?request.method(), path = %request.path(), "submit");
                self.driver.submit(id, request);
            }
        }

        Ok(events)
    }
}
