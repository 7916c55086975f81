//! RTE client
//!
//! [`RteClient`] ties a protocol engine, the telnet connection and the wait
//! machinery together. Session state lives behind one mutex that is held both
//! when the reader thread applies a host record and while listeners evaluate
//! the resulting events, so a waiter always sees the state that came with the
//! event it handles.
//!
//! Lock order is connection, then session state, then waiter state. Timer
//! callbacks only take waiter locks, and the reader thread never takes the
//! connection lock.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ConnectionError, RteError, RteResult};
use crate::input::Input;
use crate::keyboard::AttentionKey;
use crate::network::{ConnectOptions, RecordSink, TelnetConnection};
use crate::position::Position;
use crate::protocol::{Protocol, SecurityMode, TerminalType};
use crate::protocol_common::{EngineUpdate, TerminalEngine};
use crate::screen::Screen;
use crate::wait::{
    self, Feed, ListenerRegistry, SessionListener, SessionView, SyncWaitCondition, TimerService,
    WaitCondition,
};

struct SessionState {
    engine: Option<Box<dyn TerminalEngine>>,
    terminal_type: TerminalType,
    screen: Screen,
    cursor: Option<Position>,
    keyboard_locked: bool,
    alarm: bool,
    connected: bool,
    /// Live waiters, in registration order
    listeners: Vec<Arc<dyn SessionListener>>,
    /// Fault from the reader thread that no waiter was there to receive
    pending_fault: Option<RteError>,
}

impl SessionState {
    fn new(terminal_type: TerminalType) -> Self {
        Self {
            engine: None,
            terminal_type,
            screen: Screen::new(terminal_type.rows, terminal_type.columns),
            cursor: None,
            keyboard_locked: true,
            alarm: false,
            connected: false,
            listeners: Vec::new(),
            pending_fault: None,
        }
    }

    fn view(&self) -> SessionView<'_> {
        SessionView {
            screen: &self.screen,
            cursor: self.cursor,
            keyboard_locked: self.keyboard_locked,
        }
    }

    /// Pull engine state after `update` and return the feeds to notify
    fn apply(&mut self, update: &EngineUpdate) -> Vec<Feed> {
        let mut feeds = Vec::new();
        let Some(engine) = self.engine.as_ref() else {
            return feeds;
        };
        if update.screen_changed {
            self.screen = engine.screen();
            feeds.push(Feed::Screen);
        }
        let cursor = engine.cursor();
        if update.cursor_moved || cursor != self.cursor {
            self.cursor = cursor;
            feeds.push(Feed::Cursor);
        }
        let locked = engine.keyboard_locked();
        if update.keyboard_locked.is_some() || locked != self.keyboard_locked {
            self.keyboard_locked = locked;
            feeds.push(Feed::Keyboard);
        }
        if update.alarm {
            debug!("host sounded the alarm");
            self.alarm = true;
        }
        feeds
    }

    fn dispatch(&self, feeds: &[Feed]) {
        let view = self.view();
        for feed in feeds {
            for listener in self.listeners.iter().filter(|l| l.interested_in(*feed)) {
                listener.on_event(*feed, &view);
            }
        }
    }

    fn fail_listeners(&self, error: &RteError) {
        for listener in &self.listeners {
            listener.on_failure(error);
        }
    }

    /// Hand `error` to the live waiters, or keep it for the next caller
    fn relay_fault(&mut self, error: RteError) {
        if self.listeners.is_empty() {
            self.pending_fault = Some(error);
        } else {
            self.fail_listeners(&error);
        }
    }

    fn take_pending_fault(&mut self) -> RteResult<()> {
        match self.pending_fault.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// The half of the client the reader thread talks to
struct ClientShared {
    state: Mutex<SessionState>,
    next_listener_id: AtomicU64,
}

impl ClientShared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSink for ClientShared {
    fn on_record(&self, record: Vec<u8>) -> Vec<Vec<u8>> {
        let mut state = self.lock();
        if !state.connected {
            return Vec::new();
        }
        let Some(engine) = state.engine.as_mut() else {
            return Vec::new();
        };
        match engine.process_record(&record) {
            Ok(mut update) => {
                let replies = std::mem::take(&mut update.replies);
                let feeds = state.apply(&update);
                state.dispatch(&feeds);
                replies
            }
            Err(e) => {
                warn!("Could not process {} byte host record: {}", record.len(), e);
                // The engine may have applied part of the record
                let partial = EngineUpdate {
                    screen_changed: true,
                    ..EngineUpdate::default()
                };
                let feeds = state.apply(&partial);
                state.dispatch(&feeds);
                state.relay_fault(RteError::from(e));
                Vec::new()
            }
        }
    }

    fn on_closed(&self, reason: String) {
        let mut state = self.lock();
        if !state.connected {
            return;
        }
        info!("Connection lost: {}", reason);
        state.connected = false;
        state.fail_listeners(&RteError::Connection(ConnectionError::Closed { reason }));
    }
}

impl ListenerRegistry for ClientShared {
    fn register(&self, listener: Arc<dyn SessionListener>) -> RteResult<()> {
        let mut state = self.lock();
        if !state.connected {
            return Err(ConnectionError::NotConnected.into());
        }
        state.take_pending_fault()?;
        listener.on_registered(&state.view());
        state.listeners.push(listener);
        Ok(())
    }

    fn unregister(&self, id: u64) {
        self.lock().listeners.retain(|listener| listener.id() != id);
    }

    fn next_listener_id(&self) -> u64 {
        self.next_listener_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// A terminal emulation client for one protocol dialect
///
/// All methods take `&self`; screen reads may run on other threads while one
/// thread is blocked in [`RteClient::await_conditions`].
pub struct RteClient {
    protocol: Protocol,
    shared: Arc<ClientShared>,
    connection: Mutex<Option<TelnetConnection>>,
    timers: TimerService,
    ca_bundle: Option<PathBuf>,
}

impl RteClient {
    pub fn new(protocol: Protocol) -> RteResult<Self> {
        let timers = TimerService::new().map_err(|e| RteError::InternalFault {
            context: "timer service".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            protocol,
            shared: Arc::new(ClientShared {
                state: Mutex::new(SessionState::new(protocol.default_terminal_type())),
                next_listener_id: AtomicU64::new(1),
            }),
            connection: Mutex::new(None),
            timers,
            ca_bundle: None,
        })
    }

    /// Trust the CA certificates in `path` for TLS sessions
    pub fn with_ca_bundle(mut self, path: impl AsRef<Path>) -> Self {
        self.ca_bundle = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn terminal_type(&self) -> TerminalType {
        self.shared.lock().terminal_type
    }

    /// Connect and wait until the host unlocks the keyboard for
    /// `stable_timeout_millis`. On failure the connection is closed again.
    pub fn connect(
        &self,
        host: &str,
        port: u16,
        security: SecurityMode,
        terminal_type: TerminalType,
        timeout_millis: u64,
        stable_timeout_millis: u64,
    ) -> RteResult<()> {
        if self.protocol.terminal_type_by_id(terminal_type.id).is_none() {
            return Err(RteError::UnsupportedOperation {
                operation: format!("terminal type {} for {}", terminal_type.id, self.protocol),
            });
        }
        self.disconnect();

        {
            let mut state = self.shared.lock();
            *state = SessionState::new(terminal_type);
            let engine = self.protocol.create_engine(terminal_type);
            state.screen = engine.screen();
            state.cursor = engine.cursor();
            state.keyboard_locked = engine.keyboard_locked();
            state.engine = Some(engine);
            state.connected = true;
        }

        let options = ConnectOptions {
            host,
            port,
            security,
            terminal_type,
            timeout: Duration::from_millis(timeout_millis),
            ca_bundle: self.ca_bundle.as_deref(),
        };
        let sink: Arc<dyn RecordSink> = self.shared.clone();
        match TelnetConnection::connect(&options, sink) {
            Ok(connection) => *self.lock_connection() = Some(connection),
            Err(e) => {
                self.shared.lock().connected = false;
                return Err(e.into());
            }
        }

        let ready: WaitCondition = SyncWaitCondition::new(timeout_millis, stable_timeout_millis).into();
        if let Err(e) = self.await_conditions(&[ready]) {
            warn!("{}:{} did not present a usable screen: {}", host, port, e);
            self.disconnect();
            return Err(e);
        }
        info!("Session with {}:{} ready", host, port);
        Ok(())
    }

    pub fn connect_with_config(&self, config: &ClientConfig) -> RteResult<()> {
        if config.protocol != self.protocol {
            return Err(RteError::UnsupportedOperation {
                operation: format!("{} configuration on a {} client", config.protocol, self.protocol),
            });
        }
        let terminal_type = config
            .resolve_terminal_type()
            .map_err(|e| RteError::UnsupportedOperation { operation: e.to_string() })?;
        self.connect(
            &config.host,
            config.port,
            config.security,
            terminal_type,
            config.connect_timeout_millis,
            config.stable_timeout_millis,
        )
    }

    /// Build a client for `config`, picking up its CA bundle
    pub fn from_config(config: &ClientConfig) -> RteResult<Self> {
        let client = Self::new(config.protocol)?;
        Ok(match &config.ca_bundle {
            Some(path) => client.with_ca_bundle(path),
            None => client,
        })
    }

    /// Close the session. Never fails; pending waits resolve with a
    /// connection error.
    pub fn disconnect(&self) {
        let connection = self.lock_connection().take();
        if let Some(mut connection) = connection {
            connection.close();
        }
        let mut state = self.shared.lock();
        if state.connected {
            state.connected = false;
            state.fail_listeners(&RteError::Connection(ConnectionError::Closed {
                reason: "disconnected".to_string(),
            }));
            info!("Disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// Fill `inputs` and press `key`
    ///
    /// Every input is resolved against the current field layout before
    /// anything is written, so an addressing error leaves the host untouched.
    pub fn send(&self, inputs: &[Input], key: AttentionKey) -> RteResult<()> {
        // Held throughout so the session is only changed for a live connection
        let connection = self.lock_connection();
        let record = {
            let mut state = self.shared.lock();
            if !state.connected {
                return Err(ConnectionError::NotConnected.into());
            }
            state.take_pending_fault()?;
            let supported = state
                .engine
                .as_ref()
                .map(|engine| engine.supports_key(key))
                .ok_or(ConnectionError::NotConnected)?;
            if !supported {
                return Err(RteError::UnsupportedOperation {
                    operation: format!("attention key {} on {}", key, self.protocol),
                });
            }

            let mut targets = Vec::with_capacity(inputs.len());
            for input in inputs {
                let field = match input {
                    Input::Coord(coord) => state
                        .screen
                        .editable_field_at(coord.position)
                        .ok_or(RteError::InvalidFieldPosition { position: coord.position })?,
                    Input::Label(label) => state
                        .screen
                        .field_for_label(&label.label)
                        .ok_or_else(|| RteError::InvalidFieldLabel { label: label.label.clone() })?,
                };
                targets.push((field.start, input.value()));
            }

            match connection.as_ref() {
                None => return Err(ConnectionError::NotConnected.into()),
                Some(connection) if !connection.is_open() => {
                    return Err(ConnectionError::Closed {
                        reason: "connection is closed".to_string(),
                    }
                    .into())
                }
                Some(_) => {}
            }

            let engine = state.engine.as_mut().ok_or(ConnectionError::NotConnected)?;
            for (start, value) in targets {
                engine.fill_field(start, value)?;
            }
            let record = engine.attention(key)?;
            state.alarm = false;

            let update = EngineUpdate {
                screen_changed: true,
                cursor_moved: false,
                keyboard_locked: Some(true),
                alarm: false,
                replies: Vec::new(),
            };
            let feeds = state.apply(&update);
            state.dispatch(&feeds);
            record
        };

        debug!("Sending {} with {} input(s)", key, inputs.len());
        let connection = connection.as_ref().ok_or(ConnectionError::NotConnected)?;
        connection.send_record(&record)?;
        Ok(())
    }

    /// Block until every condition has held for its stable period
    ///
    /// Fails with the first timeout or fault any condition reports.
    pub fn await_conditions(&self, conditions: &[WaitCondition]) -> RteResult<()> {
        wait::await_all(conditions, self.shared.as_ref(), &self.timers.handle())
    }

    pub fn screen(&self) -> Screen {
        self.shared.lock().screen.clone()
    }

    pub fn cursor_position(&self) -> Option<Position> {
        self.shared.lock().cursor
    }

    /// True once the host asked for the alarm since the last `send`
    pub fn sound_alarm(&self) -> bool {
        self.shared.lock().alarm
    }

    pub fn is_input_inhibited(&self) -> bool {
        self.shared.lock().keyboard_locked
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<TelnetConnection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RteClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
