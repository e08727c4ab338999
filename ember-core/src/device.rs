//! The connection manager: one task per device that owns the whole
//! session lifecycle.
//!
//! [`DeviceHandler`] is an actor. Everything that can mutate session
//! state (transport events, caller requests, watchdog ticks,
//! reconnect expiry) arrives on one queue and is processed by one
//! task, so command issuance can never observe a half-updated phase.
//! Callers hold a cloneable [`DeviceHandle`] and get their work
//! scheduled; `connect()` returns as soon as the request is queued.
//!
//! Timer lifecycle is structural: the watchdog and the reconnect
//! timer are [`TimerHandle`]s stored on the actor, and replacing or
//! clearing the slot aborts the underlying task. There is never more
//! than one of each.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::capability::{Dispatch, HandlerTable};
use crate::config::{DeviceConfig, ProtocolTimings};
use crate::error::EmberError;
use crate::message::{
    API_VERSION_MAJOR, API_VERSION_MINOR, HelloRequest, LoginRequest, Message,
};
use crate::network::{Connection, TransportEvent};
use crate::registry::{
    ChannelCommand, ChannelDescriptor, DeviceStatus, EventSink, StatusDetail,
};
use crate::state::ConnectionPhase;

/// Diagnostic for undecodable inbound bytes. The usual culprit is a
/// device configured for an encrypted transport.
const PARSE_ERROR_HINT: &str = "parse error; if link encryption is enabled on the device, \
     disable it: encrypted transports are not supported yet";

// ── Events ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Event {
    /// Caller asked for a connection attempt.
    Connect,
    /// Caller issued a command against one channel.
    Command {
        channel: String,
        command: ChannelCommand,
    },
    /// Caller asked for a deliberate shutdown.
    Shutdown,
    /// Watchdog period elapsed.
    WatchdogTick,
    /// Reconnect backoff elapsed.
    ReconnectDue,
}

#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Stop,
}

// ── TimerHandle ──────────────────────────────────────────────────

/// An owned, cancellable timer task. Dropping the handle aborts the
/// task, so a pending callback that has not started yet never runs.
#[derive(Debug)]
struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Single-shot: enqueue `event` after `delay`.
    fn once(delay: Duration, tx: mpsc::WeakSender<Event>, event: Event) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(event).await;
            }
        });
        Self { task }
    }

    /// Recurring: enqueue `event` every `period`, first firing one
    /// period from now.
    fn interval(period: Duration, tx: mpsc::WeakSender<Event>, event: Event) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(tx) = tx.upgrade() else { return };
                if tx.send(event.clone()).await.is_err() {
                    return;
                }
            }
        });
        Self { task }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ── DeviceHandle ─────────────────────────────────────────────────

/// Cloneable handle to a running [`DeviceHandler`].
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    tx: mpsc::Sender<Event>,
}

impl DeviceHandle {
    /// Trigger a connection attempt. Returns once the request is
    /// queued; the attempt itself runs on the handler task.
    pub async fn connect(&self) -> Result<(), EmberError> {
        Ok(self.tx.send(Event::Connect).await?)
    }

    /// Issue a command against one channel. Dropped with a warning if
    /// the session is not established; no queuing, no retry.
    pub async fn send_command(
        &self,
        channel: impl Into<String>,
        command: ChannelCommand,
    ) -> Result<(), EmberError> {
        Ok(self
            .tx
            .send(Event::Command {
                channel: channel.into(),
                command,
            })
            .await?)
    }

    /// Deliberate shutdown: send a goodbye when connected, release
    /// the transport and timers, and stop the handler task. No
    /// reconnect is scheduled.
    pub async fn disconnect(&self) -> Result<(), EmberError> {
        Ok(self.tx.send(Event::Shutdown).await?)
    }
}

// ── DeviceHandler ────────────────────────────────────────────────

/// The per-device connection manager. Create with [`new`] and drive
/// with [`run`], or use [`spawn`] to do both.
///
/// [`new`]: DeviceHandler::new
/// [`run`]: DeviceHandler::run
/// [`spawn`]: DeviceHandler::spawn
pub struct DeviceHandler {
    config: DeviceConfig,
    timings: ProtocolTimings,
    sink: Arc<dyn EventSink>,
    handlers: HandlerTable,

    phase: ConnectionPhase,
    transport: Option<Connection>,
    /// Last time the device answered a keepalive probe. Only the
    /// pong path and a fresh login write this.
    last_pong: Instant,
    /// Channels accumulated during the current enumeration.
    dynamic_channels: Vec<ChannelDescriptor>,
    /// Channel set as of the last enumeration commit.
    channels: Vec<ChannelDescriptor>,

    watchdog: Option<TimerHandle>,
    reconnect: Option<TimerHandle>,

    events: mpsc::Receiver<Event>,
    /// Weak so that dropping every `DeviceHandle` stops the handler
    /// even while timers are armed.
    timer_tx: mpsc::WeakSender<Event>,
}

impl DeviceHandler {
    pub fn new(config: DeviceConfig, sink: Arc<dyn EventSink>) -> (Self, DeviceHandle) {
        Self::with_timings(config, ProtocolTimings::default(), sink)
    }

    pub fn with_timings(
        config: DeviceConfig,
        timings: ProtocolTimings,
        sink: Arc<dyn EventSink>,
    ) -> (Self, DeviceHandle) {
        let (tx, rx) = mpsc::channel(32);
        let handler = Self {
            config,
            timings,
            sink,
            handlers: HandlerTable::standard(),
            phase: ConnectionPhase::default(),
            transport: None,
            last_pong: Instant::now(),
            dynamic_channels: Vec::new(),
            channels: Vec::new(),
            watchdog: None,
            reconnect: None,
            events: rx,
            timer_tx: tx.downgrade(),
        };
        (handler, DeviceHandle { tx })
    }

    /// Create a handler and run it on a fresh task.
    pub fn spawn(config: DeviceConfig, sink: Arc<dyn EventSink>) -> DeviceHandle {
        Self::spawn_with_timings(config, ProtocolTimings::default(), sink)
    }

    pub fn spawn_with_timings(
        config: DeviceConfig,
        timings: ProtocolTimings,
        sink: Arc<dyn EventSink>,
    ) -> DeviceHandle {
        let (handler, handle) = Self::with_timings(config, timings, sink);
        tokio::spawn(handler.run());
        handle
    }

    /// Drive the session until a deliberate shutdown or until every
    /// handle is dropped.
    pub async fn run(mut self) {
        enum Next {
            Transport(TransportEvent),
            Request(Option<Event>),
        }

        loop {
            let next = tokio::select! {
                event = Self::next_transport_event(&mut self.transport),
                    if self.transport.is_some() => Next::Transport(event),
                request = self.events.recv() => Next::Request(request),
            };
            match next {
                Next::Transport(event) => self.on_transport_event(event).await,
                Next::Request(Some(event)) => {
                    if self.on_event(event).await == Flow::Stop {
                        return;
                    }
                }
                Next::Request(None) => {
                    // Every handle is gone; nobody can ever talk to
                    // this device again through us.
                    self.shutdown().await;
                    return;
                }
            }
        }
    }

    async fn next_transport_event(transport: &mut Option<Connection>) -> TransportEvent {
        match transport {
            Some(conn) => conn.recv().await.unwrap_or(TransportEvent::EndOfStream),
            None => std::future::pending().await,
        }
    }

    // ── Event handling ───────────────────────────────────────────

    async fn on_event(&mut self, event: Event) -> Flow {
        match event {
            Event::Connect => {
                if self.transport.is_some() {
                    debug!("connect requested while a transport is live, restarting");
                    self.teardown_transport();
                }
                self.reconnect = None;
                self.connect().await;
            }
            Event::Command { channel, command } => self.on_command(&channel, command).await,
            Event::WatchdogTick => self.on_watchdog_tick().await,
            Event::ReconnectDue => {
                self.reconnect = None;
                if self.phase.is_uninitialized() && self.transport.is_none() {
                    self.connect().await;
                } else {
                    debug!("reconnect fired while a connection is active, ignoring");
                }
            }
            Event::Shutdown => {
                self.shutdown().await;
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Packet(msg) => self.on_packet(msg).await,
            TransportEvent::EndOfStream => {
                info!("[{}] stream closed by peer", self.config.hostname);
                self.fail(
                    StatusDetail::None,
                    "stream closed by peer",
                    self.timings.short_reconnect_delay,
                );
            }
            TransportEvent::ParseError => {
                warn!("[{}] {PARSE_ERROR_HINT}", self.config.hostname);
                self.fail(
                    StatusDetail::CommunicationError,
                    PARSE_ERROR_HINT,
                    self.timings.short_reconnect_delay,
                );
            }
        }
    }

    /// Single entry point for all inbound traffic, dispatched purely
    /// on the current phase.
    async fn on_packet(&mut self, msg: Message) {
        match self.phase {
            ConnectionPhase::Uninitialized => {
                warn!(
                    kind = %msg.kind(),
                    "[{}] received packet while uninitialized, dropping",
                    self.config.hostname
                );
            }
            ConnectionPhase::HelloSent => self.on_hello_phase(msg).await,
            ConnectionPhase::LoginSent => self.on_login_phase(msg).await,
            ConnectionPhase::Connected { .. } => self.on_connected(msg).await,
        }
    }

    async fn on_hello_phase(&mut self, msg: Message) {
        let Message::HelloResponse(rsp) = &msg else {
            debug!(
                kind = %msg.kind(),
                "ignoring message while awaiting greeting acknowledgement"
            );
            return;
        };
        info!(
            "[{}] device {} running {} on protocol {}.{}",
            self.config.hostname,
            rsp.name,
            rsp.server_info,
            rsp.api_version_major,
            rsp.api_version_minor
        );
        if let Err(e) = self.phase.login_sent() {
            warn!("phase error: {e}");
        }
        let login = Message::LoginRequest(LoginRequest {
            password: self.config.password.clone().unwrap_or_default(),
        });
        if let Err(e) = self.send(login).await {
            warn!("[{}] failed to send login: {e}", self.config.hostname);
            self.fail(
                StatusDetail::CommunicationError,
                &e.to_string(),
                self.timings.reconnect_delay,
            );
        }
    }

    async fn on_login_phase(&mut self, msg: Message) {
        let Message::LoginResponse(rsp) = &msg else {
            debug!(kind = %msg.kind(), "ignoring message while awaiting login result");
            return;
        };
        if rsp.invalid_password {
            error!("[{}] device rejected the configured password", self.config.hostname);
            // Needs user action, but keep retrying so that a fixed
            // password takes effect without a restart.
            self.fail(
                StatusDetail::ConfigurationError,
                "invalid password",
                self.timings.reconnect_delay,
            );
            return;
        }

        if let Err(e) = self.phase.login_accepted() {
            warn!("phase error: {e}");
        }
        self.sink
            .update_status(DeviceStatus::Online, StatusDetail::None, "connected");
        self.last_pong = Instant::now();
        self.start_watchdog();

        for request in [Message::DeviceInfoRequest, Message::ListEntitiesRequest] {
            if let Err(e) = self.send(request).await {
                warn!("[{}] bootstrap request failed: {e}", self.config.hostname);
                self.fail(
                    StatusDetail::CommunicationError,
                    &e.to_string(),
                    self.timings.reconnect_delay,
                );
                return;
            }
        }
    }

    /// Steady state: protocol housekeeping inline, everything else
    /// through the handler table.
    async fn on_connected(&mut self, msg: Message) {
        match msg {
            Message::DeviceInfoResponse(rsp) => {
                let mut props = HashMap::new();
                props.insert("name".to_string(), rsp.name);
                props.insert("mac_address".to_string(), rsp.mac_address);
                props.insert("model".to_string(), rsp.model);
                props.insert("manufacturer".to_string(), rsp.manufacturer);
                props.insert("firmware_version".to_string(), rsp.firmware_version);
                props.insert("compiled_at".to_string(), rsp.compiled_at);
                self.sink.replace_properties(props);
            }
            Message::ListEntitiesDone => {
                // Repeated enumeration-done re-commits: the sink's
                // replace is atomic, so this is deterministic.
                self.channels = self.dynamic_channels.clone();
                self.sink.replace_channels(&self.channels);
                debug!(
                    count = self.channels.len(),
                    "[{}] channel set committed", self.config.hostname
                );
                if let Err(e) = self.send(Message::SubscribeStatesRequest).await {
                    warn!("[{}] failed to subscribe to states: {e}", self.config.hostname);
                    self.fail(
                        StatusDetail::CommunicationError,
                        &e.to_string(),
                        self.timings.short_reconnect_delay,
                    );
                }
            }
            Message::PingRequest => {
                debug!("[{}] responding to ping request", self.config.hostname);
                if let Err(e) = self.send(Message::PingResponse).await {
                    warn!("[{}] failed to answer ping: {e}", self.config.hostname);
                }
            }
            Message::PingResponse => {
                debug!("[{}] received ping response", self.config.hostname);
                self.last_pong = Instant::now();
            }
            Message::DisconnectRequest => {
                let _ = self.send(Message::DisconnectResponse).await;
                let delay = self.timings.short_reconnect_delay;
                info!(
                    "[{}] device requested disconnect, reconnecting in {delay:?}",
                    self.config.hostname
                );
                self.fail(
                    StatusDetail::None,
                    &format!(
                        "device requested disconnect; reconnecting in {}s",
                        delay.as_secs()
                    ),
                    delay,
                );
            }
            Message::DisconnectResponse => {
                // Our own goodbye was acknowledged; just release the
                // transport.
                self.teardown_transport();
            }
            other => match self.handlers.dispatch(&other) {
                Dispatch::Channels(mut channels) => {
                    debug!(
                        count = channels.len(),
                        kind = %other.kind(),
                        "registered channels from entity definition"
                    );
                    self.dynamic_channels.append(&mut channels);
                }
                Dispatch::States(updates) => {
                    for update in updates {
                        self.sink.update_state(&update.channel, update.state);
                    }
                }
                Dispatch::Unrouted => {
                    warn!(
                        kind = %other.kind(),
                        "[{}] unsupported message kind, ignoring",
                        self.config.hostname
                    );
                }
            },
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    async fn on_command(&mut self, channel: &str, command: ChannelCommand) {
        if !self.phase.is_connected() {
            warn!(
                %channel,
                "[{}] not connected, ignoring command {command:?}",
                self.config.hostname
            );
            return;
        }

        if command == ChannelCommand::Refresh {
            if let Err(e) = self.send(Message::SubscribeStatesRequest).await {
                error!("[{}] failed to refresh states: {e}", self.config.hostname);
            }
            return;
        }

        let Some(descriptor) = self.channels.iter().find(|c| c.id == channel).cloned() else {
            warn!(%channel, "[{}] command for unknown channel", self.config.hostname);
            return;
        };

        match self
            .handlers
            .encode(descriptor.capability, &descriptor, &command, descriptor.key)
        {
            Ok(msg) => {
                if let Err(e) = self.send(msg).await {
                    error!(
                        %channel,
                        "[{}] failed to send command: {e}", self.config.hostname
                    );
                }
            }
            Err(e) => warn!(%channel, "cannot encode command: {e}"),
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────

    async fn connect(&mut self) {
        if self.config.hostname.is_empty() {
            self.sink.update_status(
                DeviceStatus::Offline,
                StatusDetail::ConfigurationError,
                "no hostname configured",
            );
            return;
        }

        self.dynamic_channels.clear();
        self.handlers.reset();

        let host = self.config.hostname.clone();
        let port = self.config.port;
        info!("[{host}] trying to connect to {host}:{port}");
        self.sink.update_status(
            DeviceStatus::Unknown,
            StatusDetail::None,
            &format!("connecting to {host}:{port}"),
        );

        match Connection::open(&host, port, self.timings.connect_timeout).await {
            Ok(conn) => {
                self.transport = Some(conn);
                if let Err(e) = self.phase.hello_sent() {
                    warn!("phase error: {e}");
                }
                let hello = Message::HelloRequest(HelloRequest {
                    client_info: self.config.client_info.clone(),
                    api_version_major: API_VERSION_MAJOR,
                    api_version_minor: API_VERSION_MINOR,
                });
                if let Err(e) = self.send(hello).await {
                    warn!("[{host}] failed to send greeting: {e}");
                    self.fail(
                        StatusDetail::CommunicationError,
                        &e.to_string(),
                        self.timings.reconnect_delay,
                    );
                }
            }
            Err(e) => {
                warn!("[{host}] error on initial connection: {e}");
                self.sink.update_status(
                    DeviceStatus::Offline,
                    StatusDetail::CommunicationError,
                    &e.to_string(),
                );
                self.arm_reconnect(self.timings.reconnect_delay);
            }
        }
    }

    async fn send(&self, msg: Message) -> Result<(), EmberError> {
        match &self.transport {
            Some(conn) => conn.send(msg).await,
            None => Err(EmberError::Api("no open connection".to_string())),
        }
    }

    fn start_watchdog(&mut self) {
        // Replacing the slot aborts any previous watchdog.
        self.watchdog = Some(TimerHandle::interval(
            self.timings.ping_interval,
            self.timer_tx.clone(),
            Event::WatchdogTick,
        ));
    }

    async fn on_watchdog_tick(&mut self) {
        if !self.phase.is_connected() {
            // Stale tick from a watchdog cancelled after the event
            // was already queued.
            return;
        }
        let deadline = self.timings.liveness_deadline();
        if self.last_pong.elapsed() > deadline {
            warn!(
                "[{}] no ping response for {deadline:?}, assuming the connection is lost",
                self.config.hostname
            );
            self.fail(
                StatusDetail::CommunicationError,
                &format!(
                    "device did not answer {} keepalive probes",
                    self.timings.max_missed_pings
                ),
                self.timings.short_reconnect_delay,
            );
        } else {
            debug!("[{}] sending ping", self.config.hostname);
            if let Err(e) = self.send(Message::PingRequest).await {
                // Transient; the missed-probe accounting catches a
                // dead link on a later tick.
                warn!("[{}] failed to send ping: {e}", self.config.hostname);
            }
        }
    }

    /// Close the transport, cancel the watchdog and collapse the
    /// phase, in that order. Safe to call repeatedly.
    fn teardown_transport(&mut self) {
        self.transport = None;
        self.watchdog = None;
        self.phase.reset();
    }

    /// The shared teardown-and-reconnect path every recoverable
    /// failure funnels through.
    fn fail(&mut self, detail: StatusDetail, message: &str, delay: Duration) {
        self.teardown_transport();
        self.sink
            .update_status(DeviceStatus::Offline, detail, message);
        self.arm_reconnect(delay);
    }

    fn arm_reconnect(&mut self, delay: Duration) {
        if self.reconnect.is_some() {
            debug!("reconnect already scheduled, not scheduling another");
            return;
        }
        debug!("scheduling reconnect in {delay:?}");
        self.reconnect = Some(TimerHandle::once(
            delay,
            self.timer_tx.clone(),
            Event::ReconnectDue,
        ));
    }

    async fn shutdown(&mut self) {
        self.reconnect = None;
        if self.phase.is_connected() {
            if let Err(e) = self.send(Message::DisconnectRequest).await {
                debug!("goodbye failed: {e}");
            }
        }
        self.teardown_transport();
        info!("[{}] device handler stopped", self.config.hostname);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChannelState;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        statuses: Mutex<Vec<(DeviceStatus, StatusDetail, String)>>,
    }

    impl EventSink for RecordingSink {
        fn update_status(&self, status: DeviceStatus, detail: StatusDetail, message: &str) {
            self.statuses
                .lock()
                .unwrap()
                .push((status, detail, message.to_string()));
        }
        fn replace_properties(&self, _properties: HashMap<String, String>) {}
        fn replace_channels(&self, _channels: &[ChannelDescriptor]) {}
        fn update_state(&self, _channel: &str, _state: ChannelState) {}
    }

    #[tokio::test]
    async fn empty_hostname_is_a_configuration_error() {
        let sink = Arc::new(RecordingSink::default());
        let handle = DeviceHandler::spawn(DeviceConfig::new(""), sink.clone());
        handle.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let statuses = sink.statuses.lock().unwrap();
        assert!(statuses.iter().any(|(s, d, _)| *s == DeviceStatus::Offline
            && *d == StatusDetail::ConfigurationError));
    }

    #[tokio::test]
    async fn command_before_connect_is_dropped_silently() {
        let sink = Arc::new(RecordingSink::default());
        let handle = DeviceHandler::spawn(DeviceConfig::new("device.local"), sink.clone());
        handle
            .send_command("relay", ChannelCommand::OnOff(true))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // No connect was requested, so nothing should have happened.
        assert!(sink.statuses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_handler() {
        let sink = Arc::new(RecordingSink::default());
        let (handler, handle) = DeviceHandler::new(DeviceConfig::new("device.local"), sink);
        let task = tokio::spawn(handler.run());
        drop(handle);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("handler did not stop")
            .unwrap();
    }
}
