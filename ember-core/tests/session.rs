//! Integration tests for the full connection lifecycle.
//!
//! Each test spins up a scripted fake device on a loopback
//! `TcpListener`, drives the real `DeviceHandler` against it, and
//! asserts on both sides: the messages the device observes and the
//! events the host-side sink records. Timings are shrunk to
//! milliseconds so the watchdog and reconnect paths run quickly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::Framed;

use ember_core::message::{
    DeviceInfoResponse, HelloResponse, LoginResponse, SwitchDefinition, SwitchState,
};
use ember_core::{
    ChannelCommand, ChannelDescriptor, ChannelState, DeviceConfig, DeviceHandler, DeviceStatus,
    EmberCodec, EventSink, Message, ProtocolTimings, StatusDetail,
};

type Wire = Framed<TcpStream, EmberCodec>;

const WAIT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Fake device
// ---------------------------------------------------------------------------

/// Bind a fake device on an OS-chosen loopback port and return the
/// listener plus a config pointing at it.
async fn bind_device() -> (TcpListener, DeviceConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut config = DeviceConfig::new("127.0.0.1");
    config.port = port;
    (listener, config)
}

async fn accept(listener: &TcpListener) -> Wire {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("no connection within deadline")
        .expect("accept failed");
    Framed::new(stream, EmberCodec)
}

async fn expect_message(wire: &mut Wire) -> Message {
    timeout(WAIT, wire.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended unexpectedly")
        .expect("decode failed")
}

async fn expect_end_of_stream(wire: &mut Wire) {
    loop {
        match timeout(WAIT, wire.next())
            .await
            .expect("timed out waiting for the stream to end")
        {
            None => return,
            Some(Ok(Message::PingRequest)) => continue,
            Some(other) => panic!("unexpected traffic before close: {other:?}"),
        }
    }
}

async fn expect_silence(wire: &mut Wire, window: Duration) {
    if let Ok(event) = timeout(window, wire.next()).await {
        panic!("expected silence, got {event:?}");
    }
}

async fn reply(wire: &mut Wire, msg: Message) {
    wire.send(msg).await.expect("device send failed");
}

/// Drive the device side of the handshake up to and including the
/// two bootstrap requests.
async fn complete_handshake(wire: &mut Wire, expected_password: &str) {
    match expect_message(wire).await {
        Message::HelloRequest(hello) => {
            assert_eq!(hello.api_version_major, 1);
            assert_eq!(hello.api_version_minor, 7);
        }
        other => panic!("expected greeting, got {other:?}"),
    }
    reply(
        wire,
        Message::HelloResponse(HelloResponse {
            name: "greenhouse".into(),
            server_info: "ember 2.4.1".into(),
            api_version_major: 1,
            api_version_minor: 7,
        }),
    )
    .await;

    match expect_message(wire).await {
        Message::LoginRequest(login) => assert_eq!(login.password, expected_password),
        other => panic!("expected login, got {other:?}"),
    }
    reply(
        wire,
        Message::LoginResponse(LoginResponse {
            invalid_password: false,
        }),
    )
    .await;

    // Exactly two bootstrap requests, in this order.
    assert!(matches!(
        expect_message(wire).await,
        Message::DeviceInfoRequest
    ));
    assert!(matches!(
        expect_message(wire).await,
        Message::ListEntitiesRequest
    ));
}

/// Announce one switch entity and finish enumeration; consumes the
/// state subscription that follows the commit.
async fn announce_switch(wire: &mut Wire, key: u32) {
    reply(
        wire,
        Message::SwitchDefinition(SwitchDefinition {
            object_id: "relay".into(),
            key,
            name: "Relay".into(),
            icon: String::new(),
        }),
    )
    .await;
    reply(wire, Message::ListEntitiesDone).await;
    assert!(matches!(
        expect_message(wire).await,
        Message::SubscribeStatesRequest
    ));
}

// ---------------------------------------------------------------------------
// Recording sink
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSink {
    statuses: Mutex<Vec<(DeviceStatus, StatusDetail, String)>>,
    properties: Mutex<Vec<HashMap<String, String>>>,
    commits: Mutex<Vec<Vec<ChannelDescriptor>>>,
    states: Mutex<Vec<(String, ChannelState)>>,
}

impl EventSink for RecordingSink {
    fn update_status(&self, status: DeviceStatus, detail: StatusDetail, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push((status, detail, message.to_string()));
    }

    fn replace_properties(&self, properties: HashMap<String, String>) {
        self.properties.lock().unwrap().push(properties);
    }

    fn replace_channels(&self, channels: &[ChannelDescriptor]) {
        self.commits.lock().unwrap().push(channels.to_vec());
    }

    fn update_state(&self, channel: &str, state: ChannelState) {
        self.states
            .lock()
            .unwrap()
            .push((channel.to_string(), state));
    }
}

impl RecordingSink {
    fn has_status(&self, status: DeviceStatus, detail: StatusDetail) -> bool {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .any(|(s, d, _)| *s == status && *d == detail)
    }

    fn count_status(&self, status: DeviceStatus, detail: StatusDetail) -> usize {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, d, _)| *s == status && *d == detail)
            .count()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn fast_timings() -> ProtocolTimings {
    ProtocolTimings {
        ping_interval: Duration::from_millis(40),
        max_missed_pings: 4,
        connect_timeout: Duration::from_secs(2),
        reconnect_delay: Duration::from_millis(150),
        short_reconnect_delay: Duration::from_millis(60),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_reaches_connected_and_bootstraps() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    complete_handshake(&mut wire, "").await;

    reply(
        &mut wire,
        Message::DeviceInfoResponse(DeviceInfoResponse {
            name: "greenhouse".into(),
            mac_address: "AA:BB:CC:DD:EE:FF".into(),
            model: "ember-s3".into(),
            manufacturer: "Acme".into(),
            firmware_version: "2.4.1".into(),
            compiled_at: "Jan 11 2026".into(),
        }),
    )
    .await;
    announce_switch(&mut wire, 7).await;

    reply(
        &mut wire,
        Message::SwitchState(SwitchState {
            key: 7,
            state: true,
        }),
    )
    .await;

    wait_until(|| sink.has_status(DeviceStatus::Online, StatusDetail::None)).await;
    wait_until(|| !sink.states.lock().unwrap().is_empty()).await;

    let properties = sink.properties.lock().unwrap();
    assert_eq!(properties.len(), 1);
    assert_eq!(
        properties[0].get("firmware_version").map(String::as_str),
        Some("2.4.1")
    );

    let commits = sink.commits.lock().unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].len(), 1);
    assert_eq!(commits[0][0].id, "relay");

    let states = sink.states.lock().unwrap();
    assert_eq!(states[0], ("relay".to_string(), ChannelState::OnOff(true)));
}

#[tokio::test]
async fn login_carries_the_configured_password() {
    let (listener, mut config) = bind_device().await;
    config.password = Some("hunter2".into());
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    complete_handshake(&mut wire, "hunter2").await;
    wait_until(|| sink.has_status(DeviceStatus::Online, StatusDetail::None)).await;
}

#[tokio::test]
async fn invalid_password_reports_configuration_error_and_retries() {
    let (listener, mut config) = bind_device().await;
    config.password = Some("wrong".into());
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    match expect_message(&mut wire).await {
        Message::HelloRequest(_) => {}
        other => panic!("expected greeting, got {other:?}"),
    }
    reply(
        &mut wire,
        Message::HelloResponse(HelloResponse {
            name: "greenhouse".into(),
            server_info: "ember 2.4.1".into(),
            api_version_major: 1,
            api_version_minor: 7,
        }),
    )
    .await;
    assert!(matches!(
        expect_message(&mut wire).await,
        Message::LoginRequest(_)
    ));
    reply(
        &mut wire,
        Message::LoginResponse(LoginResponse {
            invalid_password: true,
        }),
    )
    .await;

    // The client closes without issuing any bootstrap request...
    match timeout(WAIT, wire.next()).await.expect("no close observed") {
        None => {}
        Some(other) => panic!("unexpected message after rejected login: {other:?}"),
    }
    wait_until(|| sink.has_status(DeviceStatus::Offline, StatusDetail::ConfigurationError)).await;

    // ...but still retries after the long delay, so a corrected
    // password would take effect without a restart.
    let mut second = accept(&listener).await;
    assert!(matches!(
        expect_message(&mut second).await,
        Message::HelloRequest(_)
    ));
}

#[tokio::test]
async fn switch_command_round_trips() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    complete_handshake(&mut wire, "").await;
    announce_switch(&mut wire, 7).await;
    wait_until(|| !sink.commits.lock().unwrap().is_empty()).await;

    handle
        .send_command("relay", ChannelCommand::OnOff(true))
        .await
        .unwrap();

    match expect_message(&mut wire).await {
        Message::SwitchCommand(cmd) => {
            assert_eq!(cmd.key, 7);
            assert!(cmd.state);
        }
        other => panic!("expected switch command, got {other:?}"),
    }
}

#[tokio::test]
async fn refresh_command_reissues_the_state_subscription() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    complete_handshake(&mut wire, "").await;
    announce_switch(&mut wire, 7).await;
    wait_until(|| !sink.commits.lock().unwrap().is_empty()).await;

    handle
        .send_command("relay", ChannelCommand::Refresh)
        .await
        .unwrap();
    assert!(matches!(
        expect_message(&mut wire).await,
        Message::SubscribeStatesRequest
    ));
}

#[tokio::test]
async fn command_while_handshaking_is_dropped() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    assert!(matches!(
        expect_message(&mut wire).await,
        Message::HelloRequest(_)
    ));

    // The device has not acknowledged the greeting; the phase is not
    // Connected, so the command must vanish without a transmission.
    handle
        .send_command("relay", ChannelCommand::OnOff(true))
        .await
        .unwrap();
    expect_silence(&mut wire, Duration::from_millis(150)).await;
}

#[tokio::test]
async fn ping_requests_are_answered() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    complete_handshake(&mut wire, "").await;

    reply(&mut wire, Message::PingRequest).await;
    loop {
        // The client's own watchdog probes may interleave here.
        match expect_message(&mut wire).await {
            Message::PingResponse => break,
            Message::PingRequest => continue,
            other => panic!("expected ping response, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn watchdog_forces_reconnect_after_missed_pongs() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    complete_handshake(&mut wire, "").await;
    wait_until(|| sink.has_status(DeviceStatus::Online, StatusDetail::None)).await;

    // Never answer a single probe: the client must give up after the
    // missed-probe deadline and close.
    expect_end_of_stream(&mut wire).await;
    wait_until(|| sink.has_status(DeviceStatus::Offline, StatusDetail::CommunicationError)).await;

    // One reconnect, on the short delay.
    let mut second = accept(&listener).await;
    assert!(matches!(
        expect_message(&mut second).await,
        Message::HelloRequest(_)
    ));
    assert_eq!(
        sink.count_status(DeviceStatus::Offline, StatusDetail::CommunicationError),
        1
    );
}

#[tokio::test]
async fn end_of_stream_schedules_a_reconnect() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    complete_handshake(&mut wire, "").await;
    wait_until(|| sink.has_status(DeviceStatus::Online, StatusDetail::None)).await;

    drop(wire);
    wait_until(|| sink.has_status(DeviceStatus::Offline, StatusDetail::None)).await;

    let mut second = accept(&listener).await;
    assert!(matches!(
        expect_message(&mut second).await,
        Message::HelloRequest(_)
    ));
}

#[tokio::test]
async fn remote_disconnect_is_acknowledged_then_reconnected() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    complete_handshake(&mut wire, "").await;

    reply(&mut wire, Message::DisconnectRequest).await;
    loop {
        match expect_message(&mut wire).await {
            Message::DisconnectResponse => break,
            Message::PingRequest => continue,
            other => panic!("expected disconnect acknowledgement, got {other:?}"),
        }
    }
    expect_end_of_stream(&mut wire).await;

    let mut second = accept(&listener).await;
    assert!(matches!(
        expect_message(&mut second).await,
        Message::HelloRequest(_)
    ));
}

#[tokio::test]
async fn deliberate_disconnect_sends_goodbye_and_never_reconnects() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    complete_handshake(&mut wire, "").await;
    wait_until(|| sink.has_status(DeviceStatus::Online, StatusDetail::None)).await;

    handle.disconnect().await.unwrap();
    loop {
        match expect_message(&mut wire).await {
            Message::DisconnectRequest => break,
            Message::PingRequest => continue,
            other => panic!("expected goodbye, got {other:?}"),
        }
    }

    // No reconnect follows a deliberate shutdown.
    let no_reconnect = timeout(Duration::from_millis(400), listener.accept()).await;
    assert!(no_reconnect.is_err(), "client reconnected after shutdown");
}

#[tokio::test]
async fn repeated_enumeration_done_recommits_deterministically() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    complete_handshake(&mut wire, "").await;
    announce_switch(&mut wire, 7).await;

    // A second enumeration-done within the same cycle re-commits the
    // same set and re-subscribes.
    reply(&mut wire, Message::ListEntitiesDone).await;
    assert!(matches!(
        expect_message(&mut wire).await,
        Message::SubscribeStatesRequest
    ));

    wait_until(|| sink.commits.lock().unwrap().len() == 2).await;
    let commits = sink.commits.lock().unwrap();
    assert_eq!(commits[0], commits[1]);
}

#[tokio::test]
async fn undecodable_bytes_report_the_encryption_hint_and_reconnect() {
    let (listener, config) = bind_device().await;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    let mut wire = accept(&listener).await;
    assert!(matches!(
        expect_message(&mut wire).await,
        Message::HelloRequest(_)
    ));

    // A non-zero preamble byte, as an encrypted peer would produce.
    wire.get_mut().write_all(&[0x5A, 0x00, 0x07]).await.unwrap();

    wait_until(|| sink.has_status(DeviceStatus::Offline, StatusDetail::CommunicationError)).await;
    {
        let statuses = sink.statuses.lock().unwrap();
        let (_, _, message) = statuses
            .iter()
            .find(|(s, d, _)| {
                *s == DeviceStatus::Offline && *d == StatusDetail::CommunicationError
            })
            .unwrap();
        assert!(message.contains("encrypt"), "hint missing from {message:?}");
    }

    let mut second = accept(&listener).await;
    assert!(matches!(
        expect_message(&mut second).await,
        Message::HelloRequest(_)
    ));
}

#[tokio::test]
async fn unreachable_device_keeps_retrying() {
    // Bind-and-drop to get a port nothing is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = DeviceConfig::new("127.0.0.1");
    config.port = port;
    let sink = Arc::new(RecordingSink::default());
    let handle = DeviceHandler::spawn_with_timings(config, fast_timings(), sink.clone());
    handle.connect().await.unwrap();

    // At least two attempts prove the scheduler re-arms itself.
    wait_until(|| {
        sink.count_status(DeviceStatus::Offline, StatusDetail::CommunicationError) >= 2
    })
    .await;
}
