//! Channel Connection Lifecycle
//!
//! Owns one logical channel's socket: connect with timeout, heartbeat,
//! reconnect with capped exponential backoff, manual teardown, and a typed
//! inbound event stream. All socket errors funnel into the same failure
//! path as closes; nothing escapes to a panic or an unhandled surface.
//!
//! Each channel is fully independent: a failure on a thread-scoped channel
//! never affects the global channel's state machine.

pub mod backoff;
pub mod state;

pub use backoff::Backoff;
pub use state::{ConnectionState, InternalState, ReconnectDecision};

use crate::config::ChannelConfig;
use crate::dispatch::{self, FrameRejection};
use crate::error::PulseError;
use crate::protocol::{InboundEvent, OutboundMessage};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tracing::{debug, info, warn};

/// Status transition observable by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
    Failed,
}

impl std::fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "live"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Why one connection run ended.
enum RunOutcome {
    /// Clean server close (code 1000) — no reconnect.
    Clean,
    /// Manual shutdown or handle dropped. The handle already recorded the
    /// state transition; the supervisor exits without touching it.
    Manual,
    /// Server rejected us by policy (application close code) — no reconnect.
    PolicyRejected(u16),
    /// Anything else: error, abnormal close, heartbeat timeout — reconnect.
    Lost(String),
}

/// Handle for one logical channel connection.
///
/// `connect` spawns a supervisor task that owns the socket and every timer
/// (connect timeout, heartbeat interval, pong deadline, backoff delay).
/// Dropping into `disconnect` cancels the task, and with it all pending
/// timers, before the state transition is observable.
pub struct Channel {
    config: ChannelConfig,
    state: Arc<RwLock<InternalState>>,
    send_tx: Option<mpsc::UnboundedSender<OutboundMessage>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    event_rx: mpsc::UnboundedReceiver<InboundEvent>,
    event_tx: mpsc::UnboundedSender<InboundEvent>,
    status_rx: mpsc::UnboundedReceiver<StatusUpdate>,
    status_tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        Self {
            config,
            state: Arc::new(RwLock::new(InternalState::new())),
            send_tx: None,
            shutdown_tx: None,
            event_rx,
            event_tx,
            status_rx,
            status_tx,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Current observable connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| s.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.state
            .read()
            .map(|s| s.reconnect_attempts)
            .unwrap_or(0)
    }

    /// Opens the channel. No-op while a connect attempt is already in
    /// flight, the channel is live, or the channel is failed: at most one
    /// socket attempt ever exists per channel.
    pub fn connect(&mut self) {
        {
            let Ok(mut st) = self.state.write() else {
                return;
            };
            if !st.begin_connect() {
                debug!(channel = %self.config.kind, state = %st.state, "connect ignored");
                return;
            }
        }

        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        self.send_tx = Some(send_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let config = self.config.clone();
        let state = Arc::clone(&self.state);
        let event_tx = self.event_tx.clone();
        let status_tx = self.status_tx.clone();

        tokio::spawn(supervise(
            config,
            state,
            send_rx,
            shutdown_rx,
            event_tx,
            status_tx,
        ));
    }

    /// Tears the channel down intentionally: suppresses automatic
    /// reconnection, cancels the supervisor task and every timer it holds,
    /// and closes the socket with a normal-closure code. The state reads
    /// `Disconnected` as soon as this returns, so a follow-up `connect` is
    /// never refused.
    pub fn disconnect(&mut self) {
        if let Ok(mut st) = self.state.write() {
            st.mark_closed();
        }
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.try_send(());
        }
        self.send_tx = None;
        let _ = self.status_tx.send(StatusUpdate::Disconnected);
        info!(channel = %self.config.kind, "channel disconnect requested");
    }

    /// The only exit from the failed state: reset the attempt budget and
    /// connect again. Ignored while a supervisor is still driving the
    /// channel (connecting, connected, or waiting out a backoff delay); the
    /// automatic path already owns those states.
    pub fn force_reconnect(&mut self) {
        match self.state() {
            ConnectionState::Failed | ConnectionState::Disconnected => {
                if let Ok(mut st) = self.state.write() {
                    st.reset_for_reconnect();
                }
                info!(channel = %self.config.kind, "force reconnect");
                self.connect();
            }
            state => {
                debug!(channel = %self.config.kind, %state, "force reconnect ignored, channel active");
            }
        }
    }

    /// Queues a message for the live socket.
    pub fn send(&self, message: OutboundMessage) -> Result<(), PulseError> {
        if !self.state().is_connected() {
            return Err(PulseError::NotConnected);
        }
        let tx = self.send_tx.as_ref().ok_or(PulseError::NotConnected)?;
        tx.send(message).map_err(|_| PulseError::NotConnected)
    }

    /// Drains pending inbound events, in arrival order (non-blocking).
    pub fn poll_events(&mut self) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Drains pending status transitions (non-blocking).
    pub fn poll_status(&mut self) -> Vec<StatusUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.status_rx.try_recv() {
            updates.push(update);
        }
        updates
    }
}

/// Supervisor: one connect attempt per loop pass, reconnect with backoff on
/// loss, stop on clean close, manual shutdown, policy rejection, or an
/// exhausted budget.
async fn supervise(
    config: ChannelConfig,
    state: Arc<RwLock<InternalState>>,
    mut send_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    mut shutdown_rx: mpsc::Receiver<()>,
    event_tx: mpsc::UnboundedSender<InboundEvent>,
    status_tx: mpsc::UnboundedSender<StatusUpdate>,
) {
    let backoff = Backoff::new(
        Duration::from_millis(config.reconnect_base_ms),
        Duration::from_millis(config.reconnect_cap_ms),
        config.jitter,
    );
    let url = config.connection_url();

    loop {
        if manual_close_requested(&state) {
            return;
        }

        let _ = status_tx.send(StatusUpdate::Connecting);
        debug!(channel = %config.kind, url = %url, "opening socket");

        // A shutdown message means the handle already recorded the manual
        // close; a closed channel means the handle moved on without this
        // task. Either way the supervisor exits without touching state.
        let attempt = tokio::select! {
            _ = shutdown_rx.recv() => return,
            res = timeout(config.connect_timeout(), connect_async(url.as_str())) => res,
        };

        match attempt {
            Ok(Ok((ws, _response))) => {
                if manual_close_requested(&state) {
                    return;
                }
                set_state(&state, |s| s.mark_connected());
                let _ = status_tx.send(StatusUpdate::Connected);
                info!(channel = %config.kind, "channel connected");

                // Discard sends queued while we were down.
                while send_rx.try_recv().is_ok() {}

                let outcome = run_connection(
                    &config,
                    &state,
                    ws,
                    &mut send_rx,
                    &mut shutdown_rx,
                    &event_tx,
                )
                .await;

                match outcome {
                    RunOutcome::Clean => {
                        info!(channel = %config.kind, "server closed cleanly");
                        set_state(&state, |s| s.mark_disconnected());
                        let _ = status_tx.send(StatusUpdate::Disconnected);
                        return;
                    }
                    RunOutcome::Manual => {
                        return;
                    }
                    RunOutcome::PolicyRejected(code) => {
                        warn!(channel = %config.kind, code, "closed by server policy, not reconnecting");
                        set_state(&state, |s| s.mark_disconnected());
                        let _ = status_tx.send(StatusUpdate::Disconnected);
                        return;
                    }
                    RunOutcome::Lost(reason) => {
                        warn!(channel = %config.kind, %reason, "connection lost");
                        set_state(&state, |s| s.mark_disconnected());
                        let _ = status_tx.send(StatusUpdate::Disconnected);
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(channel = %config.kind, error = %e, "connect failed");
                set_state(&state, |s| s.mark_disconnected());
            }
            Err(_) => {
                warn!(
                    channel = %config.kind,
                    timeout_ms = config.connect_timeout_ms,
                    "connect timed out"
                );
                set_state(&state, |s| s.mark_disconnected());
            }
        }

        if manual_close_requested(&state) {
            return;
        }

        let decision = state
            .write()
            .map(|mut s| s.begin_reconnect(config.max_reconnect_attempts))
            .unwrap_or(ReconnectDecision::GiveUp);

        match decision {
            ReconnectDecision::GiveUp => {
                warn!(
                    channel = %config.kind,
                    max_attempts = config.max_reconnect_attempts,
                    "reconnect budget exhausted, entering failed state"
                );
                let _ = status_tx.send(StatusUpdate::Failed);
                return;
            }
            ReconnectDecision::Retry { attempt } => {
                let delay = backoff.delay(attempt);
                let _ = status_tx.send(StatusUpdate::Reconnecting { attempt });
                debug!(
                    channel = %config.kind,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                tokio::select! {
                    _ = shutdown_rx.recv() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                set_state(&state, |s| s.resume_connecting());
            }
        }
    }
}

/// Drives one live connection until it ends. Owns the heartbeat interval
/// and the pong deadline; both die with this future, so a shutdown cancels
/// them implicitly.
async fn run_connection(
    config: &ChannelConfig,
    state: &Arc<RwLock<InternalState>>,
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    send_rx: &mut mpsc::UnboundedReceiver<OutboundMessage>,
    shutdown_rx: &mut mpsc::Receiver<()>,
    event_tx: &mpsc::UnboundedSender<InboundEvent>,
) -> RunOutcome {
    let (mut sink, mut stream) = ws.split();

    // Channels that replay server state ask for it right after open.
    if config.kind.wants_replay() {
        match OutboundMessage::GetActiveBroadcast.to_frame() {
            Ok(frame) => {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    return RunOutcome::Lost(format!("snapshot request failed: {}", e));
                }
            }
            Err(e) => warn!(error = %e, "could not serialize snapshot request"),
        }
    }

    let start = tokio::time::Instant::now() + config.heartbeat_interval();
    let mut heartbeat = tokio::time::interval_at(start, config.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            msg = shutdown_rx.recv() => {
                // Only an explicit shutdown gets a close frame; a dropped
                // sender means the handle is gone.
                if msg.is_some() {
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client going away".into(),
                    }));
                    let _ = sink.send(close).await;
                }
                return RunOutcome::Manual;
            }

            Some(message) = send_rx.recv() => {
                let frame = match message.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "dropping unserializable outbound message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    return RunOutcome::Lost(format!("send failed: {}", e));
                }
            }

            incoming = stream.next() => {
                match incoming {
                    None => return RunOutcome::Lost("stream ended".to_string()),
                    Some(Err(e)) => return RunOutcome::Lost(format!("socket error: {}", e)),
                    Some(Ok(Message::Text(raw))) => {
                        match dispatch::parse_frame(&raw) {
                            Ok(InboundEvent::Pong) => {
                                if let Ok(mut st) = state.write() {
                                    st.record_pong(Instant::now());
                                }
                                pong_deadline = None;
                            }
                            Ok(InboundEvent::Heartbeat) => {
                                match OutboundMessage::HeartbeatAck.to_frame() {
                                    Ok(frame) => {
                                        if let Err(e) = sink.send(Message::Text(frame)).await {
                                            return RunOutcome::Lost(
                                                format!("heartbeat ack failed: {}", e),
                                            );
                                        }
                                    }
                                    Err(e) => warn!(error = %e, "could not serialize heartbeat ack"),
                                }
                            }
                            Ok(event) => {
                                if event_tx.send(event).is_err() {
                                    // Handle gone; exit quietly.
                                    return RunOutcome::Manual;
                                }
                            }
                            Err(FrameRejection::Malformed(reason)) => {
                                warn!(channel = %config.kind, %reason, "dropping malformed frame");
                            }
                            Err(FrameRejection::UnknownType(tag)) => {
                                warn!(channel = %config.kind, %tag, "dropping unknown event type");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            return RunOutcome::Lost(format!("pong failed: {}", e));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code)).unwrap_or(1006);
                        return match code {
                            1000 => RunOutcome::Clean,
                            4000..=4999 => RunOutcome::PolicyRejected(code),
                            other => RunOutcome::Lost(format!("abnormal close: {}", other)),
                        };
                    }
                    Some(Ok(_)) => {}
                }
            }

            _ = heartbeat.tick() => {
                match OutboundMessage::Ping.to_frame() {
                    Ok(frame) => {
                        if let Err(e) = sink.send(Message::Text(frame)).await {
                            return RunOutcome::Lost(format!("ping failed: {}", e));
                        }
                        if let Ok(mut st) = state.write() {
                            st.record_ping(Instant::now());
                        }
                        pong_deadline =
                            Some(tokio::time::Instant::now() + config.pong_timeout());
                    }
                    Err(e) => warn!(error = %e, "could not serialize ping"),
                }
            }

            _ = async {
                match pong_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            }, if pong_deadline.is_some() => {
                // Half-open connection: ping went out, nothing came back.
                return RunOutcome::Lost(format!(
                    "heartbeat timeout: no pong within {}ms",
                    config.pong_timeout_ms
                ));
            }
        }
    }
}

fn manual_close_requested(state: &Arc<RwLock<InternalState>>) -> bool {
    state.read().map(|s| s.manual_close).unwrap_or(true)
}

fn set_state(state: &Arc<RwLock<InternalState>>, f: impl FnOnce(&mut InternalState)) {
    if let Ok(mut st) = state.write() {
        f(&mut st);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelKind;

    fn channel() -> Channel {
        Channel::new(ChannelConfig::for_kind(
            "ws://127.0.0.1:1",
            ChannelKind::Global,
        ))
    }

    #[test]
    fn test_new_channel_is_disconnected() {
        let ch = channel();
        assert_eq!(ch.state(), ConnectionState::Disconnected);
        assert_eq!(ch.reconnect_attempts(), 0);
    }

    #[test]
    fn test_send_while_disconnected_fails() {
        let ch = channel();
        let err = ch.send(OutboundMessage::Ping).unwrap_err();
        assert!(matches!(err, PulseError::NotConnected));
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_per_socket() {
        let mut ch = channel();
        ch.connect();
        assert_eq!(ch.state(), ConnectionState::Connecting);
        // Second call while connecting: the guard refuses, no second task
        // replaces the first one's send channel.
        let first_tx = ch.send_tx.clone();
        ch.connect();
        assert!(matches!(
            (&first_tx, &ch.send_tx),
            (Some(a), Some(b)) if a.same_channel(b)
        ));
        ch.disconnect();
    }

    #[tokio::test]
    async fn test_disconnect_is_synchronously_observable() {
        let mut ch = channel();
        ch.connect();
        ch.disconnect();
        assert!(ch.state.read().unwrap().manual_close);
        assert_eq!(ch.state(), ConnectionState::Disconnected);
        assert!(ch.send_tx.is_none());
    }

    #[tokio::test]
    async fn test_connect_immediately_after_disconnect() {
        let mut ch = channel();
        ch.connect();
        ch.disconnect();
        // The teardown must not swallow a follow-up connect.
        ch.connect();
        assert_eq!(ch.state(), ConnectionState::Connecting);
        ch.disconnect();
    }

    #[tokio::test]
    async fn test_force_reconnect_ignored_while_active() {
        let mut ch = channel();
        ch.connect();
        assert_eq!(ch.state(), ConnectionState::Connecting);
        // The running supervisor keeps its shutdown channel; a force
        // reconnect must not replace it out from under the task.
        let first_tx = ch.shutdown_tx.clone();
        ch.force_reconnect();
        assert!(matches!(
            (&first_tx, &ch.shutdown_tx),
            (Some(a), Some(b)) if a.same_channel(b)
        ));
        ch.disconnect();
    }

    #[test]
    fn test_status_update_display() {
        assert_eq!(StatusUpdate::Connected.to_string(), "live");
        assert_eq!(
            StatusUpdate::Reconnecting { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
        assert_eq!(StatusUpdate::Failed.to_string(), "failed");
    }
}
