//! # Bridge Pumps
//!
//! The two directions of a bridge session. Each pump owns one half of the
//! upstream socket and one end of the client channel pair, and finishes with a
//! [`PumpExit`] instead of an error.
//!
//! ## Inbound (client → upstream):
//! binary PCM frames become `input_audio_buffer.append` messages; the buffer is
//! committed every `commit_interval` and once more when the pump stops.
//!
//! ## Outbound (upstream → client):
//! upstream events are classified; partial text is accumulated and emitted at
//! most once per [`PARTIAL_THROTTLE`], finals are emitted immediately and start
//! a fresh utterance.

use super::classifier::classify;
use super::error::{BridgeError, Disposition, PumpExit};
use super::events::UpstreamEvent;
use super::protocol::{TranscriptEvent, UpstreamCommand};
use crate::config::UpstreamConfig;
use crate::observability::ObservabilityStore;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::json;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Minimum spacing between two `stt.partial` emissions.
pub const PARTIAL_THROTTLE: Duration = Duration::from_millis(150);

/// Upper bound on the best-effort commit sent when the inbound pump stops.
const FINAL_COMMIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Timing knobs shared by both pumps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpSettings {
    pub commit_interval: Duration,
    pub ping_interval: Duration,
    pub keepalive_deadline: Duration,
}

impl From<&UpstreamConfig> for PumpSettings {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            commit_interval: config.commit_interval(),
            ping_interval: config.ping_interval(),
            keepalive_deadline: config.keepalive_deadline(),
        }
    }
}

async fn send_command<U>(upstream: &mut U, command: &UpstreamCommand) -> Result<(), BridgeError>
where
    U: Sink<Message> + Unpin,
    U::Error: Display,
{
    let message = command.to_message()?;
    upstream
        .send(message)
        .await
        .map_err(|e| BridgeError::Send(format!("{}: {}", command.event_type(), e)))
}

/// Forward client audio upstream until the client stops, a send fails, or `cancel` fires.
pub async fn pump_client_to_upstream<U>(
    frames: &mut mpsc::Receiver<Vec<u8>>,
    upstream: &mut U,
    observability: &ObservabilityStore,
    settings: &PumpSettings,
    cancel: &CancellationToken,
) -> PumpExit
where
    U: Sink<Message> + Unpin,
    U::Error: Display,
{
    let exit = tokio::select! {
        biased;
        _ = cancel.cancelled() => PumpExit::Cancelled,
        exit = forward_audio(frames, upstream, observability, settings) => exit,
    };

    // Let upstream VAD finalize whatever audio is still buffered.
    match timeout(FINAL_COMMIT_TIMEOUT, send_command(upstream, &UpstreamCommand::Commit)).await {
        Ok(Ok(())) => debug!("Final commit sent"),
        Ok(Err(e)) => debug!(error = %e, "Final commit failed"),
        Err(_) => debug!("Final commit timed out"),
    }

    debug!(exit = %exit, "Inbound pump stopped");
    exit
}

async fn forward_audio<U>(
    frames: &mut mpsc::Receiver<Vec<u8>>,
    upstream: &mut U,
    observability: &ObservabilityStore,
    settings: &PumpSettings,
) -> PumpExit
where
    U: Sink<Message> + Unpin,
    U::Error: Display,
{
    let mut last_commit = Instant::now();
    let mut keepalive = interval_at(Instant::now() + settings.ping_interval, settings.ping_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    return PumpExit::SourceClosed;
                };
                let size = frame.len();
                observability.record_frontend_chunk(size);

                if let Err(e) = send_command(upstream, &UpstreamCommand::append_audio(&frame)).await {
                    return PumpExit::Failed(e);
                }
                observability.record_upstream_chunk(size);

                if last_commit.elapsed() >= settings.commit_interval {
                    // An empty-buffer rejection comes back as an upstream error
                    // event; only transport failures surface here.
                    if let Err(e) = send_command(upstream, &UpstreamCommand::Commit).await {
                        return PumpExit::Failed(e);
                    }
                    last_commit = Instant::now();
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = upstream.send(Message::Ping(Vec::new())).await {
                    return PumpExit::Failed(BridgeError::Send(format!("ping: {}", e)));
                }
            }
        }
    }
}

/// Per-utterance partial text with emission throttling.
#[derive(Debug, Clone)]
pub struct PartialAccumulator {
    text: String,
    last_emitted: Option<Instant>,
    throttle: Duration,
}

impl PartialAccumulator {
    pub fn new(throttle: Duration) -> Self {
        Self {
            text: String::new(),
            last_emitted: None,
            throttle,
        }
    }

    /// Append a fragment; returns the cumulative text when an emission is due.
    pub fn push(&mut self, fragment: &str, now: Instant) -> Option<String> {
        self.text.push_str(fragment);
        let due = self
            .last_emitted
            .map_or(true, |last| now.saturating_duration_since(last) > self.throttle);
        if !due {
            return None;
        }
        self.last_emitted = Some(now);
        Some(self.text.clone())
    }

    pub fn reset(&mut self) {
        self.text.clear();
        self.last_emitted = None;
    }
}

fn emit(
    client: &mpsc::UnboundedSender<TranscriptEvent>,
    observability: &ObservabilityStore,
    event: TranscriptEvent,
) -> Result<(), BridgeError> {
    let recorded = event.to_value();
    client.send(event).map_err(|_| BridgeError::ClientGone)?;
    observability.record_frontend_event(recorded);
    Ok(())
}

/// Relay upstream transcripts to the client until upstream closes, fails, or `cancel` fires.
pub async fn pump_upstream_to_client<S, E>(
    upstream: &mut S,
    client: &mpsc::UnboundedSender<TranscriptEvent>,
    observability: &ObservabilityStore,
    settings: &PumpSettings,
    cancel: &CancellationToken,
) -> PumpExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let exit = tokio::select! {
        biased;
        _ = cancel.cancelled() => PumpExit::Cancelled,
        exit = relay_transcripts(upstream, client, observability, settings) => exit,
    };
    debug!(exit = %exit, "Outbound pump stopped");
    exit
}

async fn relay_transcripts<S, E>(
    upstream: &mut S,
    client: &mpsc::UnboundedSender<TranscriptEvent>,
    observability: &ObservabilityStore,
    settings: &PumpSettings,
) -> PumpExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut partials = PartialAccumulator::new(PARTIAL_THROTTLE);

    loop {
        let message = match timeout(settings.keepalive_deadline, upstream.next()).await {
            Err(_) => return PumpExit::Failed(BridgeError::KeepaliveTimeout),
            Ok(None) => return PumpExit::SourceClosed,
            Ok(Some(Err(e))) => return PumpExit::Failed(BridgeError::Receive(e.to_string())),
            Ok(Some(Ok(message))) => message,
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(frame) => {
                debug!(frame = ?frame, "Upstream sent close");
                return PumpExit::SourceClosed;
            }
            // Binary payloads carry no transcript; ping/pong only prove liveness.
            _ => continue,
        };

        let event = match UpstreamEvent::parse(&text) {
            Ok(event) => event,
            Err(e) => return PumpExit::Failed(BridgeError::Decode(e.to_string())),
        };
        observability.record_frontend_event(json!({ "etype": event.event_type() }));

        if let Some(detail) = event.error_detail() {
            match detail.disposition() {
                Disposition::Ignore => debug!(code = ?detail.code, "Ignoring benign upstream error"),
                Disposition::Continue => warn!(
                    code = ?detail.code,
                    message = ?detail.message,
                    "Upstream reported an error"
                ),
                Disposition::Terminate => {
                    return PumpExit::Failed(BridgeError::Receive(
                        detail.message.unwrap_or_default(),
                    ))
                }
            }
            continue;
        }

        let classification = classify(&event);

        if let Some(fragment) = classification.partial_text() {
            observability.record_text_delta(fragment);
            if let Some(cumulative) = partials.push(fragment, Instant::now()) {
                if let Err(e) = emit(client, observability, TranscriptEvent::Partial { text: cumulative }) {
                    return PumpExit::Failed(e);
                }
            }
        }

        if let Some(text) = classification.final_text() {
            observability.record_text_final(text);
            let event = TranscriptEvent::Final {
                text: text.to_string(),
            };
            if let Err(e) = emit(client, observability, event) {
                return PumpExit::Failed(e);
            }
            partials.reset();
        }
    }
}
