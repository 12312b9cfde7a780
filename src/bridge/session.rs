//! # Session Coordinator
//!
//! Drives one client connection through `Handshaking → Bridging → Closing → Closed`.
//!
//! The client side is a pair of channels owned by the WebSocket actor: binary
//! frames come in on `frames`, transcript events go out on `events`. Dropping
//! the `events` receiver or cancelling the session token ends the session.

use super::error::{BridgeError, PumpExit};
use super::protocol::TranscriptEvent;
use super::pumps::{pump_client_to_upstream, pump_upstream_to_client, PumpSettings};
use super::upstream;
use crate::config::UpstreamConfig;
use crate::observability::ObservabilityStore;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Pause between `ready` and the configuration error so the client sees `ready` first.
pub const CONFIG_ERROR_DELAY: Duration = Duration::from_millis(100);

const UPSTREAM_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Handshaking,
    Bridging,
    Closing,
    Closed,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Never reached `Bridging`; the reason was sent to the client as a final event.
    Rejected(BridgeError),
    /// Both pumps ran and have stopped.
    Completed { inbound: PumpExit, outbound: PumpExit },
    /// The client went away before the upstream session was established.
    Aborted,
}

pub struct BridgeSession {
    id: Uuid,
    config: UpstreamConfig,
    observability: Arc<ObservabilityStore>,
    cancel: CancellationToken,
    phase: SessionPhase,
}

impl BridgeSession {
    pub fn new(
        id: Uuid,
        config: UpstreamConfig,
        observability: Arc<ObservabilityStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            config,
            observability,
            cancel,
            phase: SessionPhase::Handshaking,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn transition(&mut self, next: SessionPhase) {
        debug!(from = ?self.phase, to = ?next, "Session phase change");
        self.phase = next;
    }

    /// Run the session to completion.
    pub async fn run(
        self,
        frames: mpsc::Receiver<Vec<u8>>,
        events: mpsc::UnboundedSender<TranscriptEvent>,
    ) -> SessionOutcome {
        let span = info_span!("bridge_session", session_id = %self.id);
        self.drive(frames, events).instrument(span).await
    }

    async fn drive(
        mut self,
        mut frames: mpsc::Receiver<Vec<u8>>,
        events: mpsc::UnboundedSender<TranscriptEvent>,
    ) -> SessionOutcome {
        if events.send(TranscriptEvent::ready()).is_err() {
            self.transition(SessionPhase::Closed);
            return SessionOutcome::Aborted;
        }
        self.observability.record_frontend_event(TranscriptEvent::ready().to_value());

        if self.config.credential().is_none() {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.transition(SessionPhase::Closed);
                    return SessionOutcome::Aborted;
                }
                _ = sleep(CONFIG_ERROR_DELAY) => {}
            }
            warn!("Upstream credential is not configured");
            return self.reject(&events, BridgeError::MissingCredential);
        }

        let negotiated = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.transition(SessionPhase::Closed);
                return SessionOutcome::Aborted;
            }
            result = upstream::negotiate(&self.config) => result,
        };
        let socket = match negotiated {
            Ok(socket) => socket,
            Err(e) => {
                error!(error = %e, "Upstream negotiation failed");
                return self.reject(&events, e);
            }
        };

        self.transition(SessionPhase::Bridging);
        info!("Bridging client audio to upstream");

        let (mut upstream_tx, mut upstream_rx) = socket.split();
        let observability = Arc::clone(&self.observability);
        let settings = PumpSettings::from(&self.config);
        let pump_cancel = self.cancel.child_token();

        let (inbound, outbound) = {
            let inbound = pump_client_to_upstream(
                &mut frames,
                &mut upstream_tx,
                &observability,
                &settings,
                &pump_cancel,
            );
            let outbound = pump_upstream_to_client(
                &mut upstream_rx,
                &events,
                &observability,
                &settings,
                &pump_cancel,
            );
            tokio::pin!(inbound, outbound);

            tokio::select! {
                exit = &mut inbound => {
                    debug!(exit = %exit, "Inbound pump finished first");
                    self.transition(SessionPhase::Closing);
                    pump_cancel.cancel();
                    (exit, outbound.await)
                }
                exit = &mut outbound => {
                    debug!(exit = %exit, "Outbound pump finished first");
                    self.transition(SessionPhase::Closing);
                    pump_cancel.cancel();
                    (inbound.await, exit)
                }
            }
        };

        match timeout(UPSTREAM_CLOSE_TIMEOUT, upstream_tx.close()).await {
            Ok(Ok(())) => debug!("Upstream socket closed"),
            Ok(Err(e)) => debug!(error = %e, "Upstream close failed"),
            Err(_) => debug!("Upstream close timed out"),
        }
        drop(upstream_rx);

        self.transition(SessionPhase::Closed);
        if inbound.is_failure() || outbound.is_failure() {
            warn!(inbound = %inbound, outbound = %outbound, "Bridge session ended with a failure");
        } else {
            info!(inbound = %inbound, outbound = %outbound, "Bridge session ended");
        }
        SessionOutcome::Completed { inbound, outbound }
    }

    /// Report a pre-bridging failure to the client and end the session.
    fn reject(
        mut self,
        events: &mpsc::UnboundedSender<TranscriptEvent>,
        reason: BridgeError,
    ) -> SessionOutcome {
        let event = TranscriptEvent::Final {
            text: reason.to_string(),
        };
        let recorded = event.to_value();
        if events.send(event).is_ok() {
            self.observability.record_frontend_event(recorded);
        }
        self.transition(SessionPhase::Closed);
        SessionOutcome::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::Message;

    fn session(config: UpstreamConfig, cancel: CancellationToken) -> BridgeSession {
        BridgeSession::new(
            Uuid::new_v4(),
            config,
            Arc::new(ObservabilityStore::default()),
            cancel,
        )
    }

    fn keyed_config(url: String) -> UpstreamConfig {
        UpstreamConfig {
            url,
            api_key: "sk-test".to_string(),
            ..UpstreamConfig::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TranscriptEvent>) -> Vec<TranscriptEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// In-process upstream: records every text message it receives, sends
    /// `script` after the handshake, then closes if `close_after_script`.
    /// `appended` fires on the first audio append.
    async fn fake_upstream(
        script: Vec<Value>,
        close_after_script: bool,
        appended: Option<oneshot::Sender<()>>,
    ) -> (String, JoinHandle<Vec<Value>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/v1/realtime", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut received = Vec::new();
            let mut appended = appended;

            while received.len() < 2 {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        received.push(serde_json::from_str::<Value>(&text).unwrap())
                    }
                    Some(Ok(_)) => {}
                    _ => return received,
                }
            }

            for event in script {
                ws.send(Message::Text(event.to_string())).await.unwrap();
            }
            if close_after_script {
                let _ = ws.close(None).await;
            }

            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    let value: Value = serde_json::from_str(&text).unwrap();
                    if value["type"] == "input_audio_buffer.append" {
                        if let Some(tx) = appended.take() {
                            let _ = tx.send(());
                        }
                    }
                    received.push(value);
                }
            }
            received
        });

        (url, handle)
    }

    fn types(received: &[Value]) -> Vec<&str> {
        received.iter().filter_map(|v| v["type"].as_str()).collect()
    }

    #[tokio::test]
    async fn test_missing_credential_sends_ready_then_error() {
        let (_frames_tx, frames) = mpsc::channel(16);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let config = UpstreamConfig {
            url: "ws://127.0.0.1:9/v1/realtime".to_string(),
            ..UpstreamConfig::default()
        };

        let outcome = session(config, CancellationToken::new())
            .run(frames, events_tx)
            .await;
        assert_eq!(outcome, SessionOutcome::Rejected(BridgeError::MissingCredential));
        assert_eq!(
            drain(&mut events_rx),
            vec![
                TranscriptEvent::ready(),
                TranscriptEvent::Final {
                    text: "OPENAI_API_KEY not configured".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let (_frames_tx, frames) = mpsc::channel(16);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let config = keyed_config("ws://127.0.0.1:9/v1/realtime".to_string());

        let outcome = session(config, CancellationToken::new())
            .run(frames, events_tx)
            .await;
        assert!(matches!(outcome, SessionOutcome::Rejected(BridgeError::Connect(_))));

        let events = drain(&mut events_rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], TranscriptEvent::ready());
        match &events[1] {
            TranscriptEvent::Final { text } => {
                assert!(text.starts_with("OpenAI Realtime connect failed"), "{}", text)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_before_ready_delay_aborts() {
        let (_frames_tx, frames) = mpsc::channel(16);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = session(UpstreamConfig::default(), cancel).run(frames, events_tx).await;
        assert_eq!(outcome, SessionOutcome::Aborted);
        assert_eq!(drain(&mut events_rx), vec![TranscriptEvent::ready()]);
    }

    #[tokio::test]
    async fn test_client_disconnect_commits_and_closes_upstream() {
        let (url, server) = fake_upstream(Vec::new(), false, None).await;
        let (frames_tx, frames) = mpsc::channel(16);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        frames_tx.send(vec![0u8; 640]).await.unwrap();
        frames_tx.send(vec![0u8; 640]).await.unwrap();
        drop(frames_tx);

        let bridge = session(keyed_config(url), CancellationToken::new());
        let observability = Arc::clone(&bridge.observability);
        let outcome = bridge.run(frames, events_tx).await;
        assert_eq!(
            outcome,
            SessionOutcome::Completed {
                inbound: PumpExit::SourceClosed,
                outbound: PumpExit::Cancelled,
            }
        );

        let received = server.await.unwrap();
        assert_eq!(
            types(&received),
            vec![
                "session.update",
                "response.create",
                "input_audio_buffer.append",
                "input_audio_buffer.append",
                "input_audio_buffer.commit",
            ]
        );
        assert_eq!(received[0]["session"]["input_audio_format"], "pcm16");
        assert_eq!(drain(&mut events_rx), vec![TranscriptEvent::ready()]);
        assert_eq!(observability.frontend_chunks().count, 2);
        assert_eq!(observability.upstream_chunks().count, 2);
    }

    #[tokio::test]
    async fn test_upstream_transcripts_reach_client() {
        let script = vec![
            json!({"type": "response.output_text.delta", "delta": "hel"}),
            json!({"type": "response.output_text.delta", "delta": "lo"}),
            json!({"type": "conversation.item.input_audio_transcription.completed", "transcript": "hello"}),
        ];
        let (url, server) = fake_upstream(script, true, None).await;
        let (_frames_tx, frames) = mpsc::channel(16);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let outcome = session(keyed_config(url), CancellationToken::new())
            .run(frames, events_tx)
            .await;
        assert_eq!(
            outcome,
            SessionOutcome::Completed {
                inbound: PumpExit::Cancelled,
                outbound: PumpExit::SourceClosed,
            }
        );

        let events = drain(&mut events_rx);
        assert_eq!(events[0], TranscriptEvent::ready());
        assert_eq!(
            events[1],
            TranscriptEvent::Partial {
                text: "hel".to_string()
            }
        );
        assert_eq!(
            events.last().unwrap(),
            &TranscriptEvent::Final {
                text: "hello".to_string()
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_while_bridging_stops_both_pumps() {
        let (appended_tx, appended_rx) = oneshot::channel();
        let (url, server) = fake_upstream(Vec::new(), false, Some(appended_tx)).await;
        let (frames_tx, frames) = mpsc::channel(16);
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(session(keyed_config(url), cancel.clone()).run(frames, events_tx));
        frames_tx.send(vec![0u8; 320]).await.unwrap();
        appended_rx.await.unwrap();
        cancel.cancel();

        let outcome = task.await.unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::Completed {
                inbound: PumpExit::Cancelled,
                outbound: PumpExit::Cancelled,
            }
        );
        let received = server.await.unwrap();
        assert_eq!(types(&received).last(), Some(&"input_audio_buffer.commit"));
    }
}
