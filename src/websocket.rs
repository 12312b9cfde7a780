//! # Transcription WebSocket Handler
//!
//! Browser clients connect to `/ws/transcribe`, send binary PCM16 mono 16 kHz
//! frames and receive JSON transcript events.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: server immediately sends `{"type":"ready", ...}`
//! 2. **Audio Streaming**: client sends binary frames; text frames are ignored
//! 3. **Transcription Results**: `stt.partial` (cumulative) and `stt.final`
//! 4. **Termination**: either side closing ends the bridge session; a final
//!    event carrying an error message precedes server-side closes caused by
//!    configuration or upstream connection problems
//!
//! ## Actor Model:
//! Each connection is an actix actor. The actor owns the client socket; the
//! bridge session runs as a separate tokio task and talks to the actor through
//! a pair of channels. Audio goes through a bounded one: when the upstream
//! falls behind by more than `FRAME_BACKLOG` frames, new frames are dropped.

use crate::bridge::{BridgeSession, TranscriptEvent};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Audio frames queued for the bridge before new ones are dropped
/// (about five seconds of 20 ms frames).
const FRAME_BACKLOG: usize = 256;

/// What happened to a client frame handed to the bridge.
#[derive(Debug, PartialEq, Eq)]
enum FrameOffer {
    Queued,
    Dropped,
    Closed,
}

fn offer_frame(frames: &mpsc::Sender<Vec<u8>>, data: Vec<u8>) -> FrameOffer {
    match frames.try_send(data) {
        Ok(()) => FrameOffer::Queued,
        Err(TrySendError::Full(_)) => FrameOffer::Dropped,
        Err(TrySendError::Closed(_)) => FrameOffer::Closed,
    }
}

/// WebSocket actor for one transcription session.
pub struct TranscribeSocket {
    session_id: Uuid,

    state: AppState,

    /// Inbound audio channel into the bridge session. `None` once stopped.
    frames: Option<mpsc::Sender<Vec<u8>>>,

    /// Cancels the bridge session when the client goes away.
    cancel: CancellationToken,

    /// Last time anything (data, ping, pong) arrived from the client.
    last_heartbeat: Instant,

    heartbeat_interval: Duration,

    client_timeout: Duration,
}

impl TranscribeSocket {
    pub fn new(state: AppState) -> Self {
        let upstream = &state.config.upstream;
        Self {
            session_id: Uuid::new_v4(),
            heartbeat_interval: upstream.ping_interval(),
            client_timeout: upstream.keepalive_deadline(),
            state,
            frames: None,
            cancel: CancellationToken::new(),
            last_heartbeat: Instant::now(),
        }
    }

    /// Ping the client every `heartbeat_interval`; drop it if it stays silent too long.
    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(session_id = %act.session_id, "Client heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Spawn the bridge session and wire its output back into this actor.
    fn start_bridge(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_BACKLOG);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.frames = Some(frames_tx);
        ctx.add_stream(UnboundedReceiverStream::new(events_rx));

        let session = BridgeSession::new(
            self.session_id,
            self.state.config.upstream.clone(),
            Arc::clone(&self.state.observability),
            self.cancel.clone(),
        );
        tokio::spawn(async move {
            let session_id = session.id();
            let outcome = session.run(frames_rx, events_tx).await;
            debug!(session_id = %session_id, outcome = ?outcome, "Bridge task finished");
        });
    }
}

impl Actor for TranscribeSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let active = self.state.increment_active_sessions();
        info!(session_id = %self.session_id, active, "Transcription WebSocket connected");

        self.start_bridge(ctx);
        self.heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.cancel.cancel();
        self.frames.take();

        let active = self.state.decrement_active_sessions();
        info!(session_id = %self.session_id, active, "Transcription WebSocket disconnected");
    }
}

/// Frames from the browser.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TranscribeSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                let Some(frames) = &self.frames else {
                    return;
                };
                match offer_frame(frames, data.to_vec()) {
                    FrameOffer::Queued => {}
                    FrameOffer::Dropped => {
                        warn!(session_id = %self.session_id, "Audio backlog full, dropping frame");
                    }
                    FrameOffer::Closed => {
                        debug!(session_id = %self.session_id, "Bridge no longer accepting audio");
                    }
                }
            }
            Ok(ws::Message::Text(_)) => {
                self.last_heartbeat = Instant::now();
                debug!(session_id = %self.session_id, "Ignoring text frame from client");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session_id, reason = ?reason, "Client closed WebSocket");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(session_id = %self.session_id, "Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.session_id, error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Transcript events from the bridge session.
impl StreamHandler<TranscriptEvent> for TranscribeSocket {
    fn handle(&mut self, event: TranscriptEvent, ctx: &mut Self::Context) {
        match event.to_json() {
            Ok(json) => ctx.text(json),
            Err(err) => error!(session_id = %self.session_id, error = %err, "Failed to encode transcript event"),
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!(session_id = %self.session_id, "Bridge session ended, closing client socket");
        ctx.close(None);
        ctx.stop();
    }
}

/// GET /ws/transcribe
pub async fn transcribe_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let max_frame = state.config.upstream.max_message_bytes;
    let socket = TranscribeSocket::new(state.get_ref().clone());

    ws::WsResponseBuilder::new(socket, &req, stream)
        .frame_size(max_frame)
        .start()
}
