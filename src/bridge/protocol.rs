//! # Wire Messages
//!
//! JSON messages exchanged on both sockets of a bridge session.
//!
//! ## Client socket (server → browser):
//! - `{"type":"ready","audio_in":{"encoding":"pcm16","sample_rate_hz":16000,"channels":1}}`
//! - `{"type":"stt.partial","text":"<cumulative text>"}`
//! - `{"type":"stt.final","text":"<final text>"}`
//!
//! The browser only ever sends binary PCM16 LE mono 16 kHz frames.
//!
//! ## Upstream socket (server → transcription service):
//! `session.update`, `response.create`, `input_audio_buffer.append`, `input_audio_buffer.commit`.

use super::error::BridgeError;
use crate::config::UpstreamConfig;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

/// Audio format the browser is expected to stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: String,
    pub sample_rate_hz: u32,
    pub channels: u8,
}

impl AudioFormat {
    pub fn pcm16_mono_16k() -> Self {
        Self {
            encoding: "pcm16".to_string(),
            sample_rate_hz: 16000,
            channels: 1,
        }
    }
}

/// Messages sent to the browser client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TranscriptEvent {
    /// First message of every session.
    #[serde(rename = "ready")]
    Ready { audio_in: AudioFormat },

    /// Cumulative text of the utterance in progress.
    #[serde(rename = "stt.partial")]
    Partial { text: String },

    /// Completed utterance, or a terminal error description.
    #[serde(rename = "stt.final")]
    Final { text: String },
}

impl TranscriptEvent {
    pub fn ready() -> Self {
        TranscriptEvent::Ready {
            audio_in: AudioFormat::pcm16_mono_16k(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Server-side voice activity detection settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub silence_duration_ms: u32,
    pub prefix_padding_ms: u32,
    pub threshold: f64,
    pub create_response: bool,
    pub interrupt_response: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputTranscription {
    pub model: String,
    pub language: String,
}

/// Body of `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSettings {
    pub turn_detection: TurnDetection,
    pub input_audio_format: String,
    pub input_audio_transcription: InputTranscription,
    pub modalities: Vec<String>,
}

impl SessionSettings {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            turn_detection: TurnDetection {
                kind: "server_vad".to_string(),
                silence_duration_ms: config.silence_duration_ms,
                prefix_padding_ms: config.prefix_padding_ms,
                threshold: config.vad_threshold,
                create_response: true,
                interrupt_response: true,
            },
            input_audio_format: "pcm16".to_string(),
            input_audio_transcription: InputTranscription {
                model: config.transcribe_model.clone(),
                language: config.language.clone(),
            },
            modalities: vec!["text".to_string()],
        }
    }
}

/// Body of `response.create`: text only, outside any conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSettings {
    pub conversation: String,
    pub modalities: Vec<String>,
    pub instructions: String,
}

impl ResponseSettings {
    pub fn transcription_only(instructions: &str) -> Self {
        Self {
            conversation: "none".to_string(),
            modalities: vec!["text".to_string()],
            instructions: instructions.to_string(),
        }
    }
}

/// Control messages sent to the transcription service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum UpstreamCommand {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },

    #[serde(rename = "response.create")]
    ResponseCreate { response: ResponseSettings },

    /// Base64 PCM16 audio. Never log this variant's payload.
    #[serde(rename = "input_audio_buffer.append")]
    AppendAudio { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    Commit,
}

impl UpstreamCommand {
    pub fn append_audio(frame: &[u8]) -> Self {
        UpstreamCommand::AppendAudio {
            audio: BASE64_STANDARD.encode(frame),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            UpstreamCommand::SessionUpdate { .. } => "session.update",
            UpstreamCommand::ResponseCreate { .. } => "response.create",
            UpstreamCommand::AppendAudio { .. } => "input_audio_buffer.append",
            UpstreamCommand::Commit => "input_audio_buffer.commit",
        }
    }

    pub fn to_message(&self) -> Result<Message, BridgeError> {
        serde_json::to_string(self)
            .map(Message::Text)
            .map_err(|e| BridgeError::Send(format!("{}: {}", self.event_type(), e)))
    }
}
