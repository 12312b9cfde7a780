//! Upstream event model.
//!
//! The transcription service sends JSON objects tagged by `type` whose shape
//! varies by provider and API version. Known tags become [`EventKind`]s; any
//! other tag is kept as [`UpstreamEvent::Unrecognized`] with its raw payload.

use super::error::Disposition;
use serde_json::Value;

/// Event tags the bridge knows how to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    OutputTextDelta,
    AudioTranscriptDelta,
    TranscriptionDelta,
    ItemDelta,
    InputTranscriptionCompleted,
    TranscriptionCompleted,
    OutputTextDone,
    AudioTranscriptCompleted,
    Error,
}

impl EventKind {
    const ALL: [EventKind; 9] = [
        EventKind::OutputTextDelta,
        EventKind::AudioTranscriptDelta,
        EventKind::TranscriptionDelta,
        EventKind::ItemDelta,
        EventKind::InputTranscriptionCompleted,
        EventKind::TranscriptionCompleted,
        EventKind::OutputTextDone,
        EventKind::AudioTranscriptCompleted,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OutputTextDelta => "response.output_text.delta",
            EventKind::AudioTranscriptDelta => "response.audio_transcript.delta",
            EventKind::TranscriptionDelta => "transcription.delta",
            EventKind::ItemDelta => "conversation.item.delta",
            EventKind::InputTranscriptionCompleted => {
                "conversation.item.input_audio_transcription.completed"
            }
            EventKind::TranscriptionCompleted => "transcription.completed",
            EventKind::OutputTextDone => "response.output_text.done",
            EventKind::AudioTranscriptCompleted => "response.audio_transcript.completed",
            EventKind::Error => "error",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }

    /// Delta-style events carrying a fragment of the utterance in progress.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            EventKind::OutputTextDelta
                | EventKind::AudioTranscriptDelta
                | EventKind::TranscriptionDelta
                | EventKind::ItemDelta
        )
    }

    /// Completion-style events carrying a finished utterance.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            EventKind::InputTranscriptionCompleted
                | EventKind::TranscriptionCompleted
                | EventKind::OutputTextDone
                | EventKind::AudioTranscriptCompleted
        )
    }
}

/// One decoded upstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    Known { kind: EventKind, payload: Value },
    Unrecognized { event_type: String, payload: Value },
}

impl UpstreamEvent {
    /// Decode a text frame. Only invalid JSON is an error; any JSON value is accepted.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Value>(text).map(Self::from_value)
    }

    pub fn from_value(payload: Value) -> Self {
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match EventKind::from_tag(&event_type) {
            Some(kind) => UpstreamEvent::Known { kind, payload },
            None => UpstreamEvent::Unrecognized { event_type, payload },
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            UpstreamEvent::Known { kind, .. } => kind.as_str(),
            UpstreamEvent::Unrecognized { event_type, .. } => event_type,
        }
    }

    pub fn kind(&self) -> Option<EventKind> {
        match self {
            UpstreamEvent::Known { kind, .. } => Some(*kind),
            UpstreamEvent::Unrecognized { .. } => None,
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            UpstreamEvent::Known { payload, .. } | UpstreamEvent::Unrecognized { payload, .. } => {
                payload
            }
        }
    }

    /// Error details if this is an upstream `error` event.
    pub fn error_detail(&self) -> Option<UpstreamErrorDetail> {
        match self {
            UpstreamEvent::Known {
                kind: EventKind::Error,
                payload,
            } => Some(UpstreamErrorDetail::from_payload(payload)),
            _ => None,
        }
    }
}

/// Error code reported when a commit arrives with too little buffered audio.
pub const COMMIT_EMPTY_CODE: &str = "input_audio_buffer_commit_empty";

/// Error code reported once the upstream session hits its lifetime limit.
pub const SESSION_EXPIRED_CODE: &str = "session_expired";

/// `error` object of an upstream error event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpstreamErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl UpstreamErrorDetail {
    fn from_payload(payload: &Value) -> Self {
        let error = payload.get("error");
        let field = |name: &str| {
            error
                .and_then(|e| e.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            code: field("code"),
            message: field("message"),
        }
    }

    /// Empty-buffer commit rejections are expected under low audio throughput.
    pub fn is_commit_empty(&self) -> bool {
        self.code.as_deref() == Some(COMMIT_EMPTY_CODE)
            || self
                .message
                .as_deref()
                .is_some_and(|m| m.to_ascii_lowercase().contains("buffer too small"))
    }

    pub fn disposition(&self) -> Disposition {
        if self.is_commit_empty() {
            Disposition::Ignore
        } else if self.code.as_deref() == Some(SESSION_EXPIRED_CODE) {
            Disposition::Terminate
        } else {
            Disposition::Continue
        }
    }
}
