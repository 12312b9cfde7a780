//! # Realtime Transcription Bridge
//!
//! Relays browser microphone audio to a realtime transcription service and
//! streams transcripts back.
//!
//! ## Module Organization:
//! - `protocol`: JSON messages on both sockets
//! - `events`: typed view of upstream events
//! - `classifier`: partial/final detection and text extraction
//! - `upstream`: connecting and configuring the upstream session
//! - `pumps`: the two relay loops
//! - `session`: per-connection state machine tying it all together

pub mod classifier;
pub mod error;
pub mod events;
pub mod protocol;
pub mod pumps;
pub mod session;
pub mod upstream;

pub use protocol::TranscriptEvent;
pub use session::BridgeSession;
