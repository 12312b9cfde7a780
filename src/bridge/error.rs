//! Failure and exit types for bridge sessions.
//!
//! Pumps never panic or propagate errors to the client. They finish with a
//! [`PumpExit`] and the coordinator decides what to do with it.

use std::fmt;

/// Everything that can end (or prevent) a bridge session.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// No upstream credential configured.
    MissingCredential,
    /// TCP/TLS/WebSocket connect to upstream failed.
    Connect(String),
    /// Connected, but the session configuration could not be sent.
    Handshake(String),
    /// Sending to upstream failed.
    Send(String),
    /// Receiving from upstream failed.
    Receive(String),
    /// An upstream text frame was not valid JSON.
    Decode(String),
    /// Upstream sent nothing (not even a pong) within the keepalive deadline.
    KeepaliveTimeout,
    /// The client side of the session is gone.
    ClientGone,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::MissingCredential => write!(f, "OPENAI_API_KEY not configured"),
            BridgeError::Connect(msg) => write!(f, "OpenAI Realtime connect failed: {}", msg),
            BridgeError::Handshake(msg) => write!(f, "OpenAI Realtime handshake failed: {}", msg),
            BridgeError::Send(msg) => write!(f, "upstream send failed: {}", msg),
            BridgeError::Receive(msg) => write!(f, "upstream receive failed: {}", msg),
            BridgeError::Decode(msg) => write!(f, "invalid upstream event: {}", msg),
            BridgeError::KeepaliveTimeout => write!(f, "upstream keepalive timed out"),
            BridgeError::ClientGone => write!(f, "client disconnected"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// How a pump loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpExit {
    /// The pump's source stream ended normally.
    SourceClosed,
    /// The sibling pump or the session asked this one to stop.
    Cancelled,
    Failed(BridgeError),
}

impl PumpExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, PumpExit::Failed(_))
    }
}

impl fmt::Display for PumpExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PumpExit::SourceClosed => write!(f, "source closed"),
            PumpExit::Cancelled => write!(f, "cancelled"),
            PumpExit::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// What a pump should do after a recoverable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transient problem: log it and keep going.
    Continue,
    /// Expected and harmless: keep going quietly.
    Ignore,
    /// Stop the pump.
    Terminate,
}
