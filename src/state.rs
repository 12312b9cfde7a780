//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor through
//! `web::Data<AppState>`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - Every actix worker thread gets its own clone of `AppState`; the `Arc`s make
//!   those clones point at the same configuration, store, and counter.
//!
//! ### AtomicUsize
//! - The active-session counter is touched from actor start/stop hooks on any
//!   worker thread, so a lock-free atomic is enough (no `RwLock` needed).

use crate::config::AppConfig;
use crate::observability::ObservabilityStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Effective configuration, fixed for the lifetime of the process.
    pub config: Arc<AppConfig>,

    /// Process-wide debug counters and recent-value rings.
    pub observability: Arc<ObservabilityStore>,

    /// When the server started (never changes, so no Arc needed)
    pub start_time: Instant,

    active_sessions: Arc<AtomicUsize>,
}

impl AppState {
    /// Create a new AppState with the given configuration.
    ///
    /// The observability rings are sized from `observability.ring_capacity`.
    pub fn new(config: AppConfig) -> Self {
        let observability = ObservabilityStore::new(config.observability.ring_capacity);
        Self {
            config: Arc::new(config),
            observability: Arc::new(observability),
            start_time: Instant::now(),
            active_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Called when a transcription WebSocket starts.
    pub fn increment_active_sessions(&self) -> usize {
        self.active_sessions.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Called when a transcription WebSocket stops.
    ///
    /// ## Safety check:
    /// Never goes below zero, even if a stop hook runs twice.
    pub fn decrement_active_sessions(&self) -> usize {
        let previous = self
            .active_sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
