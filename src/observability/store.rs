//! # Observability Store
//!
//! Volatile, in-memory counters and recent-history rings describing the traffic
//! flowing through the bridge. One store is created at process start and shared
//! (via `Arc`) between the HTTP debug handlers and every bridge session.
//!
//! ## Streams:
//! - **frontend chunks**: binary audio frames received from browser clients
//! - **upstream chunks**: audio frames forwarded to the transcription service
//! - **text deltas / finals**: transcript text received from upstream
//! - **frontend text events**: events emitted to clients plus upstream event-type tags
//!
//! ## Reset semantics:
//! `reset()` swaps in a freshly built `Observations` under the write lock, so a
//! reader either sees the old state or the fully reset one, never a mix.

use super::ring::ObservationRing;
use serde::Serialize;
use serde_json::Value;
use std::sync::{PoisonError, RwLock};

/// Everything the store records, replaced as a unit on reset.
#[derive(Debug, Clone, Serialize)]
pub struct Observations {
    pub frontend_chunk_count: u64,
    pub frontend_chunk_sizes: ObservationRing<usize>,
    pub upstream_chunk_count: u64,
    pub upstream_chunk_sizes: ObservationRing<usize>,
    pub upstream_text_deltas: ObservationRing<String>,
    pub upstream_text_finals: ObservationRing<String>,
    pub frontend_text_events: ObservationRing<Value>,
}

impl Observations {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            frontend_chunk_count: 0,
            frontend_chunk_sizes: ObservationRing::new(capacity),
            upstream_chunk_count: 0,
            upstream_chunk_sizes: ObservationRing::new(capacity),
            upstream_text_deltas: ObservationRing::new(capacity),
            upstream_text_finals: ObservationRing::new(capacity),
            frontend_text_events: ObservationRing::new(capacity),
        }
    }
}

/// Count plus recent sizes for one chunk stream (`/debug/*-chunks`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkSnapshot {
    pub count: u64,
    pub recent_sizes: Vec<usize>,
}

/// Recent upstream transcript text (`/debug/openai-text`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSnapshot {
    pub deltas: Vec<String>,
    pub finals: Vec<String>,
}

/// Thread-safe owner of the current `Observations`.
#[derive(Debug)]
pub struct ObservabilityStore {
    inner: RwLock<Observations>,
    capacity: usize,
}

impl ObservabilityStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Observations::with_capacity(capacity)),
            capacity,
        }
    }

    /// Run `f` against the live observations under the write lock.
    ///
    /// Poisoning is ignored: a panic elsewhere must not take observability down with it.
    fn update(&self, f: impl FnOnce(&mut Observations)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }

    fn read<R>(&self, f: impl FnOnce(&Observations) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn record_frontend_chunk(&self, size: usize) {
        self.update(|obs| {
            obs.frontend_chunk_count += 1;
            obs.frontend_chunk_sizes.push(size);
        });
    }

    pub fn record_upstream_chunk(&self, size: usize) {
        self.update(|obs| {
            obs.upstream_chunk_count += 1;
            obs.upstream_chunk_sizes.push(size);
        });
    }

    pub fn record_text_delta(&self, text: &str) {
        self.update(|obs| obs.upstream_text_deltas.push(text.to_string()));
    }

    pub fn record_text_final(&self, text: &str) {
        self.update(|obs| obs.upstream_text_finals.push(text.to_string()));
    }

    /// Record an emitted client event or an `{"etype": ...}` marker.
    pub fn record_frontend_event(&self, event: Value) {
        self.update(|obs| obs.frontend_text_events.push(event));
    }

    pub fn frontend_chunks(&self) -> ChunkSnapshot {
        self.read(|obs| ChunkSnapshot {
            count: obs.frontend_chunk_count,
            recent_sizes: obs.frontend_chunk_sizes.snapshot(),
        })
    }

    pub fn upstream_chunks(&self) -> ChunkSnapshot {
        self.read(|obs| ChunkSnapshot {
            count: obs.upstream_chunk_count,
            recent_sizes: obs.upstream_chunk_sizes.snapshot(),
        })
    }

    pub fn upstream_text(&self) -> TextSnapshot {
        self.read(|obs| TextSnapshot {
            deltas: obs.upstream_text_deltas.snapshot(),
            finals: obs.upstream_text_finals.snapshot(),
        })
    }

    pub fn frontend_events(&self) -> Vec<Value> {
        self.read(|obs| obs.frontend_text_events.snapshot())
    }

    /// Full copy of everything currently recorded.
    #[cfg(test)]
    pub fn snapshot(&self) -> Observations {
        self.read(Observations::clone)
    }

    /// Replace all observations with an empty set.
    pub fn reset(&self) {
        let fresh = Observations::with_capacity(self.capacity);
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = fresh;
    }
}

impl Default for ObservabilityStore {
    fn default() -> Self {
        Self::new(super::ring::DEFAULT_RING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn populated(capacity: usize) -> ObservabilityStore {
        let store = ObservabilityStore::new(capacity);
        for size in [640, 320, 960] {
            store.record_frontend_chunk(size);
            store.record_upstream_chunk(size);
        }
        store.record_text_delta("hel");
        store.record_text_final("hello");
        store.record_frontend_event(json!({"etype": "response.output_text.delta"}));
        store
    }

    #[test]
    fn test_records_chunks() {
        let store = populated(50);
        let frontend = store.frontend_chunks();
        assert_eq!(frontend.count, 3);
        assert_eq!(frontend.recent_sizes, vec![640, 320, 960]);
        assert_eq!(store.upstream_chunks(), frontend);
    }

    #[test]
    fn test_counts_exceed_ring_capacity() {
        let store = ObservabilityStore::new(2);
        for size in 1..=5 {
            store.record_frontend_chunk(size);
        }
        let snap = store.frontend_chunks();
        assert_eq!(snap.count, 5);
        assert_eq!(snap.recent_sizes, vec![4, 5]);
    }

    #[test]
    fn test_records_text_and_events() {
        let store = populated(50);
        let text = store.upstream_text();
        assert_eq!(text.deltas, vec!["hel".to_string()]);
        assert_eq!(text.finals, vec!["hello".to_string()]);
        assert_eq!(
            store.frontend_events(),
            vec![json!({"etype": "response.output_text.delta"})]
        );
    }

    #[test]
    fn test_reset_clears_everything() {
        let store = populated(50);
        store.reset();

        let snap = store.snapshot();
        assert_eq!(snap.frontend_chunk_count, 0);
        assert_eq!(snap.upstream_chunk_count, 0);
        assert!(snap.frontend_chunk_sizes.is_empty());
        assert!(snap.upstream_chunk_sizes.is_empty());
        assert!(snap.upstream_text_deltas.is_empty());
        assert!(snap.upstream_text_finals.is_empty());
        assert!(snap.frontend_text_events.is_empty());
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let store = populated(2);
        store.reset();
        for size in 0..4 {
            store.record_upstream_chunk(size);
        }
        assert_eq!(store.upstream_chunks().recent_sizes, vec![2, 3]);
    }

    #[test]
    fn test_concurrent_recording() {
        let store = Arc::new(ObservabilityStore::new(10));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.record_frontend_chunk(2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.frontend_chunks().count, 400);
        assert_eq!(store.frontend_chunks().recent_sizes.len(), 10);
    }
}
