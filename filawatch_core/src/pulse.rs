//! Interrupt-adjacent pulse plumbing.
//!
//! The movement sensor fires from an interrupt-style context; ring-buffer and
//! accumulator state must never be mutated from there. The edge source only
//! increments [`PulseCounter`]; the single consuming loop drains it and calls
//! the tracker's pulse entry point once per observed edge.
//!
//! Safety: each `EdgeListener` spawns exactly one thread that is shut down
//! when the listener is dropped, preventing thread leaks.

use filawatch_traits::EdgeSource;
use filawatch_traits::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Sentinel for "no edge observed yet".
const NO_EDGE_YET: u64 = u64::MAX;

/// Single-writer atomic pulse counter.
///
/// The edge context calls [`record`](Self::record); the consuming loop calls
/// [`drain`](Self::drain). Every recorded edge is returned by exactly one
/// drain.
#[derive(Debug)]
pub struct PulseCounter {
    count: AtomicU32,
    last_edge_ms: AtomicU64,
}

impl Default for PulseCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseCounter {
    pub fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            last_edge_ms: AtomicU64::new(NO_EDGE_YET),
        }
    }

    /// Record one edge. Safe to call from the edge context.
    pub fn record(&self, now_ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.last_edge_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Take all edges recorded since the previous drain.
    pub fn drain(&self) -> u32 {
        self.count.swap(0, Ordering::Relaxed)
    }

    /// Edges currently pending (not yet drained).
    pub fn pending(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Timestamp of the most recent edge, if any was ever recorded.
    pub fn last_edge_ms(&self) -> Option<u64> {
        match self.last_edge_ms.load(Ordering::Relaxed) {
            NO_EDGE_YET => None,
            ms => Some(ms),
        }
    }
}

/// Background edge listener: owns the [`EdgeSource`] on a dedicated thread
/// and feeds the shared counter.
pub struct EdgeListener {
    counter: Arc<PulseCounter>,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl EdgeListener {
    pub fn spawn<E: EdgeSource + Send + 'static, C: Clock + Send + Sync + 'static>(
        mut source: E,
        timeout: Duration,
        clock: C,
    ) -> Self {
        let counter = Arc::new(PulseCounter::new());
        let counter_clone = counter.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                // Immediate shutdown check (lock-free atomic)
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("edge listener received shutdown signal");
                    break;
                }

                match source.wait_edge(timeout) {
                    Ok(true) => {
                        counter_clone.record(clock.ms_since(epoch));
                    }
                    Ok(false) => {
                        // Timeout with no edge; the consuming loop's grace
                        // handling covers the silence.
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "edge source read failed");
                    }
                }
                // No sleep here: next iteration blocks in wait_edge() again.
            }
            tracing::trace!("edge listener thread exiting cleanly");
        });

        Self {
            counter,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    pub fn counter(&self) -> &Arc<PulseCounter> {
        &self.counter
    }

    /// Milliseconds since the last observed edge, given the caller's clock
    /// reading on the listener's epoch.
    pub fn silent_for(&self, now_ms: u64) -> Option<u64> {
        self.counter
            .last_edge_ms()
            .map(|last| now_ms.saturating_sub(last))
    }
}

impl Drop for EdgeListener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // The thread exits after the in-flight wait_edge() returns, bounded
        // by the source timeout.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("edge listener thread joined");
                }
                Err(e) => {
                    tracing::warn!(?e, "edge listener thread panicked during shutdown");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn drain_returns_each_edge_exactly_once() {
        let c = PulseCounter::new();
        for i in 0..5 {
            c.record(i * 10);
        }
        assert_eq!(c.pending(), 5);
        assert_eq!(c.drain(), 5);
        assert_eq!(c.drain(), 0);
        c.record(100);
        assert_eq!(c.drain(), 1);
    }

    #[test]
    fn last_edge_tracks_latest_timestamp() {
        let c = PulseCounter::new();
        assert_eq!(c.last_edge_ms(), None);
        c.record(42);
        c.record(99);
        assert_eq!(c.last_edge_ms(), Some(99));
        // Draining does not forget when the last edge happened.
        let _ = c.drain();
        assert_eq!(c.last_edge_ms(), Some(99));
    }

    #[test]
    fn listener_counts_edges_and_shuts_down() {
        struct NEdges(u32);
        impl EdgeSource for NEdges {
            fn wait_edge(
                &mut self,
                _timeout: Duration,
            ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
                if self.0 > 0 {
                    self.0 -= 1;
                    Ok(true)
                } else {
                    std::thread::sleep(Duration::from_millis(1));
                    Ok(false)
                }
            }
        }

        let listener = EdgeListener::spawn(
            NEdges(3),
            Duration::from_millis(5),
            filawatch_traits::MonotonicClock::new(),
        );
        // Wait for the listener thread to observe all three edges.
        let deadline = Instant::now() + Duration::from_secs(1);
        while listener.counter().pending() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(listener.counter().drain(), 3);
        drop(listener); // joins the thread
    }
}
