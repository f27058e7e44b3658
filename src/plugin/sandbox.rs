//! Per-execution sandbox state
//!
//! Everything here is owned by exactly one execution:
//! - Resource limits applied to the interpreter
//! - The in-flight call set used to cancel outstanding bridge calls
//! - The capture slot the entry point's result is written into
//! - The watchdog that enforces the wall-clock deadline

use deno_core::v8::IsolateHandle;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle of one sandboxed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Idle,
    Initializing,
    Loading,
    Invoking,
    Capturing,
    Terminated,
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionPhase::Idle => "idle",
            ExecutionPhase::Initializing => "initializing",
            ExecutionPhase::Loading => "loading",
            ExecutionPhase::Invoking => "invoking",
            ExecutionPhase::Capturing => "capturing",
            ExecutionPhase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Resource limits for one interpreter instance
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Wall-clock bound for the whole execution
    pub execution_timeout: Duration,

    /// V8 heap ceiling
    pub max_heap_bytes: usize,
}

impl ResourceLimits {
    pub fn new(execution_timeout: Duration) -> Self {
        Self {
            execution_timeout,
            ..Self::default()
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(60),
            max_heap_bytes: 256 * 1024 * 1024, // 256 MB
        }
    }
}

/// Outstanding native calls of one execution
///
/// Cancelling the set resolves every registered call immediately, and any
/// call registered afterwards resolves as cancelled without running.
#[derive(Clone, Default)]
pub struct InFlightCalls {
    token: CancellationToken,
    outstanding: Arc<AtomicUsize>,
}

impl InFlightCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive `call` unless the set is cancelled first. Returns `None` on cancellation.
    pub async fn run<F, T>(&self, call: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        if self.token.is_cancelled() {
            return None;
        }

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let _guard = OutstandingGuard(Arc::clone(&self.outstanding));

        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            value = call => Some(value),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Cancel everything still running; returns how many calls were outstanding
    pub fn cancel_all(&self) -> usize {
        let pending = self.outstanding();
        self.token.cancel();
        pending
    }

    /// Resolves once the set has been cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

struct OutstandingGuard(Arc<AtomicUsize>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Terminal value written by the script-side invoker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    /// Entry point resolved; payload is the JSON-serialized value
    Resolved(String),
    /// Script declared no entry point
    Missing,
    /// Entry point threw or rejected
    Rejected(String),
}

/// Single-assignment result slot
///
/// Only the first write is kept. Once closed, writes are discarded so a
/// promise settling after the deadline cannot leak into the outcome.
#[derive(Clone, Default)]
pub struct CaptureSlot {
    value: Arc<Mutex<Option<Captured>>>,
    closed: Arc<AtomicBool>,
    filled: Arc<Notify>,
}

impl CaptureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the result; returns false if a value was already captured or the slot is closed
    pub fn capture(&self, captured: Captured) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            debug!("Discarding result captured after close");
            return false;
        }
        let Ok(mut slot) = self.value.lock() else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(captured);
        self.filled.notify_one();
        true
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_filled(&self) -> bool {
        self.value.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Resolves once a value has been captured
    pub async fn filled(&self) {
        while !self.is_filled() {
            self.filled.notified().await;
        }
    }

    pub fn take(&self) -> Option<Captured> {
        self.value.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Wall-clock deadline for one execution
///
/// Runs on its own OS thread so it fires even while the interpreter is stuck
/// in a synchronous loop. On expiry it cancels the in-flight set and
/// terminates the isolate.
pub struct Watchdog {
    done: Option<mpsc::Sender<()>>,
    fired: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Watchdog {
    pub fn arm(
        label: &str,
        timeout: Duration,
        isolate: IsolateHandle,
        calls: InFlightCalls,
    ) -> std::io::Result<Self> {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_flag = Arc::clone(&fired);
        let label_owned = label.to_string();

        let thread = thread::Builder::new()
            .name(format!("watchdog-{}", label))
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                    fired_flag.store(true, Ordering::SeqCst);
                    let cancelled = calls.cancel_all();
                    isolate.terminate_execution();
                    warn!(
                        scraper_id = %label_owned,
                        timeout_ms = timeout.as_millis() as u64,
                        cancelled_calls = cancelled,
                        "Scraper execution exceeded deadline"
                    );
                }
            })?;

        Ok(Self {
            done: Some(done_tx),
            fired,
            thread: Some(thread),
        })
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Stop the watchdog; returns whether it had already fired
    pub fn disarm(mut self) -> bool {
        self.stop();
        self.fired()
    }

    fn stop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_flight_calls_cancel_outstanding() {
        let calls = InFlightCalls::new();
        let pending = {
            let calls = calls.clone();
            tokio::spawn(async move {
                calls
                    .run(async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        "finished"
                    })
                    .await
            })
        };

        while calls.outstanding() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.cancel_all(), 1);
        assert_eq!(pending.await.unwrap(), None);
        assert_eq!(calls.outstanding(), 0);

        // Calls after cancellation never start
        assert_eq!(calls.run(async { 1 }).await, None);
    }

    #[tokio::test]
    async fn test_in_flight_calls_complete_normally() {
        let calls = InFlightCalls::new();
        assert_eq!(calls.run(async { 5 }).await, Some(5));
        assert_eq!(calls.outstanding(), 0);
    }

    #[test]
    fn test_capture_slot_first_write_wins() {
        let slot = CaptureSlot::new();
        assert!(slot.capture(Captured::Resolved("[1]".into())));
        assert!(!slot.capture(Captured::Resolved("[2]".into())));
        assert!(!slot.capture(Captured::Rejected("late".into())));
        assert_eq!(slot.take(), Some(Captured::Resolved("[1]".into())));
    }

    #[tokio::test]
    async fn test_capture_slot_signals_fill() {
        let slot = CaptureSlot::new();
        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.filled().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        assert!(slot.capture(Captured::Missing));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake on capture")
            .unwrap();

        // Already filled: resolves immediately
        tokio::time::timeout(Duration::from_millis(100), slot.filled())
            .await
            .unwrap();
    }

    #[test]
    fn test_capture_slot_discards_after_close() {
        let slot = CaptureSlot::new();
        slot.close();
        assert!(!slot.capture(Captured::Resolved("[]".into())));
        assert!(!slot.is_filled());
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_resource_limits() {
        let limits = ResourceLimits::new(Duration::from_secs(5));
        assert_eq!(limits.execution_timeout, Duration::from_secs(5));
        assert_eq!(limits.max_heap_bytes, ResourceLimits::default().max_heap_bytes);
        assert_eq!(ExecutionPhase::Capturing.to_string(), "capturing");
    }
}
