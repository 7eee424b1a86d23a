//! Shared read-mostly service state.
//!
//! One composite block of atomics handed to every task at construction;
//! there is no process-wide singleton. Each counter has a single writer: the sampler
//! owns `captured` and `dropped`, the publisher owns `published`, the bus
//! callback owns `commands_dropped`, the dispatcher owns the sample rate.
//! All counter traffic uses relaxed ordering; the values are observational.
//!
//! The block also anchors the monotonic clock epoch: every timestamp in the
//! system is `now_ns()`, nanoseconds since process start.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

/// Shared service state.
pub struct SharedState {
    epoch: Instant,

    running: AtomicBool,
    mqtt_connected: AtomicBool,
    controllers_connected: AtomicBool,

    sample_rate_hz: AtomicU32,
    sample_interval_ns: AtomicU64,

    captured: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    commands_dropped: AtomicU64,
}

impl SharedState {
    /// Create the block with the given startup sample rate. The running
    /// flag starts set; the connection flags start clear.
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            epoch: Instant::now(),
            running: AtomicBool::new(true),
            mqtt_connected: AtomicBool::new(false),
            controllers_connected: AtomicBool::new(false),
            sample_rate_hz: AtomicU32::new(sample_rate_hz),
            sample_interval_ns: AtomicU64::new(interval_for(sample_rate_hz)),
            captured: AtomicU64::new(0),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            commands_dropped: AtomicU64::new(0),
        }
    }

    /// Monotonic time [ns since process start].
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    // ── Lifecycle ──

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag; every task loop exits at its next cadence.
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    // ── Connection flags ──

    pub fn set_mqtt_connected(&self, connected: bool) {
        self.mqtt_connected.store(connected, Ordering::SeqCst);
    }

    pub fn mqtt_connected(&self) -> bool {
        self.mqtt_connected.load(Ordering::SeqCst)
    }

    pub fn set_controllers_connected(&self, connected: bool) {
        self.controllers_connected.store(connected, Ordering::SeqCst);
    }

    pub fn controllers_connected(&self) -> bool {
        self.controllers_connected.load(Ordering::SeqCst)
    }

    // ── Sample rate ──

    /// Change the sample rate [Hz]. The interval is derived and stored
    /// alongside; the sampler reloads it at the top of its next tick.
    pub fn set_sample_rate(&self, hz: u32) {
        self.sample_rate_hz.store(hz, Ordering::SeqCst);
        self.sample_interval_ns
            .store(interval_for(hz), Ordering::SeqCst);
    }

    #[inline]
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn sample_interval_ns(&self) -> u64 {
        self.sample_interval_ns.load(Ordering::SeqCst)
    }

    // ── Counters (single writer each, relaxed) ──

    #[inline]
    pub fn add_captured(&self, n: u64) {
        self.captured.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_published(&self, n: u64) {
        self.published.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_commands_dropped(&self, n: u64) {
        self.commands_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn commands_dropped(&self) -> u64 {
        self.commands_dropped.load(Ordering::Relaxed)
    }
}

#[inline]
const fn interval_for(hz: u32) -> u64 {
    debug_assert!(hz > 0);
    1_000_000_000 / hz as u64
}
