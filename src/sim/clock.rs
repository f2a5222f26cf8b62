//! Millisecond clocks
//!
//! Everything time-dependent reads a `Clock`, so a session can run on the
//! wall clock in the browser or on a manually advanced clock in tests.

use std::cell::Cell;
use std::rc::Rc;

pub trait Clock {
    /// Current time in milliseconds; never goes backwards
    fn now_ms(&self) -> u64;
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self(Rc::new(Cell::new(start_ms)))
    }

    /// Jump to `ms` (ignored if it is in the past)
    pub fn set(&self, ms: u64) {
        if ms > self.0.get() {
            self.0.set(ms);
        }
    }

    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

/// Wall clock in Unix milliseconds
#[derive(Debug, Clone)]
pub struct SystemClock {
    #[cfg(not(target_arch = "wasm32"))]
    origin_ms: u64,
    #[cfg(not(target_arch = "wasm32"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new() -> Self {
        let origin_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            origin_ms,
            start: std::time::Instant::now(),
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub fn new() -> Self {
        Self {}
    }
}

impl Clock for SystemClock {
    // Anchored to the epoch once, then monotonic
    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> u64 {
        self.origin_ms + self.start.elapsed().as_millis() as u64
    }

    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }
}
