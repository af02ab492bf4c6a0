use std::cell::Cell;

use serde::{Deserialize, Serialize};

/// Millisecond wall-clock stamp attached to outgoing work.
///
/// Used only for ordering decisions (newer wins), never for measuring network
/// timing, so "monotonic enough" wall time is sufficient.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Milliseconds elapsed since `earlier`, clamped to zero if time went
    /// backwards between the two readings.
    pub fn saturating_elapsed_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Wall clock: `Date.now()` on wasm, `SystemTime` elsewhere.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        #[cfg(target_arch = "wasm32")]
        {
            Timestamp(js_sys::Date::now() as u64)
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            let ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            Timestamp(ms)
        }
    }
}

/// Hand-advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ms.get())
    }
}
