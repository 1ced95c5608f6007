//! A small clock seam so the pairing engine's timeout logic can be
//! exercised deterministically in tests without sleeping.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock {
    /// Monotonic-enough seconds used for cache/message timeout accounting.
    fn monotonic_secs(&self) -> u64;
    /// Wall-clock seconds since the Unix epoch, written into message
    /// headers as `export_time`.
    fn wall_secs(&self) -> u32;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn monotonic_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn wall_secs(&self) -> u32 {
        self.monotonic_secs() as u32
    }
}

/// A manually advanced clock for tests. Cloning shares the same underlying
/// cell, so a test can keep a handle and advance the clock after handing a
/// clone to whatever it's driving.
#[derive(Clone)]
pub struct TestClock {
    now: Rc<Cell<u64>>,
}

impl TestClock {
    pub fn new(start: u64) -> Self {
        TestClock {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, t: u64) {
        self.now.set(t);
    }
}

impl Clock for TestClock {
    fn monotonic_secs(&self) -> u64 {
        self.now.get()
    }

    fn wall_secs(&self) -> u32 {
        self.now.get() as u32
    }
}
