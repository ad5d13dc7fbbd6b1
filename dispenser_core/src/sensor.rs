//! Sticky sensor flags.
//!
//! Interrupt context (an `EdgeSink` callback) only ever sets a flag; the
//! control thread reads and clears it in one atomic swap. Two edges before a
//! poll coalesce into a single observation.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dispenser_traits::{EdgeSink, SensorLine};

#[derive(Debug, Default)]
struct Flags {
    home: AtomicBool,
    drop: AtomicBool,
}

/// Consumer side of the two sensor flags. Not `Clone`: there is one reader.
#[derive(Debug, Default)]
pub struct SensorEventSource {
    flags: Arc<Flags>,
}

/// Producer side handed to the hardware backend.
#[derive(Debug, Clone)]
pub struct EdgeTrigger {
    flags: Arc<Flags>,
}

impl SensorEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for interrupt callbacks. Any number may exist.
    pub fn trigger(&self) -> EdgeTrigger {
        EdgeTrigger {
            flags: self.flags.clone(),
        }
    }

    /// True if the home sensor fired since the last poll. Clears the flag.
    pub fn poll_home(&self) -> bool {
        self.flags.home.swap(false, Ordering::AcqRel)
    }

    /// True if the drop sensor fired since the last poll. Clears the flag.
    pub fn poll_drop(&self) -> bool {
        self.flags.drop.swap(false, Ordering::AcqRel)
    }
}

impl EdgeSink for EdgeTrigger {
    fn falling_edge(&self, line: SensorLine) {
        let flag = match line {
            SensorLine::Home => &self.flags.home,
            SensorLine::Drop => &self.flags.drop,
        };
        flag.store(true, Ordering::Release);
    }
}
