//! Injectable time source.
//!
//! Every component that needs "now" takes a [`Clock`] rather than calling
//! `Utc::now()` directly, so that booking-window validation and reminder
//! scheduling can be driven deterministically in tests.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Supplies the current UTC instant.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared handle type used throughout the engine.
pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
