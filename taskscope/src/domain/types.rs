//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep task identifiers, core indices and tick rates
//! from being mixed up with the raw integers of the wire record.

use std::fmt;

use taskscope_common::{INVALID_UID, UNKNOWN_CORE};

/// Task instance identifier assigned by the scheduling engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskUid(pub u32);

impl TaskUid {
    /// The "no task" sentinel, used for tasks without a parent group
    pub const INVALID: Self = Self(INVALID_UID);

    /// Returns true unless this is the [`TaskUid::INVALID`] sentinel
    #[must_use]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for TaskUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Task#{}", self.0)
        } else {
            write!(f, "Task#<none>")
        }
    }
}

impl From<u32> for TaskUid {
    fn from(uid: u32) -> Self {
        Self(uid)
    }
}

/// Logical CPU core index
///
/// `0xFF` means the core could not be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoreId(pub u8);

impl CoreId {
    pub const UNKNOWN: Self = Self(UNKNOWN_CORE);

    #[must_use]
    pub fn is_known(self) -> bool {
        self != Self::UNKNOWN
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "CPU:{}", self.0)
        } else {
            write!(f, "CPU:?")
        }
    }
}

/// Tick rate of a producer clock, in ticks per second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickFrequency(pub u64);

impl TickFrequency {
    /// Microsecond ticks, the rate of [`crate::clock::MonotonicClock`]
    pub const MICROS: Self = Self(1_000_000);

    /// Convert the ticks elapsed between `start` and `stop` to milliseconds
    ///
    /// Ticks are 32-bit counters; the delta is taken with wrapping arithmetic.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_millis(self, start: u32, stop: u32) -> f64 {
        let delta = stop.wrapping_sub(start);
        f64::from(delta) * 1000.0 / self.0 as f64
    }
}

impl Default for TickFrequency {
    fn default() -> Self {
        Self::MICROS
    }
}

impl fmt::Display for TickFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}
