//! # Shared Data Structures (Producer ↔ Collector)
//!
//! Defines the record and constants shared between the process emitting task
//! telemetry and the collector reconstructing it. All wire records use
//! `#[repr(C)]` so both ends agree on the in-memory layout that is copied
//! verbatim onto the socket.
//!
//! ## Frame Layout
//!
//! ```text
//! +-------------+----------------+-----------+-------------+------------+
//! | u16 length  | u16 schema     | TaskEvent | u64 namelen | name bytes |
//! +-------------+----------------+-----------+-------------+------------+
//! ```
//!
//! `length` counts the whole frame, including its own two bytes.
//!
//! ## Key Types
//!
//! - [`TaskEvent`] - Fixed-size execution record of one task instance

#![no_std]

use bytemuck::{Pod, Zeroable};

// ============================================================================
// Protocol Constants
// ============================================================================

/// Sentinel `uid`/`group_uid` meaning "no task" (a task without a parent group)
pub const INVALID_UID: u32 = u32::MAX;

/// Core index reported when the executing core could not be determined
pub const UNKNOWN_CORE: u8 = 0xFF;

/// Version of the positional event schema carried in every frame
///
/// Bump whenever a field of [`TaskEvent`] or the frame layout changes.
/// A collector drops connections whose frames carry another version.
pub const SCHEMA_VERSION: u16 = 1;

/// Size of the `u16` total-length prefix
pub const FRAME_HEADER_LEN: usize = 2;

/// Largest frame representable by the 16-bit length prefix
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Collector port used when none is configured
pub const DEFAULT_PORT: u16 = 9000;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Execution record of one task instance
///
/// Filled in by the producer's lifecycle hooks and transmitted exactly once,
/// when the task instance is destroyed.
///
/// **Memory Layout**: `#[repr(C)]`, 40 bytes, no implicit padding
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct TaskEvent {
    /// Engine-assigned identifier of the task instance
    pub uid: u32,

    /// Enclosing group, or [`INVALID_UID`] for a top-level task
    ///
    /// Set at most once, when the task is added to a group.
    pub group_uid: u32,

    /// Tick count captured right before execution
    pub started_at: u32,

    /// Tick count captured right after execution (meaningless before then)
    pub stopped_at: u32,

    /// OS thread that started executing the task
    pub started_on_thread: u64,

    /// OS thread that finished executing the task
    pub stopped_on_thread: u64,

    /// Logical core at start (0-254), [`UNKNOWN_CORE`] if unknown
    pub started_on_core: u8,

    /// Logical core at stop (0-254), [`UNKNOWN_CORE`] if unknown
    pub stopped_on_core: u8,

    /// Padding for 8-byte alignment
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 6],
}

impl TaskEvent {
    /// Create a record for a freshly constructed task
    #[must_use]
    pub const fn new(uid: u32) -> Self {
        Self {
            uid,
            group_uid: INVALID_UID,
            started_at: 0,
            stopped_at: 0,
            started_on_thread: 0,
            stopped_on_thread: 0,
            started_on_core: UNKNOWN_CORE,
            stopped_on_core: UNKNOWN_CORE,
            _padding: [0; 6],
        }
    }

    /// Whether this task belongs to a group
    #[must_use]
    pub const fn has_group(&self) -> bool {
        self.group_uid != INVALID_UID
    }

    /// Ticks elapsed between start and stop
    ///
    /// Tick counters are 32-bit and may wrap; the difference is taken modulo 2^32.
    #[must_use]
    pub const fn elapsed_ticks(&self) -> u32 {
        self.stopped_at.wrapping_sub(self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_event_layout() {
        assert_eq!(core::mem::size_of::<TaskEvent>(), 40);
        assert_eq!(core::mem::align_of::<TaskEvent>(), 8);
    }

    #[test]
    fn test_new_task_has_no_group() {
        let event = TaskEvent::new(7);
        assert_eq!(event.uid, 7);
        assert!(!event.has_group());
        assert_eq!(event.started_on_core, UNKNOWN_CORE);
    }

    #[test]
    fn test_elapsed_ticks_wraps() {
        let mut event = TaskEvent::new(1);
        event.started_at = u32::MAX - 9;
        event.stopped_at = 10;
        assert_eq!(event.elapsed_ticks(), 20);
    }
}
