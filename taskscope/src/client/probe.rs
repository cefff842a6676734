//! Per-task execution record
//!
//! A [`TaskProbe`] is owned by whatever wraps one engine task instance. The
//! engine's hooks mutate it in order (group add, pre-execute, post-execute),
//! and [`TaskProbe::finish`] consumes it to send the record exactly once.

use log::warn;
use std::io::Write;

use taskscope_common::TaskEvent;

use super::EventClient;
use crate::clock::{current_core, current_thread_id, Clock};
use crate::domain::{ClientError, TaskUid};

/// Time and placement captured at one execution boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionStamp {
    pub ticks: u32,
    pub thread: u64,
    pub core: u8,
}

impl ExecutionStamp {
    /// Sample the clock, thread and core of the calling thread
    pub fn capture<C: Clock + ?Sized>(clock: &C) -> Self {
        Self { ticks: clock.now(), thread: current_thread_id(), core: current_core() }
    }
}

/// Execution record of one task instance, plus its name
#[derive(Debug, Clone)]
pub struct TaskProbe {
    event: TaskEvent,
    name: String,
}

impl TaskProbe {
    /// Mirror a task the engine just created
    pub fn new(uid: TaskUid, name: impl Into<String>) -> Self {
        Self { event: TaskEvent::new(uid.0), name: name.into() }
    }

    #[must_use]
    pub fn uid(&self) -> TaskUid {
        TaskUid(self.event.uid)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn event(&self) -> &TaskEvent {
        &self.event
    }

    /// Record the enclosing group
    ///
    /// The group is set at most once; later calls are ignored and return
    /// `false`.
    pub fn added_to_group(&mut self, group: TaskUid) -> bool {
        if self.event.has_group() {
            warn!(
                "{} already belongs to Task#{}, ignoring move to {group}",
                self.uid(),
                self.event.group_uid
            );
            return false;
        }
        self.event.group_uid = group.0;
        true
    }

    pub fn pre_execute(&mut self, stamp: ExecutionStamp) {
        self.event.started_at = stamp.ticks;
        self.event.started_on_thread = stamp.thread;
        self.event.started_on_core = stamp.core;
    }

    pub fn post_execute(&mut self, stamp: ExecutionStamp) {
        self.event.stopped_at = stamp.ticks;
        self.event.stopped_on_thread = stamp.thread;
        self.event.stopped_on_core = stamp.core;
    }

    /// Send the finished record
    ///
    /// # Errors
    /// Propagates the client's encode or transport error; the record is lost.
    pub fn finish<W: Write>(self, client: &EventClient<W>) -> Result<(), ClientError> {
        client.send_task(&self.event, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_event;
    use crate::domain::TickFrequency;
    use std::sync::atomic::{AtomicU32, Ordering};
    use taskscope_common::INVALID_UID;

    /// Clock that advances by 50 ticks per reading
    struct StepClock(AtomicU32);

    impl Clock for StepClock {
        fn now(&self) -> u32 {
            self.0.fetch_add(50, Ordering::Relaxed)
        }

        fn frequency(&self) -> TickFrequency {
            TickFrequency(1000)
        }
    }

    #[test]
    fn test_hooks_fill_event() {
        let clock = StepClock(AtomicU32::new(100));
        let mut probe = TaskProbe::new(TaskUid(11), "stage1");
        assert_eq!(probe.event().group_uid, INVALID_UID);

        assert!(probe.added_to_group(TaskUid(10)));
        probe.pre_execute(ExecutionStamp::capture(&clock));
        probe.post_execute(ExecutionStamp::capture(&clock));

        let event = probe.event();
        assert_eq!(event.group_uid, 10);
        assert_eq!((event.started_at, event.stopped_at), (100, 150));
        assert_eq!(event.started_on_thread, current_thread_id());
        assert_eq!(event.stopped_on_thread, current_thread_id());
    }

    #[test]
    fn test_group_is_set_once() {
        let mut probe = TaskProbe::new(TaskUid(3), "child");
        assert!(probe.added_to_group(TaskUid(1)));
        assert!(!probe.added_to_group(TaskUid(2)));
        assert_eq!(probe.event().group_uid, 1);
    }

    #[test]
    fn test_finish_sends_event_and_name() {
        let client = EventClient::new(Vec::new());
        let mut probe = TaskProbe::new(TaskUid(1), "compute");
        probe.pre_execute(ExecutionStamp { ticks: 100, thread: 7, core: 0 });
        probe.post_execute(ExecutionStamp { ticks: 350, thread: 8, core: 1 });
        probe.finish(&client).unwrap();

        let bytes = client.into_inner();
        let (event, name) = decode_event(&bytes).unwrap();
        assert_eq!(name, "compute");
        assert_eq!(event.elapsed_ticks(), 250);
        assert_eq!((event.started_on_core, event.stopped_on_core), (0, 1));
    }
}
