//! Online reconstruction of the task hierarchy
//!
//! Each connection keeps the last record and the name of every task it has
//! seen. A task's full name is its name prefixed with the names of every
//! ancestor group whose record has already arrived, slash-separated.
//!
//! Records arrive when tasks are destroyed, so a group usually arrives after
//! its children. Until it does, children resolve to shorter names; this is
//! not an error. [`Reconstructor::apply_resolving`] also returns fresh reports
//! for every known descendant whose name the new frame completed, and
//! [`Reconstructor::finish`] re-resolves everything once the connection is
//! done.
//!
//! Nothing is ever evicted: state grows with the number of distinct tasks on
//! the connection.

use log::warn;
use std::collections::{HashMap, HashSet, VecDeque};

use taskscope_common::TaskEvent;

use crate::domain::{CoreId, TaskUid, TickFrequency};

/// Duration and placement of one task, as resolved at report time
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub uid: TaskUid,
    /// Enclosing group, if any
    pub group: Option<TaskUid>,
    /// Name prefixed with known ancestor group names
    pub full_name: String,
    pub duration_ms: f64,
    /// Start tick on the producer's clock
    pub started_at: u32,
    pub started_on_thread: u64,
    pub stopped_on_thread: u64,
    pub started_on_core: CoreId,
    pub stopped_on_core: CoreId,
}

/// Per-connection task state
#[derive(Debug)]
pub struct Reconstructor {
    frequency: TickFrequency,
    events: HashMap<TaskUid, TaskEvent>,
    names: HashMap<TaskUid, String>,
    /// group uid -> known direct children
    children: HashMap<TaskUid, Vec<TaskUid>>,
}

impl Reconstructor {
    /// `frequency` is the tick rate of the producer's clock
    #[must_use]
    pub fn new(frequency: TickFrequency) -> Self {
        Self { frequency, events: HashMap::new(), names: HashMap::new(), children: HashMap::new() }
    }

    /// Record one decoded frame and report on it
    pub fn apply(&mut self, event: TaskEvent, name: String) -> TaskReport {
        let uid = TaskUid(event.uid);
        self.names.entry(uid).or_insert(name);

        let group = TaskUid(event.group_uid);
        let previous = self.events.insert(uid, event).map(|prev| TaskUid(prev.group_uid));
        if previous != Some(group) {
            if let Some(siblings) = previous.and_then(|old| self.children.get_mut(&old)) {
                siblings.retain(|child| *child != uid);
            }
            if group.is_valid() {
                self.children.entry(group).or_default().push(uid);
            }
        }

        self.report(uid, &event)
    }

    /// Like [`Reconstructor::apply`], plus a fresh report for every known
    /// descendant whose full name changed because of this frame
    ///
    /// A task's name and group are fixed by its first frame, so descendants
    /// are only re-reported when `event` introduces the task or moves it to
    /// another group.
    pub fn apply_resolving(&mut self, event: TaskEvent, name: String) -> (TaskReport, Vec<TaskReport>) {
        let uid = TaskUid(event.uid);
        let changed = !matches!(self.events.get(&uid), Some(known) if known.group_uid == event.group_uid);

        let report = self.apply(event, name);
        let resolved = if changed { self.descendants(uid) } else { Vec::new() };
        (report, resolved)
    }

    /// Reports for every known task below `uid`, nearest first
    #[must_use]
    pub fn descendants(&self, uid: TaskUid) -> Vec<TaskReport> {
        let mut seen = HashSet::from([uid]);
        let mut queue = VecDeque::from([uid]);
        let mut reports = Vec::new();

        while let Some(parent) = queue.pop_front() {
            for child in self.children.get(&parent).into_iter().flatten() {
                if !seen.insert(*child) {
                    continue;
                }
                if let Some(event) = self.events.get(child) {
                    reports.push(self.report(*child, event));
                    queue.push_back(*child);
                }
            }
        }
        reports
    }

    /// Full name of a known task, `None` if `uid` was never seen
    #[must_use]
    pub fn full_name(&self, uid: TaskUid) -> Option<String> {
        let mut event = self.events.get(&uid)?;
        let mut segments = vec![self.names.get(&uid)?.as_str()];

        // Ancestry is a tree, so a chain can never be longer than the number
        // of known tasks; a longer one means corrupted input.
        let mut depth = 0;
        loop {
            let parent = TaskUid(event.group_uid);
            if !parent.is_valid() {
                break;
            }
            let (Some(parent_event), Some(parent_name)) = (self.events.get(&parent), self.names.get(&parent))
            else {
                break;
            };
            if depth == self.events.len() {
                warn!("Group cycle detected at {parent}, truncating name of {uid}");
                break;
            }
            depth += 1;
            segments.push(parent_name);
            event = parent_event;
        }

        segments.reverse();
        Some(segments.join("/"))
    }

    /// Re-resolve every known task against the final hierarchy
    ///
    /// Reports are ordered by start tick, then uid.
    #[must_use]
    pub fn finish(&self) -> Vec<TaskReport> {
        let mut reports: Vec<_> = self.events.iter().map(|(uid, event)| self.report(*uid, event)).collect();
        reports.sort_by_key(|r| (r.started_at, r.uid));
        reports
    }

    /// Number of distinct tasks seen
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn report(&self, uid: TaskUid, event: &TaskEvent) -> TaskReport {
        let group = TaskUid(event.group_uid);
        TaskReport {
            uid,
            group: group.is_valid().then_some(group),
            full_name: self.full_name(uid).unwrap_or_default(),
            duration_ms: self.frequency.to_millis(event.started_at, event.stopped_at),
            started_at: event.started_at,
            started_on_thread: event.started_on_thread,
            stopped_on_thread: event.stopped_on_thread,
            started_on_core: CoreId(event.started_on_core),
            stopped_on_core: CoreId(event.stopped_on_core),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(uid: u32, group: Option<u32>, start: u32, stop: u32) -> TaskEvent {
        let mut event = TaskEvent::new(uid);
        if let Some(group) = group {
            event.group_uid = group;
        }
        event.started_at = start;
        event.stopped_at = stop;
        event
    }

    #[test]
    fn test_top_level_task_report() {
        let mut state = Reconstructor::new(TickFrequency(10_000));
        let report = state.apply(event(1, None, 100, 350), "compute".into());

        assert_eq!(report.full_name, "compute");
        assert_eq!(report.group, None);
        assert!((report.duration_ms - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_child_before_group_degrades_then_resolves() {
        let mut state = Reconstructor::new(TickFrequency::MICROS);
        let child = state.apply(event(11, Some(10), 10, 20), "stage1".into());
        assert_eq!(child.full_name, "stage1");
        assert_eq!(child.group, Some(TaskUid(10)));

        state.apply(event(10, None, 0, 30), "pipeline".into());
        assert_eq!(state.full_name(TaskUid(11)).as_deref(), Some("pipeline/stage1"));
    }

    #[test]
    fn test_group_and_children_in_every_order() {
        let frames = [
            (event(10, None, 0, 100), "pipeline"),
            (event(11, Some(10), 1, 10), "load"),
            (event(12, Some(10), 11, 20), "transform"),
            (event(13, Some(10), 21, 30), "store"),
        ];
        let mut orders = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                for c in 0..4 {
                    for d in 0..4 {
                        let order = [a, b, c, d];
                        if (0..4).all(|idx| order.contains(&idx)) {
                            orders.push(order);
                        }
                    }
                }
            }
        }
        assert_eq!(orders.len(), 24);

        for order in orders {
            let mut state = Reconstructor::new(TickFrequency::MICROS);
            for idx in order {
                let (event, name) = frames[idx];
                state.apply(event, name.to_string());
            }
            for (uid, child) in [(11, "load"), (12, "transform"), (13, "store")] {
                assert_eq!(
                    state.full_name(TaskUid(uid)),
                    Some(format!("pipeline/{child}")),
                    "order {order:?}"
                );
            }
        }
    }

    #[test]
    fn test_missing_group_keeps_own_name() {
        let mut state = Reconstructor::new(TickFrequency::MICROS);
        for (uid, name) in [(11, "load"), (12, "transform"), (13, "store")] {
            state.apply(event(uid, Some(10), 0, 1), name.into());
        }
        assert_eq!(state.full_name(TaskUid(12)).as_deref(), Some("transform"));
        assert_eq!(state.full_name(TaskUid(10)), None);
    }

    #[test]
    fn test_nested_groups() {
        let mut state = Reconstructor::new(TickFrequency::MICROS);
        state.apply(event(3, Some(2), 0, 1), "leaf".into());
        state.apply(event(1, None, 0, 1), "root".into());
        assert_eq!(state.full_name(TaskUid(3)).as_deref(), Some("leaf"));

        state.apply(event(2, Some(1), 0, 1), "mid".into());
        assert_eq!(state.full_name(TaskUid(3)).as_deref(), Some("root/mid/leaf"));
    }

    #[test]
    fn test_name_is_kept_from_first_frame() {
        let mut state = Reconstructor::new(TickFrequency::MICROS);
        state.apply(event(5, None, 0, 10), "first".into());
        let report = state.apply(event(5, None, 0, 20), "second".into());

        assert_eq!(report.full_name, "first");
        assert!((report.duration_ms - 0.02).abs() < 1e-9);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_cyclic_groups_terminate() {
        let mut state = Reconstructor::new(TickFrequency::MICROS);
        state.apply(event(1, Some(2), 0, 1), "a".into());
        state.apply(event(2, Some(1), 0, 1), "b".into());

        let name = state.full_name(TaskUid(1)).unwrap();
        assert!(name.ends_with('a'));
        assert!(name.split('/').count() <= 3);
    }

    #[test]
    fn test_group_frame_reresolves_waiting_children() {
        let mut state = Reconstructor::new(TickFrequency::MICROS);
        let (_, resolved) = state.apply_resolving(event(11, Some(10), 1, 2), "load".into());
        assert!(resolved.is_empty());
        state.apply_resolving(event(12, Some(10), 2, 3), "store".into());
        state.apply_resolving(event(13, Some(12), 2, 3), "flush".into());

        let (group, resolved) = state.apply_resolving(event(10, None, 0, 5), "pipeline".into());
        assert_eq!(group.full_name, "pipeline");

        let names: Vec<_> = resolved.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, ["pipeline/load", "pipeline/store", "pipeline/store/flush"]);
    }

    #[test]
    fn test_repeated_frame_does_not_reresolve() {
        let mut state = Reconstructor::new(TickFrequency::MICROS);
        state.apply_resolving(event(11, Some(10), 1, 2), "load".into());
        state.apply_resolving(event(10, None, 0, 5), "pipeline".into());

        let (_, resolved) = state.apply_resolving(event(10, None, 0, 6), "pipeline".into());
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_descendants_of_cycle_terminate() {
        let mut state = Reconstructor::new(TickFrequency::MICROS);
        state.apply(event(1, Some(2), 0, 1), "a".into());
        state.apply(event(2, Some(1), 0, 1), "b".into());

        let below: Vec<_> = state.descendants(TaskUid(1)).iter().map(|r| r.uid).collect();
        assert_eq!(below, [TaskUid(2)]);
    }

    #[test]
    fn test_finish_reresolves_in_start_order() {
        let mut state = Reconstructor::new(TickFrequency::MICROS);
        state.apply(event(11, Some(10), 5, 6), "stage1".into());
        state.apply(event(10, None, 1, 9), "pipeline".into());

        let reports = state.finish();
        let names: Vec<_> = reports.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, ["pipeline", "pipeline/stage1"]);
    }
}
