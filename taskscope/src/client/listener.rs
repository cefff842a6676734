//! Lifecycle hook interface
//!
//! [`TaskLifecycle`] is what a scheduling engine calls at the defined points
//! of a task's life. [`TelemetryListener`] implements it on top of
//! [`TaskProbe`] for engines that identify tasks only by uid.

use log::{debug, warn};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{EventClient, ExecutionStamp, TaskProbe};
use crate::clock::Clock;
use crate::domain::{ClientError, TaskUid};

/// Hooks invoked by the task engine
///
/// Calls for one task arrive in order: created, optionally added to a group,
/// pre-execute, post-execute, destroyed. Calls for different tasks may come
/// from different threads at the same time.
pub trait TaskLifecycle: Send + Sync {
    fn on_created(&self, uid: TaskUid, name: &str);

    /// `uid` was added to the group `group`
    fn on_added_to_group(&self, uid: TaskUid, group: TaskUid);

    fn on_pre_execute(&self, uid: TaskUid);

    fn on_post_execute(&self, uid: TaskUid);

    /// The task instance is gone; its record is transmitted now
    ///
    /// # Errors
    /// Returns the transport error if the record could not be sent.
    fn on_destroyed(&self, uid: TaskUid) -> Result<(), ClientError>;
}

/// uid-keyed [`TaskLifecycle`] implementation feeding an [`EventClient`]
///
/// In-flight probes live in a map until their task is destroyed. Clock and
/// placement are sampled before the map lock is taken.
pub struct TelemetryListener<C, W> {
    client: Arc<EventClient<W>>,
    clock: C,
    in_flight: Mutex<HashMap<TaskUid, TaskProbe>>,
}

impl<C: Clock, W: Write + Send> TelemetryListener<C, W> {
    pub fn new(client: Arc<EventClient<W>>, clock: C) -> Self {
        Self { client, clock, in_flight: Mutex::new(HashMap::new()) }
    }

    /// Tasks created but not yet destroyed
    pub fn in_flight(&self) -> usize {
        self.probes().len()
    }

    pub fn client(&self) -> &EventClient<W> {
        &self.client
    }

    fn probes(&self) -> MutexGuard<'_, HashMap<TaskUid, TaskProbe>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_probe(&self, uid: TaskUid, hook: &str, f: impl FnOnce(&mut TaskProbe)) {
        match self.probes().get_mut(&uid) {
            Some(probe) => f(probe),
            None => warn!("{hook} for unknown {uid}"),
        }
    }
}

impl<C: Clock, W: Write + Send> TaskLifecycle for TelemetryListener<C, W> {
    fn on_created(&self, uid: TaskUid, name: &str) {
        debug!("{uid} created as {name:?}");
        if self.probes().insert(uid, TaskProbe::new(uid, name)).is_some() {
            warn!("{uid} created twice, previous record dropped");
        }
    }

    fn on_added_to_group(&self, uid: TaskUid, group: TaskUid) {
        self.with_probe(uid, "group add", |probe| {
            probe.added_to_group(group);
        });
    }

    fn on_pre_execute(&self, uid: TaskUid) {
        let stamp = ExecutionStamp::capture(&self.clock);
        self.with_probe(uid, "pre-execute", |probe| probe.pre_execute(stamp));
    }

    fn on_post_execute(&self, uid: TaskUid) {
        let stamp = ExecutionStamp::capture(&self.clock);
        self.with_probe(uid, "post-execute", |probe| probe.post_execute(stamp));
    }

    fn on_destroyed(&self, uid: TaskUid) -> Result<(), ClientError> {
        // Release the map before touching the transport
        let probe = self.probes().remove(&uid).ok_or(ClientError::UnknownTask(uid))?;
        probe.finish(&self.client)
    }
}
