//! Script threads, thread groups, and suspension conditions
//!
//! A thread is one suspendable execution of a handler body against one
//! instance. While suspended it exclusively owns the continuation handed
//! back by the script host. Threads live inside the group spawned by
//! their triggering event; the group's existence is how the scheduler
//! tracks that the event's effects have not yet fully drained.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::instance::InstanceId;
use super::script::{BodyId, Continuation};
use super::sound::{PerformanceId, SoundBackend};
use super::spawn::SpawnEvent;

/// Identifier of a thread group
///
/// Allocated monotonically per project, including for broadcasts that
/// match nothing, so "has this event drained" is always answerable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group:{}", self.0)
    }
}

/// Why a suspended thread is not yet eligible to run
#[derive(Debug)]
pub enum WaitCondition {
    /// Eligible again on the very next tick
    ///
    /// This is the suspension used by primitives whose side effects must
    /// become observable to other code before the thread's own next
    /// statement runs.
    NextTick,
    /// Eligible on the nth tick after suspension
    Ticks(u64),
    /// Eligible once the given thread group has fully drained
    GroupDone(GroupId),
    /// Eligible once the performance is no longer active
    PerformanceDone(PerformanceId),
}

impl WaitCondition {
    /// Evaluate this condition at a tick boundary
    ///
    /// Called at most once per tick per suspended thread. `live_groups`
    /// is the set of group ids still alive (or pending) when the tick's
    /// execution phase began.
    pub fn poll(&mut self, live_groups: &HashSet<GroupId>, sounds: &dyn SoundBackend) -> bool {
        match self {
            WaitCondition::NextTick => true,
            WaitCondition::Ticks(remaining) => {
                if *remaining <= 1 {
                    true
                } else {
                    *remaining -= 1;
                    false
                }
            }
            WaitCondition::GroupDone(group) => !live_groups.contains(group),
            WaitCondition::PerformanceDone(performance) => !sounds.is_active(*performance),
        }
    }
}

/// Execution state of a thread
#[derive(Debug)]
pub enum ThreadState {
    /// Eligible to run; no continuation yet (the body has not started)
    Running,
    /// Parked on an explicit wait, holding the remaining continuation
    Suspended {
        /// Resumable execution handed back by the script host
        continuation: Continuation,
        /// Condition re-evaluated once per tick
        wait: WaitCondition,
    },
    /// Body ran to normal completion
    Completed,
    /// Forced end: owning instance removed, or unrecovered script error
    Terminated,
}

impl ThreadState {
    /// Whether this state keeps the owning group alive
    pub fn is_alive(&self) -> bool {
        matches!(self, ThreadState::Running | ThreadState::Suspended { .. })
    }
}

/// One suspendable execution of a handler body against one instance
#[derive(Debug)]
pub struct Thread {
    /// Instance the body runs against
    pub instance: InstanceId,
    /// Handler body being executed
    pub body: BodyId,
    /// Current state
    pub state: ThreadState,
}

impl Thread {
    /// Create a thread, eligible from its first scheduling opportunity
    pub fn new(instance: InstanceId, body: BodyId) -> Self {
        Self {
            instance,
            body,
            state: ThreadState::Running,
        }
    }
}

/// The set of threads spawned together by a single triggering event
#[derive(Debug)]
pub struct ThreadGroup {
    /// Group identity
    pub id: GroupId,
    /// Event that spawned the group
    pub event: SpawnEvent,
    /// Threads in spawn order
    pub threads: Vec<Thread>,
}

impl ThreadGroup {
    /// Number of threads still keeping this group alive
    pub fn alive_count(&self) -> usize {
        self.threads
            .iter()
            .filter(|thread| thread.state.is_alive())
            .count()
    }

    /// Whether every thread has left the alive set
    pub fn is_drained(&self) -> bool {
        self.alive_count() == 0
    }

    /// Drop completed and terminated threads
    pub fn prune(&mut self) {
        self.threads.retain(|thread| thread.state.is_alive());
    }
}
