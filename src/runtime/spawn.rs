//! Pending spawns: broadcast fan-out, the clone protocol, timers
//!
//! Triggering events never execute anything. They are recorded here as
//! pending groups and admitted by the scheduler no earlier than the tick
//! after they were recorded. That one-tick admission delay is the central
//! invariant of the engine: an event is never observable as "already ran
//! its handlers" within the tick that produced it.

use serde::{Deserialize, Serialize};

use super::actor::ActorRegistry;
use super::instance::{InstanceId, InstanceStore};
use super::script::BodyId;
use super::thread::GroupId;

/// The triggering event a group of threads was spawned by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpawnEvent {
    /// A named broadcast
    Broadcast {
        /// Broadcast name
        name: String,
        /// Instance that issued the broadcast, if it came from a script
        origin: Option<InstanceId>,
    },
    /// The deferred start phase of a clone
    CloneStart {
        /// The freshly created clone
        instance: InstanceId,
    },
    /// Project start
    Startup,
    /// A timer handler coming due
    Timer {
        /// Tick (relative to start) the handler was scheduled for
        due_tick: u64,
    },
}

/// One thread-to-be within a pending group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnEntry {
    /// Instance the thread will run against
    pub instance: InstanceId,
    /// Handler body it will execute
    pub body: BodyId,
}

/// A triggering event's worth of not-yet-admitted threads
///
/// Held exclusively by the pending queue until admitted, then converted
/// into a thread group and discarded.
#[derive(Debug)]
pub struct PendingGroup {
    /// Group identity, assigned at record time
    pub id: GroupId,
    /// The event that produced this group
    pub event: SpawnEvent,
    /// Threads to create, in spawn order
    pub entries: Vec<SpawnEntry>,
}

#[derive(Debug)]
struct TimerSpawn {
    due_tick: u64,
    group: PendingGroup,
}

/// Recorder of spawn requests and owner of the group id counter
#[derive(Debug, Default)]
pub struct EffectQueue {
    next_group: u64,
    pending: Vec<PendingGroup>,
    timers: Vec<TimerSpawn>,
}

impl EffectQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        id
    }

    /// Record a broadcast: scan every actor's handlers for an exact,
    /// case-sensitive name match and enqueue one pending group covering
    /// each matching handler on each live instance
    ///
    /// A broadcast matching nothing allocates an id but enqueues nothing,
    /// leaving all state unchanged.
    pub fn broadcast(
        &mut self,
        name: &str,
        origin: Option<InstanceId>,
        actors: &ActorRegistry,
        instances: &InstanceStore,
    ) -> GroupId {
        let id = self.allocate();

        let mut entries = Vec::new();
        for (actor_id, actor) in actors.iter() {
            let bodies: Vec<BodyId> = actor.broadcast_bodies(name).collect();
            if bodies.is_empty() {
                continue;
            }
            for instance in instances.instances_of(actor_id) {
                for &body in &bodies {
                    entries.push(SpawnEntry { instance, body });
                }
            }
        }

        tracing::debug!(name, group = %id, threads = entries.len(), "broadcast recorded");
        if !entries.is_empty() {
            self.pending.push(PendingGroup {
                id,
                event: SpawnEvent::Broadcast {
                    name: name.to_string(),
                    origin,
                },
                entries,
            });
        }
        id
    }

    /// Clone an instance: the synchronous create phase of the two-phase
    /// protocol
    ///
    /// Allocates a fresh instance under the source's actor, value-copies
    /// the entire current attribute mapping, and records the deferred
    /// start phase (the actor's clone-start handlers against the new
    /// instance). Cloning an already-removed instance is a silent no-op.
    pub fn clone_instance(
        &mut self,
        source: InstanceId,
        actors: &ActorRegistry,
        instances: &mut InstanceStore,
    ) -> Option<InstanceId> {
        let Ok(record) = instances.get(source) else {
            tracing::debug!(source = %source, "clone of removed instance ignored");
            return None;
        };
        let actor = record.actor;
        let attributes = record.attributes().clone();

        let clone = instances.create(actor, attributes, Some(source));
        tracing::debug!(source = %source, clone = %clone, "clone created");

        let entries: Vec<SpawnEntry> = actors
            .get(actor)
            .clone_start_bodies()
            .map(|body| SpawnEntry {
                instance: clone,
                body,
            })
            .collect();
        if !entries.is_empty() {
            let id = self.allocate();
            self.pending.push(PendingGroup {
                id,
                event: SpawnEvent::CloneStart { instance: clone },
                entries,
            });
        }
        Some(clone)
    }

    /// Record the startup event: one pending group covering every
    /// startup handler on every live instance
    pub fn startup(&mut self, actors: &ActorRegistry, instances: &InstanceStore) -> GroupId {
        let id = self.allocate();

        let mut entries = Vec::new();
        for (actor_id, actor) in actors.iter() {
            let bodies: Vec<BodyId> = actor.startup_bodies().collect();
            if bodies.is_empty() {
                continue;
            }
            for instance in instances.instances_of(actor_id) {
                for &body in &bodies {
                    entries.push(SpawnEntry { instance, body });
                }
            }
        }

        tracing::debug!(group = %id, threads = entries.len(), "startup recorded");
        if !entries.is_empty() {
            self.pending.push(PendingGroup {
                id,
                event: SpawnEvent::Startup,
                entries,
            });
        }
        id
    }

    /// Schedule every timer handler relative to the given start tick
    ///
    /// Each timer handler becomes its own pending group, binding the
    /// instances live right now; it is admitted on the tick it comes due.
    pub fn schedule_timers(
        &mut self,
        actors: &ActorRegistry,
        instances: &InstanceStore,
        start_tick: u64,
    ) {
        for (actor_id, actor) in actors.iter() {
            for (ticks, body) in actor.timer_bodies() {
                let entries: Vec<SpawnEntry> = instances
                    .instances_of(actor_id)
                    .into_iter()
                    .map(|instance| SpawnEntry { instance, body })
                    .collect();
                if entries.is_empty() {
                    continue;
                }
                let id = self.allocate();
                self.timers.push(TimerSpawn {
                    due_tick: start_tick + ticks,
                    group: PendingGroup {
                        id,
                        event: SpawnEvent::Timer {
                            due_tick: start_tick + ticks,
                        },
                        entries,
                    },
                });
            }
        }
    }

    /// Take every group recorded before the current tick began, plus the
    /// timer spawns that have come due
    pub fn drain_admissible(&mut self, current_tick: u64) -> Vec<PendingGroup> {
        let mut admitted = std::mem::take(&mut self.pending);

        let mut index = 0;
        while index < self.timers.len() {
            if self.timers[index].due_tick <= current_tick {
                admitted.push(self.timers.remove(index).group);
            } else {
                index += 1;
            }
        }
        admitted
    }

    /// Group ids recorded but not yet admitted (timers included)
    pub fn pending_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.pending
            .iter()
            .map(|group| group.id)
            .chain(self.timers.iter().map(|timer| timer.group.id))
    }

    /// Number of pending groups, timers included
    pub fn pending_count(&self) -> usize {
        self.pending.len() + self.timers.len()
    }

    /// Discard every pending group and timer without admitting them
    pub fn clear(&mut self) {
        self.pending.clear();
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::actor::Actor;
    use std::collections::BTreeMap;

    fn fixture() -> (ActorRegistry, InstanceStore) {
        let mut actors = ActorRegistry::new();
        let alien = actors
            .register(
                Actor::new("Alien")
                    .on_broadcast("go", BodyId(0))
                    .on_clone_start(BodyId(1)),
            )
            .unwrap();
        let mut instances = InstanceStore::new();
        instances.create(alien, BTreeMap::new(), None);
        (actors, instances)
    }

    #[test]
    fn test_broadcast_enqueues_without_running() {
        let (actors, instances) = fixture();
        let mut effects = EffectQueue::new();

        let before = instances.len();
        effects.broadcast("go", None, &actors, &instances);

        assert_eq!(instances.len(), before);
        assert_eq!(effects.pending_count(), 1);
    }

    #[test]
    fn test_zero_match_broadcast_is_a_no_op() {
        let (actors, instances) = fixture();
        let mut effects = EffectQueue::new();

        let id = effects.broadcast("unheard-of", None, &actors, &instances);

        assert_eq!(effects.pending_count(), 0);
        // The id is still allocated, so waiting on it is satisfiable.
        assert!(effects.pending_ids().all(|pending| pending != id));
    }

    #[test]
    fn test_clone_copies_attributes_and_defers_start() {
        let mut actors = ActorRegistry::new();
        let alien = actors
            .register(Actor::new("Alien").on_clone_start(BodyId(9)))
            .unwrap();
        let mut instances = InstanceStore::new();
        let source = instances.create(
            alien,
            BTreeMap::from([("hp".to_string(), serde_json::json!(3))]),
            None,
        );
        let mut effects = EffectQueue::new();

        let clone = effects
            .clone_instance(source, &actors, &mut instances)
            .unwrap();

        assert_ne!(clone, source);
        assert_eq!(
            instances.attribute(clone, "hp").unwrap(),
            serde_json::json!(3)
        );
        assert_eq!(effects.pending_count(), 1);

        // Value copy, not shared: mutating the source leaves the clone alone.
        instances
            .set_attribute(source, "hp", serde_json::json!(1))
            .unwrap();
        assert_eq!(
            instances.attribute(clone, "hp").unwrap(),
            serde_json::json!(3)
        );
    }

    #[test]
    fn test_clone_of_removed_instance_is_ignored() {
        let (actors, mut instances) = fixture();
        let source = instances.instances_of(crate::runtime::actor::ActorId(0))[0];
        instances.remove(source);
        let mut effects = EffectQueue::new();

        assert!(effects
            .clone_instance(source, &actors, &mut instances)
            .is_none());
        assert_eq!(effects.pending_count(), 0);
        assert!(instances.is_empty());
    }

    #[test]
    fn test_drain_takes_timers_only_when_due() {
        let mut actors = ActorRegistry::new();
        let actor = actors
            .register(Actor::new("Clock").on_timer(3, BodyId(0)))
            .unwrap();
        let mut instances = InstanceStore::new();
        instances.create(actor, BTreeMap::new(), None);
        let mut effects = EffectQueue::new();

        effects.schedule_timers(&actors, &instances, 0);
        assert_eq!(effects.pending_count(), 1);

        assert!(effects.drain_admissible(2).is_empty());
        let due = effects.drain_admissible(3);
        assert_eq!(due.len(), 1);
        assert!(matches!(due[0].event, SpawnEvent::Timer { due_tick: 3 }));
    }
}
