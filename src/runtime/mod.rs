//! Frame-stepped scheduler core and public API
//!
//! This module provides the [`Project`] struct that owns every live
//! actor instance and in-flight script thread, and exposes the stepping
//! API consumed by the host loop: enqueue events at any time, advance
//! the whole simulation with [`Project::tick`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// Submodules
pub mod actor;
pub mod error;
pub mod instance;
pub mod script;
pub mod sound;
pub mod spawn;
pub mod thread;
pub mod trace;

use actor::{Actor, ActorId, ActorRegistry};
use error::{InstanceResult, ProjectResult, ScriptFault};
use instance::{AttrValue, InstanceId, InstanceStore};
use script::{ScriptContext, ScriptHost, StepOutcome};
use sound::{NullSounds, SoundBackend};
use spawn::{EffectQueue, PendingGroup};
use thread::{Thread, ThreadGroup, ThreadState};
use trace::{StepDisposition, StepTrace};

// Re-export commonly used types
pub use error::{InstanceError, ProjectError};
pub use thread::GroupId;
pub use trace::TickRecord;

/// Configuration for a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Retain every [`TickRecord`] for later inspection
    pub record_trace: bool,

    /// Upper bound on script faults kept for [`Project::take_faults`]
    pub max_retained_faults: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            record_trace: true,
            max_retained_faults: 64,
        }
    }
}

/// The scheduler: owner of all actors, instances, and thread groups
///
/// Execution is strictly single-threaded cooperative. At most one thread
/// runs at a time, suspension happens only at explicit points inside a
/// handler body, and within one tick threads execute in the stable order
/// their triggering spawn was admitted.
pub struct Project {
    config: ProjectConfig,
    actors: ActorRegistry,
    instances: InstanceStore,
    groups: Vec<ThreadGroup>,
    effects: EffectQueue,
    sounds: Arc<dyn SoundBackend>,
    host: Box<dyn ScriptHost>,
    ticks: u64,
    faults: Vec<ScriptFault>,
    trace: Vec<TickRecord>,
}

impl Project {
    /// Create a project with the given configuration, script host, and
    /// sound backend
    pub fn new(
        config: ProjectConfig,
        host: Box<dyn ScriptHost>,
        sounds: Arc<dyn SoundBackend>,
    ) -> Self {
        Self {
            config,
            actors: ActorRegistry::new(),
            instances: InstanceStore::new(),
            groups: Vec::new(),
            effects: EffectQueue::new(),
            sounds,
            host,
            ticks: 0,
            faults: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Create a project with default configuration and no sound output
    pub fn with_defaults(host: Box<dyn ScriptHost>) -> Self {
        Self::new(ProjectConfig::default(), host, Arc::new(NullSounds))
    }

    /// Current configuration
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Register an actor template
    ///
    /// Templates are meant to be registered at project load, before any
    /// event is enqueued.
    pub fn register_actor(&mut self, actor: Actor) -> ProjectResult<ActorId> {
        self.actors.register(actor)
    }

    /// Resolve an actor name
    pub fn actor_id(&self, name: &str) -> ProjectResult<ActorId> {
        self.actors.lookup(name)
    }

    /// Create an instance of a named actor with the given declared
    /// attributes
    pub fn create_instance(
        &mut self,
        actor: &str,
        attributes: impl IntoIterator<Item = (String, AttrValue)>,
    ) -> ProjectResult<InstanceId> {
        let actor = self.actors.lookup(actor)?;
        let attributes: BTreeMap<String, AttrValue> = attributes.into_iter().collect();
        Ok(self.instances.create(actor, attributes, None))
    }

    /// Enqueue a broadcast
    ///
    /// Callable at any time, including from outside any tick to inject
    /// synthetic events. Only ever enqueues: the set of instances (and
    /// everything else observable) is unchanged when this returns.
    pub fn broadcast(&mut self, name: &str) -> GroupId {
        self.effects
            .broadcast(name, None, &self.actors, &self.instances)
    }

    /// Start the project: enqueue every startup handler and schedule
    /// timer handlers relative to the current tick
    ///
    /// Subject to the same admission delay as any other event.
    pub fn start(&mut self) -> GroupId {
        let group = self.effects.startup(&self.actors, &self.instances);
        self.effects
            .schedule_timers(&self.actors, &self.instances, self.ticks);
        tracing::debug!(group = %group, "project started");
        group
    }

    /// Discard every thread group, pending spawn, and timer without
    /// running further body code
    ///
    /// Instances and their attributes are untouched.
    pub fn stop_all(&mut self) {
        let groups = self.groups.len();
        let pending = self.effects.pending_count();
        self.groups.clear();
        self.effects.clear();
        tracing::debug!(groups, pending, "all scripts stopped");
    }

    /// Remove an instance, forcing any thread still targeting it to
    /// terminate at its next scheduling opportunity
    ///
    /// Idempotent: removing twice has the same observable effect as
    /// removing once. Returns whether the instance was still live.
    pub fn remove_instance(&mut self, id: InstanceId) -> bool {
        self.instances.remove(id)
    }

    /// Read one attribute of one instance
    pub fn attribute(&self, id: InstanceId, name: &str) -> InstanceResult<AttrValue> {
        self.instances.attribute(id, name)
    }

    /// Write one attribute of one instance
    pub fn set_attribute(
        &mut self,
        id: InstanceId,
        name: &str,
        value: AttrValue,
    ) -> InstanceResult<()> {
        self.instances.set_attribute(id, name, value)
    }

    /// Live instances of a named actor, in creation order
    pub fn instances_of(&self, actor: &str) -> ProjectResult<Vec<InstanceId>> {
        let actor = self.actors.lookup(actor)?;
        Ok(self.instances.instances_of(actor))
    }

    /// Number of live instances across all actors
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Number of live thread groups
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of recorded-but-not-yet-admitted spawns (timers included)
    pub fn pending_spawn_count(&self) -> usize {
        self.effects.pending_count()
    }

    /// Ticks elapsed since the project was created
    pub fn ticks_elapsed(&self) -> u64 {
        self.ticks
    }

    /// Drain the retained script faults
    pub fn take_faults(&mut self) -> Vec<ScriptFault> {
        std::mem::take(&mut self.faults)
    }

    /// Retained tick records, oldest first (empty unless
    /// [`ProjectConfig::record_trace`] is set)
    pub fn trace(&self) -> &[TickRecord] {
        &self.trace
    }

    /// Advance the whole simulation by one tick
    ///
    /// 1. Admit every pending spawn recorded before this tick began;
    ///    spawns recorded during this tick wait for the next one.
    /// 2. Give each eligible thread one execution opportunity, in stable
    ///    insertion order.
    /// 3. Capture requests issued by running code for the next tick.
    /// 4. Prune finished threads and drained groups.
    /// 5. Poll the sound backend for bookkeeping.
    pub fn tick(&mut self) -> TickRecord {
        let seq = self.ticks;
        let admitted = self.admit(seq);

        // Group-completion waits are judged against the groups alive as
        // execution begins; a group draining mid-tick wakes its waiters
        // on the following tick.
        let live: HashSet<GroupId> = self
            .groups
            .iter()
            .map(|group| group.id)
            .chain(self.effects.pending_ids())
            .collect();

        let mut steps = Vec::new();
        let mut faults = Vec::new();

        for group_index in 0..self.groups.len() {
            for thread_index in 0..self.groups[group_index].threads.len() {
                let group_id = self.groups[group_index].id;
                let thread = &mut self.groups[group_index].threads[thread_index];
                if !thread.state.is_alive() {
                    continue;
                }

                let instance = thread.instance;
                let body = thread.body;

                // Removal is the one cancellation primitive: a thread
                // whose instance is gone ends here, before any body code
                // and regardless of what it was waiting for.
                if !self.instances.contains(instance) {
                    thread.state = ThreadState::Terminated;
                    tracing::debug!(
                        group = %group_id, instance = %instance,
                        "thread terminated; instance removed"
                    );
                    steps.push(StepTrace {
                        group: group_id,
                        instance,
                        body,
                        outcome: StepDisposition::Terminated,
                    });
                    continue;
                }

                let eligible = match &mut thread.state {
                    ThreadState::Running => true,
                    ThreadState::Suspended { wait, .. } => {
                        wait.poll(&live, self.sounds.as_ref())
                    }
                    _ => false,
                };
                if !eligible {
                    continue;
                }

                let resume =
                    match std::mem::replace(&mut thread.state, ThreadState::Running) {
                        ThreadState::Suspended { continuation, .. } => Some(continuation),
                        _ => None,
                    };

                let mut ctx = ScriptContext::new(
                    &self.actors,
                    &mut self.instances,
                    &mut self.effects,
                    self.sounds.as_ref(),
                    instance,
                );
                let outcome = self.host.step(&mut ctx, body, instance, resume);

                let thread = &mut self.groups[group_index].threads[thread_index];
                let disposition = match outcome {
                    StepOutcome::Completed => {
                        thread.state = ThreadState::Completed;
                        StepDisposition::Completed
                    }
                    StepOutcome::Suspended { continuation, wait } => {
                        thread.state = ThreadState::Suspended { continuation, wait };
                        StepDisposition::Suspended
                    }
                    StepOutcome::Terminated(error) => {
                        thread.state = ThreadState::Terminated;
                        let message = format!("{error:#}");
                        tracing::error!(
                            group = %group_id, instance = %instance, body = %body,
                            error = %message,
                            "unhandled script error"
                        );
                        faults.push(ScriptFault {
                            instance,
                            body,
                            message,
                        });
                        StepDisposition::Terminated
                    }
                };
                steps.push(StepTrace {
                    group: group_id,
                    instance,
                    body,
                    outcome: disposition,
                });
            }
        }

        for group in &mut self.groups {
            group.prune();
        }
        self.groups.retain(|group| {
            if group.threads.is_empty() {
                tracing::debug!(group = %group.id, "group drained");
                false
            } else {
                true
            }
        });

        let active_performances = self.sounds.active_count();
        tracing::trace!(seq, active_performances, "external poll");

        self.ticks += 1;
        let record = TickRecord::new(seq, admitted, steps, faults.clone(), active_performances);

        self.faults.extend(faults);
        if self.faults.len() > self.config.max_retained_faults {
            let excess = self.faults.len() - self.config.max_retained_faults;
            self.faults.drain(..excess);
        }
        if self.config.record_trace {
            self.trace.push(record.clone());
        }
        record
    }

    /// Convert every admissible pending spawn into a live thread group
    fn admit(&mut self, seq: u64) -> Vec<GroupId> {
        let admissible = self.effects.drain_admissible(seq);
        let mut admitted = Vec::with_capacity(admissible.len());

        for PendingGroup { id, event, entries } in admissible {
            let threads: Vec<Thread> = entries
                .into_iter()
                .filter(|entry| {
                    let live = self.instances.contains(entry.instance);
                    if !live {
                        tracing::debug!(
                            group = %id, instance = %entry.instance,
                            "spawn entry dropped; instance removed"
                        );
                    }
                    live
                })
                .map(|entry| Thread::new(entry.instance, entry.body))
                .collect();

            tracing::debug!(group = %id, threads = threads.len(), "group admitted");
            admitted.push(id);
            self.groups.push(ThreadGroup { id, event, threads });
        }
        admitted
    }
}
