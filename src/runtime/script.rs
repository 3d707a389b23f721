//! Boundary with the script-execution collaborator
//!
//! The scheduler knows nothing about the script language. It hands the
//! host an opaque body reference, the instance to run against, and the
//! previously suspended continuation (if any), and gets back one of
//! completed / terminated / suspended. Everything a running body may do
//! to the engine goes through the [`ScriptContext`] borrow it is given
//! for the duration of one step.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::actor::ActorRegistry;
use super::error::InstanceResult;
use super::instance::{AttrValue, InstanceId, InstanceStore};
use super::sound::{PerformanceId, SoundBackend};
use super::spawn::EffectQueue;
use super::thread::{GroupId, WaitCondition};

/// Opaque reference to an executable handler body
///
/// Assigned by whoever builds the project; only the script host
/// interprets it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BodyId(pub u32);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body:{}", self.0)
    }
}

/// Suspended mid-body execution, resumable by the host that minted it
///
/// The scheduler only ever holds, passes back, or discards this value;
/// it never inspects it.
pub struct Continuation(Box<dyn Any + Send>);

impl Continuation {
    /// Wrap host-private resume state
    pub fn new<T: Any + Send>(state: T) -> Self {
        Self(Box::new(state))
    }

    /// Recover the host-private state, consuming the continuation
    pub fn downcast<T: Any>(self) -> Option<T> {
        self.0.downcast::<T>().ok().map(|state| *state)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Continuation(..)")
    }
}

/// Result of giving a thread one execution opportunity
#[derive(Debug)]
pub enum StepOutcome {
    /// The handler body ran to normal completion
    Completed,
    /// The body raised an error it did not recover from
    Terminated(anyhow::Error),
    /// The body reached a suspension point and yielded
    Suspended {
        /// Remaining execution, to be handed back on resume
        continuation: Continuation,
        /// Condition under which the thread becomes eligible again
        wait: WaitCondition,
    },
}

/// The script-execution collaborator
///
/// Responsible for all language-level semantics; must honor cooperative
/// suspension exactly at the primitives it designates as suspension
/// points. The governing policy for those primitives: side effects that
/// must be observable to other code at a tick boundary yield exactly
/// once after committing.
pub trait ScriptHost {
    /// Run or resume one handler body until it completes, errors, or
    /// reaches a suspension point
    fn step(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        body: BodyId,
        instance: InstanceId,
        resume: Option<Continuation>,
    ) -> StepOutcome;
}

/// Core services exposed to a running body for one execution step
///
/// Exactly one context exists at any instant, so all instance mutation
/// is exclusive to the single running thread.
pub struct ScriptContext<'a> {
    actors: &'a ActorRegistry,
    instances: &'a mut InstanceStore,
    effects: &'a mut EffectQueue,
    sounds: &'a dyn SoundBackend,
    current: InstanceId,
}

impl<'a> ScriptContext<'a> {
    pub(crate) fn new(
        actors: &'a ActorRegistry,
        instances: &'a mut InstanceStore,
        effects: &'a mut EffectQueue,
        sounds: &'a dyn SoundBackend,
        current: InstanceId,
    ) -> Self {
        Self {
            actors,
            instances,
            effects,
            sounds,
            current,
        }
    }

    /// Instance the current thread runs against
    pub fn instance(&self) -> InstanceId {
        self.current
    }

    /// Read an attribute of the current instance
    pub fn attr(&self, name: &str) -> InstanceResult<AttrValue> {
        self.instances.attribute(self.current, name)
    }

    /// Write an attribute of the current instance
    pub fn set_attr(&mut self, name: &str, value: AttrValue) -> InstanceResult<()> {
        self.instances.set_attribute(self.current, name, value)
    }

    /// Enqueue a broadcast originating from the current instance
    ///
    /// Nothing runs now; matching handlers are admitted on a later tick.
    /// The returned group id can be waited on with
    /// [`WaitCondition::GroupDone`].
    pub fn broadcast(&mut self, name: &str) -> GroupId {
        self.effects
            .broadcast(name, Some(self.current), self.actors, self.instances)
    }

    /// Clone the current instance (create phase, synchronous)
    pub fn clone_self(&mut self) -> Option<InstanceId> {
        self.clone_instance(self.current)
    }

    /// Clone an instance: copy its full attribute mapping into a fresh
    /// instance of the same actor now, and defer its clone-start
    /// handlers to a later tick
    ///
    /// Cloning an instance that has already been removed is a documented
    /// no-op.
    pub fn clone_instance(&mut self, source: InstanceId) -> Option<InstanceId> {
        self.effects
            .clone_instance(source, self.actors, self.instances)
    }

    /// Remove an instance, terminating its threads at their next
    /// scheduling opportunity
    ///
    /// Idempotent, like the store operation it forwards to.
    pub fn remove_instance(&mut self, id: InstanceId) {
        if self.instances.remove(id) {
            tracing::debug!(instance = %id, "instance removed by script");
        }
    }

    /// Remove the current instance ("delete this clone")
    pub fn remove_self(&mut self) {
        self.remove_instance(self.current);
    }

    /// Start a performance on the external playback subsystem
    ///
    /// Fire-and-forget at the boundary; hosts that want the start to be
    /// observable before the body's next statement suspend with
    /// [`WaitCondition::NextTick`] right after calling this.
    pub fn start_performance(&mut self, clip: &str) -> PerformanceId {
        let id = self.sounds.start(clip);
        tracing::trace!(clip, performance = %id, "performance started");
        id
    }

    /// Whether a performance is still active
    pub fn performance_active(&self, id: PerformanceId) -> bool {
        self.sounds.is_active(id)
    }
}
