//! Live actor instances and the store that owns them
//!
//! Every instance holds an exclusive mapping from attribute name to value
//! and a unique, monotonically assigned identity that is never reused.
//! The identity counter is state of the store itself, not a global, so
//! each test scenario gets a fresh, isolated numbering.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::actor::ActorId;
use super::error::{InstanceError, InstanceResult};

/// Attribute values carried by instances
///
/// The scheduler assigns no semantic meaning to values beyond copying
/// them during cloning.
pub type AttrValue = serde_json::Value;

/// Unique identifier for a live instance
///
/// Assigned monotonically by the [`InstanceStore`]; removal never frees
/// an id for reuse.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One live, attribute-bearing object of an actor
#[derive(Debug, Clone)]
pub struct Instance {
    /// Identity of this instance
    pub id: InstanceId,
    /// Actor template this instance belongs to
    pub actor: ActorId,
    /// Instance this one was cloned from, if any (diagnostics only; the
    /// scheduler never traverses it)
    pub cloned_from: Option<InstanceId>,
    attributes: BTreeMap<String, AttrValue>,
}

impl Instance {
    /// Read an attribute value
    pub fn attribute(&self, name: &str) -> InstanceResult<&AttrValue> {
        self.attributes
            .get(name)
            .ok_or_else(|| InstanceError::NoSuchAttribute {
                instance: self.id,
                name: name.to_string(),
            })
    }

    /// Overwrite an attribute declared at creation
    pub fn set_attribute(&mut self, name: &str, value: AttrValue) -> InstanceResult<()> {
        match self.attributes.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(InstanceError::NoSuchAttribute {
                instance: self.id,
                name: name.to_string(),
            }),
        }
    }

    /// The full attribute mapping, in name order
    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }
}

/// Owner of all live instances and of the identity counter
#[derive(Debug, Default)]
pub struct InstanceStore {
    next_id: u64,
    live: BTreeMap<InstanceId, Instance>,
}

impl InstanceStore {
    /// Create an empty store with the identity counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new instance with the given declared attributes
    ///
    /// The attribute names given here are the only ones the instance will
    /// ever accept; `cloned_from` records provenance for diagnostics.
    pub fn create(
        &mut self,
        actor: ActorId,
        attributes: BTreeMap<String, AttrValue>,
        cloned_from: Option<InstanceId>,
    ) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;
        self.live.insert(
            id,
            Instance {
                id,
                actor,
                cloned_from,
                attributes,
            },
        );
        id
    }

    /// Whether the id names a live instance
    pub fn contains(&self, id: InstanceId) -> bool {
        self.live.contains_key(&id)
    }

    /// Look up a live instance
    pub fn get(&self, id: InstanceId) -> InstanceResult<&Instance> {
        self.live.get(&id).ok_or(InstanceError::NoSuchInstance(id))
    }

    /// Look up a live instance mutably
    pub fn get_mut(&mut self, id: InstanceId) -> InstanceResult<&mut Instance> {
        self.live
            .get_mut(&id)
            .ok_or(InstanceError::NoSuchInstance(id))
    }

    /// Read one attribute of one instance
    pub fn attribute(&self, id: InstanceId, name: &str) -> InstanceResult<AttrValue> {
        Ok(self.get(id)?.attribute(name)?.clone())
    }

    /// Write one attribute of one instance
    pub fn set_attribute(
        &mut self,
        id: InstanceId,
        name: &str,
        value: AttrValue,
    ) -> InstanceResult<()> {
        self.get_mut(id)?.set_attribute(name, value)
    }

    /// Remove an instance
    ///
    /// Idempotent: removing an id twice is a no-op, not an error. Returns
    /// whether the instance was still live.
    pub fn remove(&mut self, id: InstanceId) -> bool {
        self.live.remove(&id).is_some()
    }

    /// Live instances of one actor, in creation (= id) order
    pub fn instances_of(&self, actor: ActorId) -> Vec<InstanceId> {
        self.live
            .values()
            .filter(|instance| instance.actor == actor)
            .map(|instance| instance.id)
            .collect()
    }

    /// All live instances in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Instance> {
        self.live.values()
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no instances are live
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
