//! Actor templates, handler definitions, and trigger matching
//!
//! An actor is a named template owning an ordered list of handlers; it is
//! immutable once registered. Handlers bind a trigger condition to an
//! opaque body reference interpreted by the script host. Matching is a
//! straightforward predicate scan over the tagged trigger variants.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{ProjectError, ProjectResult};
use super::script::BodyId;

/// Identifier of a registered actor template
///
/// Dense and registration-ordered, so enumerating actors by id yields the
/// deterministic fan-out order broadcasts rely on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor:{}", self.0)
    }
}

/// Trigger condition of a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Runs when a broadcast with exactly this name is admitted
    Broadcast(String),
    /// Runs on a freshly created clone, one admission delay after the
    /// create phase
    CloneStart,
    /// Runs when the project is started
    Startup,
    /// Runs once, on the given tick after the project is started
    Timer {
        /// Ticks between `start()` and admission
        ticks: u64,
    },
}

/// A trigger-condition-to-body binding defined on an actor
#[derive(Debug, Clone)]
pub struct Handler {
    /// When this handler is spawned
    pub trigger: Trigger,
    /// Opaque reference to the executable body, handed to the script host
    pub body: BodyId,
}

/// Template defining handlers for a family of instances
#[derive(Debug, Clone)]
pub struct Actor {
    name: String,
    handlers: Vec<Handler>,
}

impl Actor {
    /// Create a template with no handlers
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
        }
    }

    /// Add a handler for a named broadcast
    pub fn on_broadcast(mut self, name: impl Into<String>, body: BodyId) -> Self {
        self.handlers.push(Handler {
            trigger: Trigger::Broadcast(name.into()),
            body,
        });
        self
    }

    /// Add a handler that runs when an instance starts life as a clone
    pub fn on_clone_start(mut self, body: BodyId) -> Self {
        self.handlers.push(Handler {
            trigger: Trigger::CloneStart,
            body,
        });
        self
    }

    /// Add a handler that runs when the project starts
    pub fn on_startup(mut self, body: BodyId) -> Self {
        self.handlers.push(Handler {
            trigger: Trigger::Startup,
            body,
        });
        self
    }

    /// Add a handler that runs on the given tick after project start
    pub fn on_timer(mut self, ticks: u64, body: BodyId) -> Self {
        self.handlers.push(Handler {
            trigger: Trigger::Timer { ticks },
            body,
        });
        self
    }

    /// Template name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handlers in declaration order
    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    /// Bodies of handlers matching an exact, case-sensitive broadcast name
    pub fn broadcast_bodies<'a>(&'a self, name: &'a str) -> impl Iterator<Item = BodyId> + 'a {
        self.handlers.iter().filter_map(move |handler| {
            matches!(&handler.trigger, Trigger::Broadcast(n) if n == name)
                .then_some(handler.body)
        })
    }

    /// Bodies of clone-start handlers
    pub fn clone_start_bodies(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.handlers.iter().filter_map(|handler| {
            matches!(handler.trigger, Trigger::CloneStart).then_some(handler.body)
        })
    }

    /// Bodies of startup handlers
    pub fn startup_bodies(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.handlers.iter().filter_map(|handler| {
            matches!(handler.trigger, Trigger::Startup).then_some(handler.body)
        })
    }

    /// Timer handlers as (due tick offset, body) pairs
    pub fn timer_bodies(&self) -> impl Iterator<Item = (u64, BodyId)> + '_ {
        self.handlers.iter().filter_map(|handler| match handler.trigger {
            Trigger::Timer { ticks } => Some((ticks, handler.body)),
            _ => None,
        })
    }
}

/// Catalog of actor templates, fixed after project load
#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: Vec<Actor>,
    by_name: HashMap<String, ActorId>,
}

impl ActorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, assigning the next dense id
    pub fn register(&mut self, actor: Actor) -> ProjectResult<ActorId> {
        if self.by_name.contains_key(actor.name()) {
            return Err(ProjectError::DuplicateActor(actor.name().to_string()));
        }
        let id = ActorId(self.actors.len() as u32);
        self.by_name.insert(actor.name().to_string(), id);
        self.actors.push(actor);
        Ok(id)
    }

    /// Look up a template by id
    pub fn get(&self, id: ActorId) -> &Actor {
        &self.actors[id.0 as usize]
    }

    /// Resolve a template name
    pub fn lookup(&self, name: &str) -> ProjectResult<ActorId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ProjectError::UnknownActor(name.to_string()))
    }

    /// Templates in registration order
    pub fn iter(&self) -> impl Iterator<Item = (ActorId, &Actor)> {
        self.actors
            .iter()
            .enumerate()
            .map(|(index, actor)| (ActorId(index as u32), actor))
    }

    /// Number of registered templates
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Whether no templates are registered
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
