//! Shared test support: a scripted stand-in for the script-execution
//! collaborator
//!
//! Handler bodies are flat op lists; the program counter is the
//! continuation. Suspension points follow the engine's policy for
//! observable side effects: starting a performance commits the start and
//! then yields exactly once.

#![allow(dead_code)]

use anyhow::anyhow;
use serde_json::json;

use troupe::runtime::instance::{AttrValue, InstanceId};
use troupe::runtime::script::{BodyId, Continuation, ScriptContext, ScriptHost, StepOutcome};
use troupe::runtime::thread::WaitCondition;

/// One statement of a scripted handler body
#[derive(Debug, Clone)]
pub enum Op {
    /// Set an attribute to a fixed value
    SetAttr(&'static str, AttrValue),
    /// Increment an integer attribute by one
    IncrAttr(&'static str),
    /// Set an attribute from the host's shared counter, then advance it
    SetAttrFromCounter(&'static str),
    /// Clone the current instance
    CloneSelf,
    /// Remove the current instance
    DeleteSelf,
    /// Start a performance and yield once so the start is observable
    StartSound(&'static str),
    /// Start a performance and wait until it has finished
    PlaySoundUntilDone(&'static str),
    /// Park for the given number of ticks
    WaitTicks(u64),
    /// Fire-and-forget broadcast
    Broadcast(&'static str),
    /// Broadcast and wait for the spawned group to drain
    BroadcastAndWait(&'static str),
    /// Raise an unrecovered script error
    Fail(&'static str),
}

/// Program counter carried across suspensions
struct Frame {
    pc: usize,
}

/// Script host interpreting op-list bodies
pub struct ScriptedHost {
    bodies: Vec<(BodyId, Vec<Op>)>,
    counter: i64,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self {
            bodies: Vec::new(),
            counter: 0,
        }
    }

    /// Seed the shared counter used by [`Op::SetAttrFromCounter`]
    pub fn with_counter(mut self, start: i64) -> Self {
        self.counter = start;
        self
    }

    /// Define a handler body
    pub fn body(mut self, id: BodyId, program: Vec<Op>) -> Self {
        self.bodies.push((id, program));
        self
    }

    fn program(&self, id: BodyId) -> Vec<Op> {
        self.bodies
            .iter()
            .find(|(body, _)| *body == id)
            .map(|(_, program)| program.clone())
            .unwrap_or_default()
    }
}

impl ScriptHost for ScriptedHost {
    fn step(
        &mut self,
        ctx: &mut ScriptContext<'_>,
        body: BodyId,
        _instance: InstanceId,
        resume: Option<Continuation>,
    ) -> StepOutcome {
        let program = self.program(body);
        let mut pc = resume
            .and_then(|continuation| continuation.downcast::<Frame>())
            .map(|frame| frame.pc)
            .unwrap_or(0);

        while pc < program.len() {
            let op = program[pc].clone();
            pc += 1;

            let result = (|| -> anyhow::Result<Option<WaitCondition>> {
                match op {
                    Op::SetAttr(name, value) => {
                        ctx.set_attr(name, value)?;
                        Ok(None)
                    }
                    Op::IncrAttr(name) => {
                        let value = ctx.attr(name)?.as_i64().unwrap_or(0);
                        ctx.set_attr(name, json!(value + 1))?;
                        Ok(None)
                    }
                    Op::SetAttrFromCounter(name) => {
                        ctx.set_attr(name, json!(self.counter))?;
                        self.counter += 1;
                        Ok(None)
                    }
                    Op::CloneSelf => {
                        ctx.clone_self();
                        Ok(None)
                    }
                    Op::DeleteSelf => {
                        ctx.remove_self();
                        Ok(None)
                    }
                    Op::StartSound(clip) => {
                        ctx.start_performance(clip);
                        Ok(Some(WaitCondition::NextTick))
                    }
                    Op::PlaySoundUntilDone(clip) => {
                        let performance = ctx.start_performance(clip);
                        Ok(Some(WaitCondition::PerformanceDone(performance)))
                    }
                    Op::WaitTicks(ticks) => Ok(Some(WaitCondition::Ticks(ticks))),
                    Op::Broadcast(name) => {
                        ctx.broadcast(name);
                        Ok(None)
                    }
                    Op::BroadcastAndWait(name) => {
                        let group = ctx.broadcast(name);
                        Ok(Some(WaitCondition::GroupDone(group)))
                    }
                    Op::Fail(message) => Err(anyhow!(message)),
                }
            })();

            match result {
                Ok(None) => {}
                Ok(Some(wait)) => {
                    return StepOutcome::Suspended {
                        continuation: Continuation::new(Frame { pc }),
                        wait,
                    };
                }
                Err(error) => return StepOutcome::Terminated(error),
            }
        }
        StepOutcome::Completed
    }
}

/// Initialize tracing for a test binary; safe to call repeatedly
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
