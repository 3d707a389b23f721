//! Troupe – a deterministic, frame-stepped cooperative scheduler for
//! actor-based creative coding
//!
//! This crate implements the execution core of an event-driven,
//! sprite-and-script environment:
//! - Broadcast events fan out into script threads that are admitted no
//!   earlier than the tick after they were enqueued
//! - All in-flight threads advance by exactly one opportunity per tick,
//!   in stable insertion order, so every run is replayable
//! - A two-phase clone protocol: synchronous attribute copy, deferred
//!   "start as clone" handlers
//! - A thin query/command boundary to externally-owned effects such as
//!   sound playback, observed at tick granularity
//!
//! The script language itself lives outside this crate: handler bodies
//! are opaque references executed by a [`runtime::script::ScriptHost`],
//! which may suspend them cooperatively at designated points.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Runtime core modules implementing the frame-stepped scheduler
pub mod runtime;

// Re-export key types for convenience
pub use runtime::{Project, ProjectConfig};

/// Current version of the Troupe runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
