//! Error types for the Troupe runtime
//!
//! Domain errors use thiserror; failures raised inside user scripts cross
//! the host boundary as opaque `anyhow::Error` values and are surfaced as
//! [`ScriptFault`] records rather than aborting the tick.

use thiserror::Error;

use super::instance::InstanceId;
use super::script::BodyId;

/// Top-level project error
#[derive(Debug, Error)]
pub enum ProjectError {
    /// Instance store misuse
    #[error("instance error: {0}")]
    Instance(#[from] InstanceError),

    /// No actor registered under the given name
    #[error("no actor named '{0}'")]
    UnknownActor(String),

    /// An actor with this name is already registered
    #[error("actor '{0}' is already registered")]
    DuplicateActor(String),
}

/// Convenience result alias for project operations
pub type ProjectResult<T> = std::result::Result<T, ProjectError>;

/// Instance store errors
///
/// These indicate programming errors in the core or its caller; correct
/// use never produces them, so they are returned to the caller rather
/// than silently ignored.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// The instance id does not name a live instance
    #[error("no instance with id {0}")]
    NoSuchInstance(InstanceId),

    /// The attribute name was not declared when the instance was created
    #[error("instance {instance} has no attribute '{name}'")]
    NoSuchAttribute {
        /// Instance that was addressed
        instance: InstanceId,
        /// Undeclared attribute name
        name: String,
    },
}

/// Convenience result alias for instance store operations
pub type InstanceResult<T> = std::result::Result<T, InstanceError>;

/// Record of an unrecovered error raised by a script body
///
/// A fault terminates only the offending thread. The error itself is
/// logged when the thread is torn down; the record keeps the rendered
/// message so diagnostics stay cloneable and serializable.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScriptFault {
    /// Instance the faulting thread was running against
    pub instance: InstanceId,
    /// Handler body that raised the error
    pub body: BodyId,
    /// Rendered error chain
    pub message: String,
}

impl std::fmt::Display for ScriptFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "script fault on instance {} (body {}): {}",
            self.instance, self.body, self.message
        )
    }
}
