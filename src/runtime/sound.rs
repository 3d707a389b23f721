//! Query/command boundary to the asynchronous playback subsystem
//!
//! The scheduler only ever starts performances and asks whether they are
//! still active; how long a performance stays active is entirely the
//! backend's concern. Backends sit behind `Arc` with interior mutability
//! so the embedding host can drive and inspect the same object the
//! running scripts talk to.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle for one in-progress performance
///
/// Minted by the backend; the core never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerformanceId(Uuid);

impl PerformanceId {
    /// Mint a fresh handle
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PerformanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PerformanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "perf:{}", self.0)
    }
}

/// Playback subsystem as seen by the scheduler
///
/// `start` is fire-and-forget and must return immediately; `is_active` is
/// a point-in-time query. A backend never blocks a tick and never
/// initiates scheduler actions of its own.
pub trait SoundBackend: Send + Sync {
    /// Begin playing a clip, returning its performance handle
    fn start(&self, clip: &str) -> PerformanceId;

    /// Whether the performance is still active
    fn is_active(&self, id: PerformanceId) -> bool;

    /// Number of currently active performances (tick bookkeeping)
    fn active_count(&self) -> usize;
}

/// Backend on which every performance is already finished
///
/// The default for projects that never touch sound.
#[derive(Debug, Default)]
pub struct NullSounds;

impl SoundBackend for NullSounds {
    fn start(&self, clip: &str) -> PerformanceId {
        tracing::debug!(clip, "null sound backend discarding performance");
        PerformanceId::new()
    }

    fn is_active(&self, _id: PerformanceId) -> bool {
        false
    }

    fn active_count(&self) -> usize {
        0
    }
}

#[derive(Debug)]
struct Performance {
    id: PerformanceId,
    tag: String,
    remaining_frames: u64,
}

#[derive(Debug, Default)]
struct SoundState {
    clips: Vec<(String, u64)>,
    performances: Vec<Performance>,
}

/// Deterministic in-memory backend
///
/// Clips are registered with a duration measured in frames of the
/// backend's own clock, which the embedding host advances explicitly with
/// [`InMemorySounds::advance_frame`]. Starting an unregistered clip
/// produces a performance that is already finished.
#[derive(Debug, Default)]
pub struct InMemorySounds {
    state: Mutex<SoundState>,
}

impl InMemorySounds {
    /// Create a backend with no registered clips
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip and how many frames it plays for
    pub fn register_clip(&self, tag: impl Into<String>, frames: u64) {
        self.state.lock().clips.push((tag.into(), frames));
    }

    /// Advance the backend's clock by one frame
    ///
    /// Each active performance loses one frame of remaining time;
    /// performances that reach zero fall silent.
    pub fn advance_frame(&self) {
        let mut state = self.state.lock();
        for performance in &mut state.performances {
            performance.remaining_frames = performance.remaining_frames.saturating_sub(1);
        }
        state
            .performances
            .retain(|performance| performance.remaining_frames > 0);
    }

    /// Tags of currently active performances, in start order
    pub fn running_tags(&self) -> Vec<String> {
        self.state
            .lock()
            .performances
            .iter()
            .map(|performance| performance.tag.clone())
            .collect()
    }
}

impl SoundBackend for InMemorySounds {
    fn start(&self, clip: &str) -> PerformanceId {
        let mut state = self.state.lock();
        let frames = state
            .clips
            .iter()
            .find(|(tag, _)| tag == clip)
            .map(|(_, frames)| *frames)
            .unwrap_or_else(|| {
                tracing::warn!(clip, "starting unregistered clip; zero duration");
                0
            });

        let id = PerformanceId::new();
        if frames > 0 {
            state.performances.push(Performance {
                id,
                tag: clip.to_string(),
                remaining_frames: frames,
            });
        }
        id
    }

    fn is_active(&self, id: PerformanceId) -> bool {
        self.state
            .lock()
            .performances
            .iter()
            .any(|performance| performance.id == id)
    }

    fn active_count(&self) -> usize {
        self.state.lock().performances.len()
    }
}
