use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Identifies one independent tenant (a guild).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub u64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TenantId {
    fn from(id: u64) -> Self {
        TenantId(id)
    }
}

/// One queued request to play something.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRequest {
    pub request_id: Uuid,
    pub source_query: String,
    /// Empty until the worker resolves the query.
    #[serde(default)]
    pub resolved_title: String,
    pub requested_by: String,
}

impl TrackRequest {
    pub fn new(source_query: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            source_query: source_query.into(),
            resolved_title: String::new(),
            requested_by: requested_by.into(),
        }
    }

    /// Title if resolved, otherwise the raw query.
    pub fn display_title(&self) -> &str {
        if self.resolved_title.is_empty() {
            &self.source_query
        } else {
            &self.resolved_title
        }
    }
}

/// Where a session's worker is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    Idle,
    Resolving,
    Streaming,
    /// Terminal.
    Stopped,
}

/// Flags the control surface sets and the worker observes cooperatively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ControlFlags {
    pub paused: bool,
    pub skip_requested: bool,
    pub stop_requested: bool,
}

/// Why a worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Teardown asked it to.
    Requested,
    /// The output connection broke while streaming.
    SinkFailed(String),
    Panicked(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => write!(f, "stop requested"),
            StopReason::SinkFailed(e) => write!(f, "sink failed: {}", e),
            StopReason::Panicked(e) => write!(f, "worker panicked: {}", e),
        }
    }
}

/// Updates broadcast by session workers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TrackStarted {
        tenant: TenantId,
        track: TrackRequest,
    },
    TrackFinished {
        tenant: TenantId,
        track: TrackRequest,
        frames: u64,
    },
    TrackSkipped {
        tenant: TenantId,
        track: TrackRequest,
        frames: u64,
    },
    /// A per-track failure; the worker has moved on.
    TrackFailed {
        tenant: TenantId,
        track: TrackRequest,
        error: String,
    },
    SessionStopped {
        tenant: TenantId,
        reason: StopReason,
    },
}

impl SessionEvent {
    pub fn tenant(&self) -> TenantId {
        match self {
            SessionEvent::TrackStarted { tenant, .. }
            | SessionEvent::TrackFinished { tenant, .. }
            | SessionEvent::TrackSkipped { tenant, .. }
            | SessionEvent::TrackFailed { tenant, .. }
            | SessionEvent::SessionStopped { tenant, .. } => *tenant,
        }
    }

    /// The track this event is about, if any.
    pub fn track(&self) -> Option<&TrackRequest> {
        match self {
            SessionEvent::TrackStarted { track, .. }
            | SessionEvent::TrackFinished { track, .. }
            | SessionEvent::TrackSkipped { track, .. }
            | SessionEvent::TrackFailed { track, .. } => Some(track),
            SessionEvent::SessionStopped { .. } => None,
        }
    }

    /// True once the track has left the worker, whatever the outcome.
    pub fn ends_track(&self) -> bool {
        matches!(
            self,
            SessionEvent::TrackFinished { .. } | SessionEvent::TrackSkipped { .. } | SessionEvent::TrackFailed { .. }
        )
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub tenant: TenantId,
    pub state: WorkerState,
    pub current: Option<TrackRequest>,
    pub queue_depth: usize,
    pub paused: bool,
}

/// Timing and buffering knobs shared by every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSettings {
    /// Upper bound between re-checks while paused.
    pub pause_recheck: Duration,
    /// Upper bound between re-checks while waiting for the queue.
    pub idle_recheck: Duration,
    /// How long teardown waits for the worker before aborting it.
    pub teardown_timeout: Duration,
    pub event_capacity: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            pause_recheck: Duration::from_millis(250),
            idle_recheck: Duration::from_millis(1000),
            teardown_timeout: Duration::from_millis(5000),
            event_capacity: 64,
        }
    }
}
