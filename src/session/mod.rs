//! Per-tenant playback sessions, their workers and the registry that owns them.

mod error;
mod playback_session;
mod registry;
mod state;
mod task_manager;
mod worker;

pub use error::PlaybackError;
pub use playback_session::PlaybackSession;
pub use registry::SessionRegistry;
pub use state::{PlaybackSettings, SessionEvent, SessionStatus, StopReason, TenantId, TrackRequest, WorkerState};
