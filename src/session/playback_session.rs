use crate::session::{
    state::{ControlFlags, SessionEvent, SessionStatus, TenantId, TrackRequest, WorkerState},
    task_manager::WorkerHandle,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, info, instrument, trace};
use uuid::Uuid;

const LOG_TARGET: &str = "r_jukebox::session";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-tenant playback state: the queue, the control flags and what is
/// playing right now. Exactly one worker drives a session for its lifetime.
///
/// The queue and flags are only changed through the methods here; the worker
/// alone sets the current track and writes to the sink.
pub struct PlaybackSession {
    tenant: TenantId,
    session_id: Uuid,
    queue: Mutex<VecDeque<TrackRequest>>,
    queue_notify: Notify,
    flags: watch::Sender<ControlFlags>,
    current_track: Mutex<Option<TrackRequest>>,
    state: watch::Sender<WorkerState>,
    // Set once the worker has exited and the sink is closed.
    closed: AtomicBool,
    worker: Mutex<Option<WorkerHandle>>,
    events: broadcast::Sender<SessionEvent>,
}

impl PlaybackSession {
    pub(crate) fn new(tenant: TenantId, events: broadcast::Sender<SessionEvent>) -> Self {
        let (flags, _) = watch::channel(ControlFlags::default());
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            tenant,
            session_id: Uuid::new_v4(),
            queue: Mutex::new(VecDeque::new()),
            queue_notify: Notify::new(),
            flags,
            current_track: Mutex::new(None),
            state,
            closed: AtomicBool::new(false),
            worker: Mutex::new(None),
            events,
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    // --- Control surface ---

    /// Appends at the tail. Never blocks on playback. Returns the new depth.
    pub fn enqueue(&self, track: TrackRequest) -> usize {
        let depth = {
            let mut queue = lock(&self.queue);
            queue.push_back(track);
            queue.len()
        };
        trace!(target: LOG_TARGET, tenant = %self.tenant, depth, "Track enqueued");
        self.queue_notify.notify_one();
        depth
    }

    /// Appends `tracks` as one contiguous block.
    pub fn enqueue_batch(&self, tracks: impl IntoIterator<Item = TrackRequest>) -> usize {
        let depth = {
            let mut queue = lock(&self.queue);
            queue.extend(tracks);
            queue.len()
        };
        self.queue_notify.notify_one();
        depth
    }

    /// Drops every pending item. The current track keeps playing.
    pub fn clear_pending(&self) -> usize {
        let cleared = {
            let mut queue = lock(&self.queue);
            let n = queue.len();
            queue.clear();
            n
        };
        info!(target: LOG_TARGET, tenant = %self.tenant, cleared, "Queue cleared");
        cleared
    }

    pub fn queue_depth(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Snapshot of the pending items in play order.
    pub fn pending(&self) -> Vec<TrackRequest> {
        lock(&self.queue).iter().cloned().collect()
    }

    pub fn set_paused(&self, paused: bool) {
        self.flags.send_modify(|flags| flags.paused = paused);
        debug!(target: LOG_TARGET, tenant = %self.tenant, paused, "Pause flag set");
    }

    pub fn is_paused(&self) -> bool {
        self.flags.borrow().paused
    }

    /// Asks the worker to abandon the current track. A request made while
    /// nothing is playing is dropped when the next track starts.
    pub fn request_skip(&self) {
        self.flags.send_modify(|flags| flags.skip_requested = true);
        debug!(target: LOG_TARGET, tenant = %self.tenant, "Skip requested");
    }

    pub fn current_track(&self) -> Option<TrackRequest> {
        lock(&self.current_track).clone()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watches worker state transitions.
    pub fn state_changes(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            tenant: self.tenant,
            state: self.state(),
            current: self.current_track(),
            queue_depth: self.queue_depth(),
            paused: self.is_paused(),
        }
    }

    /// True once the worker has exited and the sink is closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // --- Worker side ---

    pub(crate) fn control_flags(&self) -> watch::Receiver<ControlFlags> {
        self.flags.subscribe()
    }

    pub(crate) fn pop_next(&self) -> Option<TrackRequest> {
        lock(&self.queue).pop_front()
    }

    pub(crate) async fn queue_notified(&self) {
        self.queue_notify.notified().await
    }

    pub(crate) fn clear_skip(&self) {
        self.flags.send_if_modified(|flags| std::mem::replace(&mut flags.skip_requested, false));
    }

    pub(crate) fn request_stop(&self) {
        self.flags.send_modify(|flags| flags.stop_requested = true);
    }

    pub(crate) fn set_current(&self, track: Option<TrackRequest>) {
        *lock(&self.current_track) = track;
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn attach_worker(&self, handle: WorkerHandle) {
        *lock(&self.worker) = Some(handle);
    }

    /// Stops the worker and waits for it to close the sink.
    ///
    /// Safe to call more than once; later calls find no worker and return.
    #[instrument(skip(self), fields(tenant = %self.tenant, session_id = %self.session_id))]
    pub(crate) async fn shutdown(&self, timeout: Duration) {
        self.request_stop();
        let handle = lock(&self.worker).take();
        match handle {
            Some(handle) => {
                handle.await_completion(timeout).await;
                info!(target: LOG_TARGET, "Session torn down.");
            }
            None => trace!(target: LOG_TARGET, "Session already torn down."),
        }
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("tenant", &self.tenant)
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .field("queue_depth", &self.queue_depth())
            .field("closed", &self.is_closed())
            .finish()
    }
}
