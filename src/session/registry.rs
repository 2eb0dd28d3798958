use crate::audio::{SinkError, Transcoder, VoiceConnector};
use crate::resolver::TrackResolver;
use crate::session::{
    error::PlaybackError,
    playback_session::PlaybackSession,
    state::{PlaybackSettings, SessionEvent, TenantId},
    task_manager,
    worker::PlaybackWorker,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{broadcast, Mutex as TokioMutex};
use tracing::{debug, info, instrument, warn};

const LOG_TARGET: &str = "r_jukebox::session::registry";

/// One tenant's entry. The async lock serializes create/remove for that
/// tenant only; the outer map lock is never held across an await.
type Slot = Arc<TokioMutex<Option<Arc<PlaybackSession>>>>;
type SlotMap = Mutex<HashMap<TenantId, Slot>>;

fn lock_slots(slots: &SlotMap) -> MutexGuard<'_, HashMap<TenantId, Slot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Maps tenants to their live sessions and guarantees at most one session,
/// and so one worker, per tenant.
pub struct SessionRegistry {
    slots: Arc<SlotMap>,
    resolver: Arc<dyn TrackResolver>,
    transcoder: Arc<dyn Transcoder>,
    settings: PlaybackSettings,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRegistry {
    pub fn new(resolver: Arc<dyn TrackResolver>, transcoder: Arc<dyn Transcoder>, settings: PlaybackSettings) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            resolver,
            transcoder,
            settings,
            events,
        }
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    /// Events from every session this registry creates.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<TenantId, Slot>> {
        lock_slots(&self.slots)
    }

    fn slot_or_insert(&self, tenant: TenantId) -> Slot {
        Arc::clone(self.slots().entry(tenant).or_insert_with(|| Arc::new(TokioMutex::new(None))))
    }

    fn existing_slot(&self, tenant: TenantId) -> Option<Slot> {
        self.slots().get(&tenant).cloned()
    }

    /// Whether `slot` is still the registered slot for `tenant`.
    fn is_current(&self, tenant: TenantId, slot: &Slot) -> bool {
        self.slots().get(&tenant).map_or(false, |s| Arc::ptr_eq(s, slot))
    }

    fn drop_slot(&self, tenant: TenantId, slot: &Slot) {
        let mut slots = self.slots();
        if slots.get(&tenant).map_or(false, |s| Arc::ptr_eq(s, slot)) {
            slots.remove(&tenant);
        }
    }

    /// Forgets `slot` once its session stops on its own, for example after a
    /// sink failure. A busy slot is left alone; its holder sees the closed
    /// session.
    fn reaper(&self, tenant: TenantId, slot: &Slot) -> impl FnOnce(&Arc<PlaybackSession>) + Send + 'static {
        let slots: Weak<SlotMap> = Arc::downgrade(&self.slots);
        let slot = Arc::downgrade(slot);
        move |session: &Arc<PlaybackSession>| {
            let (slots, slot) = match (slots.upgrade(), slot.upgrade()) {
                (Some(slots), Some(slot)) => (slots, slot),
                _ => return,
            };
            let mut entry = match slot.try_lock() {
                Ok(entry) => entry,
                Err(_) => return,
            };
            if !entry.as_ref().map_or(false, |s| Arc::ptr_eq(s, session)) {
                return;
            }
            *entry = None;
            let mut map = lock_slots(&slots);
            if map.get(&tenant).map_or(false, |s| Arc::ptr_eq(s, &slot)) {
                map.remove(&tenant);
            }
            debug!(target: LOG_TARGET, tenant = %tenant, "Dropped stopped session {}", session.session_id());
        }
    }

    /// Returns the tenant's session, creating it if needed.
    ///
    /// Creation connects the sink through `connector`, stores the session and
    /// spawns its one worker before returning. Concurrent callers for the same
    /// tenant all get the same session. A failed connect leaves nothing behind.
    #[instrument(skip(self, connector), fields(tenant = %tenant))]
    pub async fn create_or_attach(
        &self,
        tenant: TenantId,
        connector: &dyn VoiceConnector,
    ) -> Result<Arc<PlaybackSession>, PlaybackError> {
        loop {
            let slot = self.slot_or_insert(tenant);
            let mut entry = slot.lock().await;
            if !self.is_current(tenant, &slot) {
                // Removed while we waited; start over with a fresh slot.
                continue;
            }

            if let Some(session) = entry.as_ref() {
                if !session.is_closed() {
                    debug!(target: LOG_TARGET, "Attaching to existing session {}", session.session_id());
                    return Ok(Arc::clone(session));
                }
                info!(target: LOG_TARGET, "Replacing stopped session {}", session.session_id());
                session.shutdown(self.settings.teardown_timeout).await;
                *entry = None;
            }

            let mut sink = match connector.connect(tenant).await {
                Ok(sink) => sink,
                Err(e) => {
                    warn!(target: LOG_TARGET, "Sink connect failed: {}", e);
                    self.drop_slot(tenant, &slot);
                    return Err(PlaybackError::SinkConnectError(e));
                }
            };

            let produced = self.transcoder.frame_format();
            if sink.frame_format() != produced {
                let msg = format!(
                    "sink expects {:?} but the transcoder produces {:?}",
                    sink.frame_format(),
                    produced
                );
                warn!(target: LOG_TARGET, "Rejecting sink: {}", msg);
                if let Err(e) = sink.close().await {
                    warn!(target: LOG_TARGET, "Error closing rejected sink: {}", e);
                }
                self.drop_slot(tenant, &slot);
                return Err(PlaybackError::SinkConnectError(SinkError::Connect(msg)));
            }

            let session = Arc::new(PlaybackSession::new(tenant, self.events.clone()));
            let worker = PlaybackWorker::new(
                Arc::clone(&session),
                Arc::clone(&self.resolver),
                Arc::clone(&self.transcoder),
                self.settings,
            );
            let reaper = self.reaper(tenant, &slot);
            session.attach_worker(task_manager::spawn_worker(worker, sink, reaper));
            *entry = Some(Arc::clone(&session));
            info!(target: LOG_TARGET, session_id = %session.session_id(), "Session created.");
            return Ok(session);
        }
    }

    /// The tenant's live session.
    pub async fn get(&self, tenant: TenantId) -> Result<Arc<PlaybackSession>, PlaybackError> {
        loop {
            let slot = self.existing_slot(tenant).ok_or(PlaybackError::SessionNotFound(tenant))?;
            let entry = slot.lock().await;
            if !self.is_current(tenant, &slot) {
                continue;
            }
            return match entry.as_ref() {
                Some(session) if !session.is_closed() => Ok(Arc::clone(session)),
                _ => Err(PlaybackError::SessionNotFound(tenant)),
            };
        }
    }

    /// Removes the tenant's session and tears it down: stop the worker, wait
    /// for it, close the sink, then drop the entry.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn remove(&self, tenant: TenantId) -> Result<Arc<PlaybackSession>, PlaybackError> {
        loop {
            let slot = self.existing_slot(tenant).ok_or(PlaybackError::SessionNotFound(tenant))?;
            let mut entry = slot.lock().await;
            if !self.is_current(tenant, &slot) {
                continue;
            }

            let session = entry.take();
            let already_stopped = session.as_ref().map_or(true, |s| s.is_closed());
            if let Some(session) = &session {
                session.shutdown(self.settings.teardown_timeout).await;
            }
            self.drop_slot(tenant, &slot);
            drop(entry);

            // A session that already stopped on its own was gone before this call.
            return match session {
                Some(session) if !already_stopped => {
                    info!(target: LOG_TARGET, session_id = %session.session_id(), "Session removed.");
                    Ok(session)
                }
                _ => Err(PlaybackError::SessionNotFound(tenant)),
            };
        }
    }

    /// Tenants with a registry entry.
    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self.slots().keys().copied().collect();
        tenants.sort();
        tenants
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tears down every session concurrently.
    pub async fn shutdown_all(&self) -> usize {
        let tenants = self.tenants();
        info!(target: LOG_TARGET, "Shutting down {} session(s).", tenants.len());
        let results = join_all(tenants.into_iter().map(|tenant| self.remove(tenant))).await;
        results.into_iter().filter(|r| r.is_ok()).count()
    }
}
