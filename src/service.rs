//! Tenant-facing playback operations on top of the session registry.

use crate::audio::{Transcoder, VoiceConnector};
use crate::resolver::{ResolveError, TrackResolver};
use crate::session::{
    PlaybackError, PlaybackSession, PlaybackSettings, SessionEvent, SessionRegistry, SessionStatus, TenantId,
    TrackRequest,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument};

const LOG_TARGET: &str = "r_jukebox::service";

/// Supplies the queries stored in a named playlist. Storage itself lives
/// elsewhere; playback only reads.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    /// Fails with `ResolveError::NotFound` when there is no such playlist.
    async fn playlist_queries(&self, tenant: TenantId, name: &str) -> Result<Vec<String>, ResolveError>;
}

/// The operations a command layer calls.
///
/// Every operation except `join_tenant`, `enqueue`, `enqueue_batch` and
/// `play_playlist` fails with `SessionNotFound` when the tenant has no
/// session; those four join implicitly through the default connector.
pub struct PlaybackService {
    registry: SessionRegistry,
    connector: Arc<dyn VoiceConnector>,
}

impl PlaybackService {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        transcoder: Arc<dyn Transcoder>,
        connector: Arc<dyn VoiceConnector>,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(resolver, transcoder, settings),
            connector,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Joins through the default connector.
    pub async fn join_tenant(&self, tenant: TenantId) -> Result<Arc<PlaybackSession>, PlaybackError> {
        self.registry.create_or_attach(tenant, self.connector.as_ref()).await
    }

    /// Joins through a specific connector.
    pub async fn join_tenant_with(
        &self,
        tenant: TenantId,
        connector: &dyn VoiceConnector,
    ) -> Result<Arc<PlaybackSession>, PlaybackError> {
        self.registry.create_or_attach(tenant, connector).await
    }

    #[instrument(skip(self))]
    pub async fn leave_tenant(&self, tenant: TenantId) -> Result<(), PlaybackError> {
        self.registry.remove(tenant).await.map(|_| ())
    }

    /// Queues a track, joining first if needed. Returns the queue depth.
    #[instrument(skip(self, track), fields(request_id = %track.request_id))]
    pub async fn enqueue(&self, tenant: TenantId, track: TrackRequest) -> Result<usize, PlaybackError> {
        let session = self.join_tenant(tenant).await?;
        let depth = session.enqueue(track);
        info!(target: LOG_TARGET, tenant = %tenant, depth, "Track queued.");
        Ok(depth)
    }

    /// Queues `tracks` as one contiguous block, joining first if needed.
    pub async fn enqueue_batch(&self, tenant: TenantId, tracks: Vec<TrackRequest>) -> Result<usize, PlaybackError> {
        let session = self.join_tenant(tenant).await?;
        let added = tracks.len();
        let depth = session.enqueue_batch(tracks);
        info!(target: LOG_TARGET, tenant = %tenant, added, depth, "Batch queued.");
        Ok(depth)
    }

    /// Loads a stored playlist and queues every entry. Returns how many were queued.
    #[instrument(skip(self, source))]
    pub async fn play_playlist(
        &self,
        tenant: TenantId,
        source: &dyn PlaylistSource,
        name: &str,
        requested_by: &str,
    ) -> Result<usize, PlaybackError> {
        let queries = source.playlist_queries(tenant, name).await?;
        let tracks: Vec<TrackRequest> = queries.into_iter().map(|q| TrackRequest::new(q, requested_by)).collect();
        let count = tracks.len();
        self.enqueue_batch(tenant, tracks).await?;
        Ok(count)
    }

    pub async fn pause(&self, tenant: TenantId) -> Result<(), PlaybackError> {
        self.registry.get(tenant).await?.set_paused(true);
        Ok(())
    }

    pub async fn resume(&self, tenant: TenantId) -> Result<(), PlaybackError> {
        self.registry.get(tenant).await?.set_paused(false);
        Ok(())
    }

    pub async fn skip(&self, tenant: TenantId) -> Result<(), PlaybackError> {
        self.registry.get(tenant).await?.request_skip();
        Ok(())
    }

    /// Drops pending items; returns how many.
    pub async fn clear_queue(&self, tenant: TenantId) -> Result<usize, PlaybackError> {
        Ok(self.registry.get(tenant).await?.clear_pending())
    }

    pub async fn queue_depth(&self, tenant: TenantId) -> Result<usize, PlaybackError> {
        Ok(self.registry.get(tenant).await?.queue_depth())
    }

    pub async fn current_track(&self, tenant: TenantId) -> Result<Option<TrackRequest>, PlaybackError> {
        Ok(self.registry.get(tenant).await?.current_track())
    }

    pub async fn status(&self, tenant: TenantId) -> Result<SessionStatus, PlaybackError> {
        Ok(self.registry.get(tenant).await?.status())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.registry.subscribe()
    }

    /// Tears every session down. Returns how many were removed.
    pub async fn shutdown_all(&self) -> usize {
        self.registry.shutdown_all().await
    }
}
