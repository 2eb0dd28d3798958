use crate::audio::{FrameSequence, OutputSink, PcmFrame, Transcoder};
use crate::resolver::TrackResolver;
use crate::session::{
    error::PlaybackError,
    playback_session::PlaybackSession,
    state::{ControlFlags, PlaybackSettings, SessionEvent, StopReason, TrackRequest, WorkerState},
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, trace, warn};

const LOG_TARGET: &str = "r_jukebox::session::worker";

/// How one track left the worker.
#[derive(Debug)]
enum TrackOutcome {
    Finished { frames: u64 },
    Skipped { frames: u64 },
    /// Per-track failure; the loop moves on.
    Failed(PlaybackError),
    Stopped,
    /// The sink broke; the session is over.
    SinkFailed(PlaybackError),
}

/// What the pause gate decided for the frame in hand.
enum Gate {
    Write,
    Skip,
    Stop,
}

/// The loop that drains one session's queue into its sink.
pub(crate) struct PlaybackWorker {
    session: Arc<PlaybackSession>,
    resolver: Arc<dyn TrackResolver>,
    transcoder: Arc<dyn Transcoder>,
    settings: PlaybackSettings,
    flags: watch::Receiver<ControlFlags>,
}

impl PlaybackWorker {
    pub(crate) fn new(
        session: Arc<PlaybackSession>,
        resolver: Arc<dyn TrackResolver>,
        transcoder: Arc<dyn Transcoder>,
        settings: PlaybackSettings,
    ) -> Self {
        let flags = session.control_flags();
        Self {
            session,
            resolver,
            transcoder,
            settings,
            flags,
        }
    }

    pub(crate) fn session(&self) -> Arc<PlaybackSession> {
        Arc::clone(&self.session)
    }

    fn flags(&mut self) -> ControlFlags {
        *self.flags.borrow_and_update()
    }

    /// Runs until stopped or until the sink fails.
    #[instrument(skip(self, sink), fields(tenant = %self.session.tenant(), session_id = %self.session.session_id()))]
    pub(crate) async fn run(mut self, sink: &mut dyn OutputSink) -> StopReason {
        info!(target: LOG_TARGET, "Worker started.");
        loop {
            let track = match self.next_track().await {
                Some(track) => track,
                None => return StopReason::Requested,
            };

            let outcome = self.play_track(track.clone(), sink).await;
            self.session.set_current(None);
            let tenant = self.session.tenant();

            match outcome {
                TrackOutcome::Finished { frames } => {
                    info!(target: LOG_TARGET, request_id = %track.request_id, frames, "Track finished.");
                    self.session.emit(SessionEvent::TrackFinished { tenant, track, frames });
                }
                TrackOutcome::Skipped { frames } => {
                    info!(target: LOG_TARGET, request_id = %track.request_id, frames, "Track skipped.");
                    self.session.emit(SessionEvent::TrackSkipped { tenant, track, frames });
                }
                TrackOutcome::Failed(e) => {
                    warn!(target: LOG_TARGET, request_id = %track.request_id, query = %track.source_query, "Track failed: {}", e);
                    self.session.emit(SessionEvent::TrackFailed {
                        tenant,
                        track,
                        error: e.to_string(),
                    });
                }
                TrackOutcome::Stopped => return StopReason::Requested,
                TrackOutcome::SinkFailed(e) => {
                    error!(target: LOG_TARGET, request_id = %track.request_id, "Sink failed, stopping session: {}", e);
                    return StopReason::SinkFailed(e.to_string());
                }
            }
        }
    }

    /// Idle: waits for the next queued item. `None` means stop.
    async fn next_track(&mut self) -> Option<TrackRequest> {
        self.session.set_state(WorkerState::Idle);
        loop {
            if self.flags().stop_requested {
                debug!(target: LOG_TARGET, "Stop observed while idle.");
                return None;
            }
            if let Some(track) = self.session.pop_next() {
                // A skip aimed at a track that already ended does not carry over.
                self.session.clear_skip();
                self.flags.borrow_and_update();
                return Some(track);
            }

            trace!(target: LOG_TARGET, "Queue empty; waiting.");
            let idle_recheck = self.settings.idle_recheck;
            let session = Arc::clone(&self.session);
            tokio::select! {
                biased;
                changed = self.flags.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = session.queue_notified() => {}
                _ = tokio::time::sleep(idle_recheck) => {}
            }
        }
    }

    /// Resolving then Streaming for one track.
    #[instrument(skip(self, track, sink), fields(request_id = %track.request_id))]
    async fn play_track(&mut self, mut track: TrackRequest, sink: &mut dyn OutputSink) -> TrackOutcome {
        self.session.set_state(WorkerState::Resolving);

        let flags = self.flags();
        if flags.stop_requested {
            return TrackOutcome::Stopped;
        }
        if flags.skip_requested {
            self.session.clear_skip();
            return TrackOutcome::Skipped { frames: 0 };
        }

        let resolver = Arc::clone(&self.resolver);
        let metadata = match self.unless_stopped(resolver.resolve(&track.source_query)).await {
            None => return TrackOutcome::Stopped,
            Some(Err(e)) => return TrackOutcome::Failed(e.into()),
            Some(Ok(metadata)) => metadata,
        };
        track.resolved_title = metadata.title.clone();
        debug!(target: LOG_TARGET, "Resolved '{}' to {}", track.source_query, metadata.canonical_url);

        let (stream, declared) = match self.unless_stopped(resolver.open_stream(&metadata.canonical_url)).await {
            None => return TrackOutcome::Stopped,
            Some(Err(e)) => return TrackOutcome::Failed(e.into()),
            Some(Ok(opened)) => opened,
        };

        let transcoder = Arc::clone(&self.transcoder);
        let mut frames = match self.unless_stopped(transcoder.open(stream, declared)).await {
            None => return TrackOutcome::Stopped,
            Some(Err(e)) => return TrackOutcome::Failed(e.into()),
            Some(Ok(frames)) => frames,
        };

        self.session.set_current(Some(track.clone()));
        self.session.set_state(WorkerState::Streaming);
        self.session.emit(SessionEvent::TrackStarted {
            tenant: self.session.tenant(),
            track: track.clone(),
        });
        info!(target: LOG_TARGET, title = %track.display_title(), "Streaming started.");

        self.stream_frames(frames.as_mut(), sink).await
    }

    /// Streaming: moves frames into the sink one at a time, checking the
    /// control flags around every write.
    async fn stream_frames(&mut self, frames: &mut dyn FrameSequence, sink: &mut dyn OutputSink) -> TrackOutcome {
        let mut written = 0u64;
        loop {
            let flags = self.flags();
            if flags.stop_requested {
                return TrackOutcome::Stopped;
            }
            if flags.skip_requested {
                return self.finish_skip(sink, written).await;
            }

            let next = tokio::select! {
                biased;
                changed = wait_for_interrupt(&mut self.flags) => {
                    if changed.is_err() {
                        return TrackOutcome::Stopped;
                    }
                    // Loop back so the top of the loop decides.
                    continue;
                }
                next = frames.next_frame() => next,
            };

            let frame: PcmFrame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    if let Err(e) = sink.flush().await {
                        return TrackOutcome::SinkFailed(PlaybackError::SinkWriteError(e));
                    }
                    return TrackOutcome::Finished { frames: written };
                }
                Err(e) => return TrackOutcome::Failed(e.into()),
            };

            match self.pause_gate().await {
                Gate::Write => {}
                Gate::Skip => return self.finish_skip(sink, written).await,
                Gate::Stop => return TrackOutcome::Stopped,
            }

            if let Err(e) = sink.write_frame(&frame).await {
                return TrackOutcome::SinkFailed(PlaybackError::SinkWriteError(e));
            }
            written += 1;
        }
    }

    async fn finish_skip(&mut self, sink: &mut dyn OutputSink, written: u64) -> TrackOutcome {
        self.session.clear_skip();
        self.flags.borrow_and_update();
        if let Err(e) = sink.flush().await {
            return TrackOutcome::SinkFailed(PlaybackError::SinkWriteError(e));
        }
        TrackOutcome::Skipped { frames: written }
    }

    /// Holds the frame in hand while paused. Wakes on any flag change and at
    /// least every `pause_recheck`.
    async fn pause_gate(&mut self) -> Gate {
        let mut logged = false;
        loop {
            let flags = self.flags();
            if flags.stop_requested {
                return Gate::Stop;
            }
            if flags.skip_requested {
                return Gate::Skip;
            }
            if !flags.paused {
                if logged {
                    debug!(target: LOG_TARGET, "Resumed.");
                }
                return Gate::Write;
            }
            if !logged {
                debug!(target: LOG_TARGET, "Paused; holding frame.");
                logged = true;
            }
            if let Ok(Err(_)) = tokio::time::timeout(self.settings.pause_recheck, self.flags.changed()).await {
                return Gate::Stop;
            }
        }
    }

    /// Runs `fut` unless a stop arrives first.
    async fn unless_stopped<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        let mut flags = self.flags.clone();
        tokio::select! {
            biased;
            _ = wait_for_stop(&mut flags) => None,
            out = fut => Some(out),
        }
    }
}

async fn wait_for_stop(flags: &mut watch::Receiver<ControlFlags>) {
    loop {
        if flags.borrow_and_update().stop_requested {
            return;
        }
        if flags.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves once stop or skip is set.
async fn wait_for_interrupt(flags: &mut watch::Receiver<ControlFlags>) -> Result<(), watch::error::RecvError> {
    loop {
        {
            let current = flags.borrow_and_update();
            if current.stop_requested || current.skip_requested {
                return Ok(());
            }
        }
        flags.changed().await?;
    }
}
