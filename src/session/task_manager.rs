use crate::audio::OutputSink;
use crate::session::{
    playback_session::PlaybackSession,
    state::{SessionEvent, StopReason, TenantId, WorkerState},
    worker::PlaybackWorker,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, error, info, instrument, warn};

const LOG_TARGET: &str = "r_jukebox::session::task_manager";

/// Owns one session's worker.
///
/// The worker loop runs in its own task, supervised by a second task that
/// owns the sink. Aborting the loop never skips closing the sink.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    task_handle: JoinHandle<()>,
    loop_abort: AbortHandle,
    tenant: TenantId,
}

impl WorkerHandle {
    /// Waits for the worker to exit. After `timeout` the loop is aborted and
    /// the sink close gets one more `timeout` before the supervisor is
    /// aborted too. The stop signal must already have been sent.
    #[instrument(skip(self), fields(tenant = %self.tenant))]
    pub(crate) async fn await_completion(mut self, timeout: Duration) {
        debug!(target: LOG_TARGET, "Waiting for worker task to finish...");
        tokio::select! {
            biased;
            result = &mut self.task_handle => {
                self.log_join(result);
                return;
            }
            _ = tokio::time::sleep(timeout) => {
                error!(target: LOG_TARGET, tenant = %self.tenant, "Timeout waiting for worker loop after {:?}. Aborting loop.", timeout);
                self.loop_abort.abort();
            }
        }

        tokio::select! {
            biased;
            result = &mut self.task_handle => self.log_join(result),
            _ = tokio::time::sleep(timeout) => {
                error!(target: LOG_TARGET, tenant = %self.tenant, "Sink did not close within {:?}. Aborting task.", timeout);
                self.task_handle.abort();
            }
        }
    }

    fn log_join(&self, result: Result<(), JoinError>) {
        match result {
            Ok(()) => info!(target: LOG_TARGET, tenant = %self.tenant, "Worker task finished gracefully."),
            Err(e) if e.is_cancelled() => info!(target: LOG_TARGET, tenant = %self.tenant, "Worker task was cancelled."),
            Err(e) => error!(target: LOG_TARGET, tenant = %self.tenant, "Worker task join error: {:?}", e),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Spawns the worker for a freshly created session.
///
/// However the loop ends (returning, panicking or aborted) the supervisor
/// closes the sink exactly once, marks the session closed, runs `on_exit`
/// and emits `SessionStopped`.
pub(crate) fn spawn_worker<F>(worker: PlaybackWorker, sink: Box<dyn OutputSink>, on_exit: F) -> WorkerHandle
where
    F: FnOnce(&Arc<PlaybackSession>) + Send + 'static,
{
    let session = worker.session();
    let tenant = session.tenant();
    info!(target: LOG_TARGET, tenant = %tenant, session_id = %session.session_id(), "Spawning worker task.");

    let sink = Arc::new(TokioMutex::new(sink));
    let loop_sink = Arc::clone(&sink);
    let loop_handle = tokio::spawn(async move {
        let mut sink = loop_sink.lock().await;
        worker.run(&mut **sink).await
    });
    let loop_abort = loop_handle.abort_handle();

    let task_handle = tokio::spawn(async move {
        let reason = match loop_handle.await {
            Ok(reason) => reason,
            Err(e) if e.is_panic() => {
                let msg = panic_message(e.into_panic().as_ref());
                error!(target: LOG_TARGET, tenant = %tenant, "Worker panicked: {}", msg);
                StopReason::Panicked(msg)
            }
            Err(_) => {
                warn!(target: LOG_TARGET, tenant = %tenant, "Worker loop aborted mid-operation.");
                StopReason::Requested
            }
        };

        session.set_current(None);
        session.set_state(WorkerState::Stopped);
        // The loop task has released the sink by now.
        if let Err(e) = sink.lock().await.close().await {
            warn!(target: LOG_TARGET, tenant = %tenant, "Error closing sink: {}", e);
        }
        session.mark_closed();
        on_exit(&session);
        info!(target: LOG_TARGET, tenant = %tenant, "Worker stopped: {}", reason);
        session.emit(SessionEvent::SessionStopped { tenant, reason });
    });

    WorkerHandle {
        task_handle,
        loop_abort,
        tenant,
    }
}
