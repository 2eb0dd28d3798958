//! Command-line interface implementation

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::Settings;
use crate::session::{SessionEvent, TenantId};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}

/// Command-line arguments for r-jukebox
#[derive(Parser, Debug)]
#[command(author, version, about = "Queue-driven audio player writing PCM per tenant", long_about = None)]
pub struct Args {
    /// Track URLs to queue, in order
    pub queries: Vec<String>,

    /// JSON file holding an array of track URLs to queue after the positional ones
    #[arg(short, long, env = "JUKEBOX_PLAYLIST")]
    pub playlist: Option<PathBuf>,

    /// Tenant the tracks are played for
    #[arg(short, long, default_value_t = 1, env = "JUKEBOX_TENANT")]
    pub tenant: u64,

    /// Name recorded as the requester
    #[arg(long, default_value = "cli", env = "JUKEBOX_REQUESTED_BY")]
    pub requested_by: String,

    /// Directory PCM output is written to
    #[arg(short, long, env = "JUKEBOX_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, env = "JUKEBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Plain, env = "JUKEBOX_LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn tenant_id(&self) -> TenantId {
        TenantId(self.tenant)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Settings::default_path)
    }

    /// Command-line values win over the config file.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
    }
}

/// One human-readable line per session event
pub fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::TrackStarted { tenant, track } => {
            format!("[{}] Now playing: {} (requested by {})", tenant, track.display_title(), track.requested_by)
        }
        SessionEvent::TrackFinished { tenant, track, frames } => {
            format!("[{}] Finished: {} ({} frames)", tenant, track.display_title(), frames)
        }
        SessionEvent::TrackSkipped { tenant, track, frames } => {
            format!("[{}] Skipped: {} after {} frames", tenant, track.display_title(), frames)
        }
        SessionEvent::TrackFailed { tenant, track, error } => {
            format!("[{}] Could not play {}: {}", tenant, track.source_query, error)
        }
        SessionEvent::SessionStopped { tenant, reason } => format!("[{}] Session stopped: {}", tenant, reason),
    }
}
