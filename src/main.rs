use clap::Parser;
use r_jukebox::audio::{FileSinkConnector, SymphoniaTranscoder};
use r_jukebox::config::Settings;
use r_jukebox::init_app_dirs;
use r_jukebox::resolver::HttpTrackResolver;
use r_jukebox::service::PlaybackService;
use r_jukebox::session::{SessionEvent, TrackRequest};
use r_jukebox::ui::{describe_event, Args, LogFormat};
use std::error::Error;
use std::fs;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const LOG_TARGET: &str = "r_jukebox::main";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Plain => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

/// Positional queries first, then the playlist file's entries.
fn collect_queries(args: &Args) -> Result<Vec<String>, Box<dyn Error>> {
    let mut queries = args.queries.clone();
    if let Some(path) = &args.playlist {
        let content = fs::read_to_string(path)?;
        let listed: Vec<String> = serde_json::from_str(&content)?;
        info!(target: LOG_TARGET, "Loaded {} entries from {}", listed.len(), path.display());
        queries.extend(listed);
    }
    Ok(queries)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log_format);

    init_app_dirs()?;

    let config_path = args.config_path();
    let mut settings = Settings::load(&config_path)?;
    args.apply_to(&mut settings);
    settings.validate()?;

    let queries = collect_queries(&args)?;
    if queries.is_empty() {
        warn!(target: LOG_TARGET, "Nothing to play. Pass track URLs or --playlist.");
        return Ok(());
    }

    let format = settings.frame_format()?;
    let service = PlaybackService::new(
        Arc::new(HttpTrackResolver::new(settings.http_timeout())),
        Arc::new(SymphoniaTranscoder::new(format, settings.transcoder_settings())),
        Arc::new(FileSinkConnector::new(settings.output_dir.clone(), format)),
        settings.playback_settings(),
    );

    let tenant = args.tenant_id();
    let mut events = service.subscribe();
    let tracks: Vec<TrackRequest> = queries.iter().map(|q| TrackRequest::new(q.clone(), args.requested_by.clone())).collect();
    let mut remaining = tracks.len();
    service.enqueue_batch(tenant, tracks).await?;
    info!(target: LOG_TARGET, "Queued {} track(s) for tenant {} into {}", remaining, tenant, settings.output_dir.display());

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                info!(target: LOG_TARGET, "Ctrl-C received, shutting down.");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", describe_event(&event));
                    if event.ends_track() {
                        remaining = remaining.saturating_sub(1);
                        if remaining == 0 {
                            break;
                        }
                    }
                    if let SessionEvent::SessionStopped { .. } = event {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(target: LOG_TARGET, "Missed {} events.", n),
                Err(RecvError::Closed) => {
                    error!(target: LOG_TARGET, "Event channel closed.");
                    break;
                }
            }
        }
    }

    let removed = service.shutdown_all().await;
    info!(target: LOG_TARGET, "Shut down {} session(s).", removed);
    Ok(())
}
