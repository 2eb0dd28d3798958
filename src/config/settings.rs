//! Application settings and configuration management

use crate::audio::{FrameFormat, TranscoderSettings};
use crate::session::PlaybackSettings;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Sink sample rate in Hz
    pub sample_rate: u32,
    /// Sink channel count
    pub channels: u16,
    /// Length of one PCM frame
    pub frame_duration_ms: u32,
    /// Upper bound between re-checks while paused
    pub pause_recheck_ms: u64,
    /// Upper bound between re-checks while the queue is empty
    pub idle_recheck_ms: u64,
    /// How long teardown waits for a worker before aborting it
    pub teardown_timeout_ms: u64,
    /// Decoded frames buffered ahead of the sink
    pub frame_lookahead: usize,
    /// Raw byte chunks buffered ahead of the decoder
    pub byte_chunk_capacity: usize,
    /// Session event channel capacity
    pub event_capacity: usize,
    pub http_timeout_secs: u64,
    pub resampler_chunk_frames: usize,
    /// Directory the file sink writes `tenant-<id>.pcm` into
    pub output_dir: PathBuf,
}

/// Error types for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    ParseError(String),
    ValidationError(String),
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigError::ParseError(s) => write!(f, "Parse error: {}", s),
            ConfigError::ValidationError(s) => write!(f, "Validation error: {}", s),
        }
    }
}

impl Error for ConfigError {}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sample_rate: 48_000,
            channels: 2,
            frame_duration_ms: 20,
            pause_recheck_ms: 250,
            idle_recheck_ms: 1000,
            teardown_timeout_ms: 5000,
            frame_lookahead: 50,
            byte_chunk_capacity: 32,
            event_capacity: 64,
            http_timeout_secs: 30,
            resampler_chunk_frames: 1024,
            output_dir: PathBuf::from("jukebox-out"),
        }
    }
}

impl Settings {
    /// Load settings from a file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("jukebox").join("config.json")
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=8).contains(&self.channels) {
            return Err(ConfigError::ValidationError(format!(
                "channels must be between 1 and 8, got {}",
                self.channels
            )));
        }

        self.frame_format()?;

        if self.pause_recheck_ms == 0 || self.idle_recheck_ms == 0 || self.teardown_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Re-check intervals and teardown timeout must be non-zero".to_string(),
            ));
        }

        if self.frame_lookahead == 0 || self.byte_chunk_capacity == 0 || self.event_capacity == 0 {
            return Err(ConfigError::ValidationError("Buffer capacities must be non-zero".to_string()));
        }

        if self.resampler_chunk_frames == 0 {
            return Err(ConfigError::ValidationError("resampler_chunk_frames must be non-zero".to_string()));
        }

        Ok(())
    }

    /// Frame shape the sink expects
    pub fn frame_format(&self) -> Result<FrameFormat, ConfigError> {
        FrameFormat::new(self.sample_rate, self.channels, self.frame_duration_ms)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            pause_recheck: Duration::from_millis(self.pause_recheck_ms),
            idle_recheck: Duration::from_millis(self.idle_recheck_ms),
            teardown_timeout: Duration::from_millis(self.teardown_timeout_ms),
            event_capacity: self.event_capacity,
        }
    }

    pub fn transcoder_settings(&self) -> TranscoderSettings {
        TranscoderSettings {
            frame_lookahead: self.frame_lookahead,
            byte_chunk_capacity: self.byte_chunk_capacity,
            resampler_chunk_frames: self.resampler_chunk_frames,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
