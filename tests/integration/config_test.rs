//! Integration tests for configuration management
//!
//! These tests verify that the configuration system works correctly
//! across module boundaries.

use r_jukebox::config::Settings;
use r_jukebox::ui::Args;
use clap::Parser;
use std::error::Error;
use tempfile::tempdir;

#[cfg(test)]
mod config_integration_tests {
    use super::*;

    /// Test complete configuration workflow
    #[test]
    fn test_config_lifecycle() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let config_path = dir.path().join("config.json");

        let mut settings = Settings::default();
        settings.sample_rate = 24_000;
        settings.channels = 1;
        settings.idle_recheck_ms = 200;
        settings.output_dir = dir.path().join("out");

        settings.validate()?;
        settings.save(&config_path)?;

        let loaded = Settings::load(&config_path)?;
        assert_eq!(loaded, settings);
        assert_eq!(loaded.frame_format()?.bytes_per_frame(), 480 * 2);
        assert_eq!(loaded.playback_settings().idle_recheck.as_millis(), 200);

        let mut updated = loaded;
        updated.teardown_timeout_ms = 1500;
        updated.save(&config_path)?;
        assert_eq!(Settings::load(&config_path)?.teardown_timeout_ms, 1500);

        Ok(())
    }

    #[test]
    fn test_cli_overrides_file() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let config_path = dir.path().join("config.json");
        Settings::default().save(&config_path)?;

        let args = Args::try_parse_from([
            "r-jukebox",
            "--config",
            config_path.to_str().unwrap_or_default(),
            "--output-dir",
            "/var/tmp/jukebox",
            "https://example.com/a.mp3",
        ])?;

        let mut settings = Settings::load(&args.config_path())?;
        args.apply_to(&mut settings);
        assert_eq!(settings.output_dir, std::path::PathBuf::from("/var/tmp/jukebox"));
        assert_eq!(args.queries, vec!["https://example.com/a.mp3".to_string()]);
        Ok(())
    }
}
