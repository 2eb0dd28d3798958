//! Integration tests module
//!
//! Organizes the integration tests for the r-jukebox playback scheduler.

pub mod audio_test;
pub mod config_test;
pub mod playback_control_test;
pub mod resilience_test;
