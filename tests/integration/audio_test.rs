//! Integration tests for the real decode pipeline
//!
//! Drives a session through Symphonia and the file sink using WAV data
//! synthesized in memory.

use crate::test_utils::*;
use r_jukebox::audio::{FileSinkConnector, FrameFormat, SymphoniaTranscoder, TranscoderSettings};
use r_jukebox::service::PlaybackService;
use r_jukebox::session::{SessionEvent, TenantId, TrackRequest};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

#[cfg(test)]
mod audio_integration_tests {
    use super::*;

    fn real_service(output_dir: &std::path::Path, resolver: FakeResolver) -> PlaybackService {
        let format = FrameFormat::STANDARD;
        PlaybackService::new(
            Arc::new(resolver),
            Arc::new(SymphoniaTranscoder::new(format, TranscoderSettings::default())),
            Arc::new(FileSinkConnector::new(output_dir, format)),
            fast_settings(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wav_tracks_are_written_as_pcm_frames() {
        let dir = tempdir().unwrap();
        let resolver = FakeResolver::new()
            .with_bytes("native", wav_bytes(48_000, 2, 4_800), "audio/wav")
            .with_bytes("mono", wav_bytes(48_000, 1, 9_600), "audio/wav");
        let service = real_service(dir.path(), resolver);
        let tenant = TenantId(40);
        let mut events = service.subscribe();

        service.enqueue(tenant, TrackRequest::new("native", "tester")).await.unwrap();
        service.enqueue(tenant, TrackRequest::new("mono", "tester")).await.unwrap();

        let mut finished = Vec::new();
        while finished.len() < 2 {
            match next_event(&mut events, Duration::from_secs(10), |e| e.ends_track()).await {
                Some(SessionEvent::TrackFinished { track, frames, .. }) => finished.push((track.source_query, frames)),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(finished, vec![("native".to_string(), 5), ("mono".to_string(), 10)]);

        service.leave_tenant(tenant).await.unwrap();
        let pcm = std::fs::read(dir.path().join("tenant-40.pcm")).unwrap();
        assert_eq!(pcm.len(), 15 * 3840);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_undecodable_stream_fails_only_that_track() {
        let dir = tempdir().unwrap();
        let resolver = FakeResolver::new()
            .with_bytes("junk", b"definitely not audio ".repeat(100), "audio/mpeg")
            .with_bytes("ok", wav_bytes(48_000, 2, 960), "audio/wav");
        let service = real_service(dir.path(), resolver);
        let tenant = TenantId(41);
        let mut events = service.subscribe();

        service.enqueue(tenant, TrackRequest::new("junk", "tester")).await.unwrap();
        service.enqueue(tenant, TrackRequest::new("ok", "tester")).await.unwrap();

        match next_event(&mut events, Duration::from_secs(10), |e| e.ends_track()).await {
            Some(SessionEvent::TrackFailed { track, error, .. }) => {
                assert_eq!(track.source_query, "junk");
                assert!(error.starts_with("Unsupported format"), "{}", error);
            }
            other => panic!("expected TrackFailed, got {:?}", other),
        }
        match next_event(&mut events, Duration::from_secs(10), |e| e.ends_track()).await {
            Some(SessionEvent::TrackFinished { frames, .. }) => assert_eq!(frames, 1),
            other => panic!("expected TrackFinished, got {:?}", other),
        }
        service.shutdown_all().await;
    }
}
