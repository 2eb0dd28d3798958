//! Integration tests for per-track and session-fatal failures

use crate::test_utils::*;
use r_jukebox::session::{PlaybackError, SessionEvent, StopReason, TenantId, TrackRequest};
use std::time::Duration;

const LONG: Duration = Duration::from_secs(5);

#[cfg(test)]
mod resilience_tests {
    use super::*;

    #[tokio::test]
    async fn test_bad_track_does_not_stop_the_queue() {
        let resolver = FakeResolver::new().with_track("good-url", b'G', 5);
        let (service, connector) = scripted_service(resolver, CountingConnector::new());
        let tenant = TenantId(10);
        let log = connector.log(tenant);
        let mut events = service.subscribe();

        service.enqueue(tenant, TrackRequest::new("bad-url", "tester")).await.unwrap();
        service.enqueue(tenant, TrackRequest::new("good-url", "tester")).await.unwrap();

        let failed = next_event(&mut events, LONG, |e| matches!(e, SessionEvent::TrackFailed { .. })).await;
        match failed {
            Some(SessionEvent::TrackFailed { track, error, .. }) => {
                assert_eq!(track.source_query, "bad-url");
                assert!(error.starts_with("Resolution error"), "{}", error);
            }
            other => panic!("expected TrackFailed, got {:?}", other),
        }

        let finished = next_event(&mut events, LONG, |e| matches!(e, SessionEvent::TrackFinished { .. })).await;
        match finished {
            Some(SessionEvent::TrackFinished { track, frames, .. }) => {
                assert_eq!(track.source_query, "good-url");
                assert_eq!(frames, 5);
            }
            other => panic!("expected TrackFinished, got {:?}", other),
        }
        assert_eq!(log.count_tag(b'G'), 5);
        assert_eq!(service.current_track(tenant).await.unwrap(), None);
        service.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_unavailable_and_undecodable_tracks_are_skipped() {
        let resolver = FakeResolver::new()
            .with_unavailable("offline")
            .with_undecodable("noise")
            .with_track("fine", b'F', 4);
        let (service, connector) = scripted_service(resolver, CountingConnector::new());
        let tenant = TenantId(11);
        let log = connector.log(tenant);
        let mut events = service.subscribe();

        for q in ["offline", "noise", "fine"] {
            service.enqueue(tenant, TrackRequest::new(q, "tester")).await.unwrap();
        }

        let mut errors = Vec::new();
        for _ in 0..2 {
            match next_event(&mut events, LONG, |e| matches!(e, SessionEvent::TrackFailed { .. })).await {
                Some(SessionEvent::TrackFailed { error, .. }) => errors.push(error),
                other => panic!("expected TrackFailed, got {:?}", other),
            }
        }
        assert!(errors[0].starts_with("Stream unavailable"), "{}", errors[0]);
        assert!(errors[1].starts_with("Unsupported format"), "{}", errors[1]);

        assert!(wait_until(LONG, || log.count_tag(b'F') == 4).await);
        service.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_sink_failure_stops_the_session() {
        let resolver = FakeResolver::new().with_track("song", b'S', 20).with_track("after", b'A', 3);
        let (service, connector) = scripted_service(resolver, CountingConnector::new().failing_on_write(3));
        let tenant = TenantId(12);
        let log = connector.log(tenant);
        let mut events = service.subscribe();

        service.enqueue(tenant, TrackRequest::new("song", "tester")).await.unwrap();
        service.enqueue(tenant, TrackRequest::new("after", "tester")).await.unwrap();

        let stopped = next_event(&mut events, LONG, |e| matches!(e, SessionEvent::SessionStopped { .. })).await;
        match stopped {
            Some(SessionEvent::SessionStopped { tenant: t, reason }) => {
                assert_eq!(t, tenant);
                assert!(matches!(reason, StopReason::SinkFailed(_)), "{:?}", reason);
            }
            other => panic!("expected SessionStopped, got {:?}", other),
        }

        assert_eq!(log.frame_count(), 2);
        assert_eq!(log.count_tag(b'A'), 0, "worker moved on after the sink broke");
        assert_eq!(log.closes(), 1);
        assert!(matches!(service.queue_depth(tenant).await, Err(PlaybackError::SessionNotFound(_))));
        assert!(service.registry().is_empty(), "stopped session still registered");
        assert!(matches!(service.leave_tenant(tenant).await, Err(PlaybackError::SessionNotFound(_))));

        // Playing again joins afresh; the new sink breaks on its third write too.
        service.enqueue(tenant, TrackRequest::new("after", "tester")).await.unwrap();
        assert_eq!(connector.connects(), 2);
        let stopped = next_event(&mut events, LONG, |e| matches!(e, SessionEvent::SessionStopped { .. })).await;
        assert!(stopped.is_some());

        assert_eq!(log.count_tag(b'A'), 2);
        assert_eq!(log.closes(), 2);
        assert_eq!(log.writes_after_close(), 0);
        assert!(service.registry().is_empty());
        assert!(matches!(service.leave_tenant(tenant).await, Err(PlaybackError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_no_session() {
        let (service, connector) = scripted_service(FakeResolver::new().with_track("x", b'X', 1), CountingConnector::new());
        let tenant = TenantId(13);
        connector.set_failing(true);

        let joined = service.join_tenant(tenant).await;
        assert!(matches!(joined, Err(PlaybackError::SinkConnectError(_))));
        assert!(service.registry().is_empty());
        assert!(matches!(service.pause(tenant).await, Err(PlaybackError::SessionNotFound(_))));

        let queued = service.enqueue(tenant, TrackRequest::new("x", "tester")).await;
        assert!(matches!(queued, Err(PlaybackError::SinkConnectError(_))));
        assert!(service.registry().is_empty());

        connector.set_failing(false);
        service.enqueue(tenant, TrackRequest::new("x", "tester")).await.unwrap();
        assert!(wait_until(LONG, || connector.log(tenant).frame_count() == 1).await);
        assert_eq!(connector.connects(), 1);
        service.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_control_ops_on_absent_tenant() {
        let (service, _connector) = scripted_service(FakeResolver::new(), CountingConnector::new());
        let tenant = TenantId(404);

        assert!(matches!(service.pause(tenant).await, Err(PlaybackError::SessionNotFound(t)) if t == tenant));
        assert!(matches!(service.resume(tenant).await, Err(PlaybackError::SessionNotFound(_))));
        assert!(matches!(service.skip(tenant).await, Err(PlaybackError::SessionNotFound(_))));
        assert!(matches!(service.clear_queue(tenant).await, Err(PlaybackError::SessionNotFound(_))));
        assert!(matches!(service.queue_depth(tenant).await, Err(PlaybackError::SessionNotFound(_))));
        assert!(matches!(service.current_track(tenant).await, Err(PlaybackError::SessionNotFound(_))));
        assert!(matches!(service.status(tenant).await, Err(PlaybackError::SessionNotFound(_))));
        assert!(matches!(service.leave_tenant(tenant).await, Err(PlaybackError::SessionNotFound(_))));
    }
}
