//! Integration tests for queue order and the pause/skip/clear controls

use crate::test_utils::*;
use r_jukebox::session::{SessionEvent, TenantId, TrackRequest, WorkerState};
use std::time::Duration;

const LONG: Duration = Duration::from_secs(5);

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[cfg(test)]
mod playback_control_tests {
    use super::*;

    #[tokio::test]
    async fn test_tracks_play_in_enqueue_order() {
        let resolver = FakeResolver::new()
            .with_track("one", b'1', 3)
            .with_track("two", b'2', 3)
            .with_track("three", b'3', 3);
        let (service, connector) = scripted_service(resolver, CountingConnector::new());
        let tenant = TenantId(1);
        let log = connector.log(tenant);

        for q in ["one", "two", "three"] {
            service.enqueue(tenant, TrackRequest::new(q, "tester")).await.unwrap();
        }

        assert!(wait_until(LONG, || log.frame_count() == 9).await);
        assert_eq!(log.tags(), b"111222333".to_vec());
        for chunk in log.frames().chunks(3) {
            let seqs: Vec<u32> = chunk.iter().map(|(_, s)| *s).collect();
            assert_eq!(seqs, vec![0, 1, 2]);
        }
        service.shutdown_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_keep_their_own_order() {
        let tags: Vec<u8> = (b'a'..=b'p').collect();
        let mut resolver = FakeResolver::new();
        for tag in &tags {
            resolver = resolver.with_track(&(*tag as char).to_string(), *tag, 1);
        }
        let (service, connector) = scripted_service(resolver, CountingConnector::new());
        let tenant = TenantId(2);
        let log = connector.log(tenant);
        service.join_tenant(tenant).await.unwrap();

        // Four producers, four tracks each, in ascending tag order.
        let mut handles = Vec::new();
        for producer in tags.chunks(4) {
            let service = service.clone();
            let producer = producer.to_vec();
            handles.push(tokio::spawn(async move {
                for tag in producer {
                    service
                        .enqueue(tenant, TrackRequest::new((tag as char).to_string(), "p"))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(wait_until(LONG, || log.frame_count() == tags.len()).await);
        let played = log.tags();
        for producer in tags.chunks(4) {
            let positions: Vec<usize> = producer
                .iter()
                .map(|t| played.iter().position(|p| p == t).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "order broken: {:?}", played);
        }
        service.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_pause_halts_progress_without_loss() {
        let resolver = FakeResolver::new().with_track("long", b'P', 100);
        let (service, connector) = scripted_service(resolver, CountingConnector::new().with_write_delay(ms(3)));
        let tenant = TenantId(3);
        let log = connector.log(tenant);

        service.enqueue(tenant, TrackRequest::new("long", "tester")).await.unwrap();
        assert!(wait_until(LONG, || log.frame_count() >= 10).await);

        service.pause(tenant).await.unwrap();
        // At most the write already in progress lands.
        tokio::time::sleep(ms(50)).await;
        let held = log.frame_count();
        assert!(held < 100);

        tokio::time::sleep(ms(300)).await;
        assert_eq!(log.frame_count(), held, "frames arrived while paused");
        let status = service.status(tenant).await.unwrap();
        assert!(status.paused);
        assert_eq!(status.state, WorkerState::Streaming);
        assert_eq!(status.current.map(|t| t.source_query), Some("long".to_string()));

        service.resume(tenant).await.unwrap();
        assert!(wait_until(LONG, || log.frame_count() == 100).await);
        tokio::time::sleep(ms(50)).await;

        let seqs: Vec<u32> = log.frames().iter().map(|(_, s)| *s).collect();
        assert_eq!(seqs, (0..100).collect::<Vec<u32>>());
        service.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_skip_abandons_current_track() {
        let resolver = FakeResolver::new().with_track("a", b'A', 50).with_track("b", b'B', 10);
        let (service, connector) = scripted_service(resolver, CountingConnector::new().with_write_delay(ms(3)));
        let tenant = TenantId(4);
        let log = connector.log(tenant);
        let mut events = service.subscribe();

        service.enqueue(tenant, TrackRequest::new("a", "tester")).await.unwrap();
        service.enqueue(tenant, TrackRequest::new("b", "tester")).await.unwrap();

        assert!(wait_until(LONG, || log.count_tag(b'A') >= 1).await);
        service.skip(tenant).await.unwrap();

        assert!(wait_until(LONG, || log.count_tag(b'B') == 10).await);
        tokio::time::sleep(ms(50)).await;

        let a_frames = log.count_tag(b'A');
        assert!(a_frames < 50, "A was not cut short");
        assert_eq!(log.count_tag(b'B'), 10);

        let tags = log.tags();
        let first_b = tags.iter().position(|t| *t == b'B').unwrap();
        assert!(tags[first_b..].iter().all(|t| *t == b'B'), "A frames after skip");

        let skipped = next_event(&mut events, LONG, |e| matches!(e, SessionEvent::TrackSkipped { .. })).await;
        match skipped {
            Some(SessionEvent::TrackSkipped { track, frames, .. }) => {
                assert_eq!(track.source_query, "a");
                assert_eq!(frames as usize, a_frames);
            }
            other => panic!("expected TrackSkipped, got {:?}", other),
        }
        assert!(log.flushes() >= 2);
        service.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_skip_while_resolving_drops_that_track() {
        let resolver = FakeResolver::new()
            .with_track("slow", b'S', 5)
            .with_track("next", b'N', 3)
            .with_resolve_delay(ms(150));
        let (service, connector) = scripted_service(resolver, CountingConnector::new());
        let tenant = TenantId(5);
        let log = connector.log(tenant);

        service.enqueue(tenant, TrackRequest::new("slow", "tester")).await.unwrap();
        service.enqueue(tenant, TrackRequest::new("next", "tester")).await.unwrap();

        let session = service.registry().get(tenant).await.unwrap();
        assert!(wait_until(LONG, || session.state() == WorkerState::Resolving).await);
        service.skip(tenant).await.unwrap();

        assert!(wait_until(LONG, || log.count_tag(b'N') == 3).await);
        assert_eq!(log.count_tag(b'S'), 0);
        service.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_skip_while_idle_does_not_carry_over() {
        let resolver = FakeResolver::new().with_track("later", b'L', 5);
        let (service, connector) = scripted_service(resolver, CountingConnector::new());
        let tenant = TenantId(6);
        let log = connector.log(tenant);

        service.join_tenant(tenant).await.unwrap();
        service.skip(tenant).await.unwrap();
        tokio::time::sleep(ms(80)).await;

        service.enqueue(tenant, TrackRequest::new("later", "tester")).await.unwrap();
        assert!(wait_until(LONG, || log.count_tag(b'L') == 5).await);
        service.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_clear_queue_keeps_current_track() {
        let resolver = FakeResolver::new()
            .with_track("a", b'A', 30)
            .with_track("b", b'B', 5)
            .with_track("c", b'C', 5);
        let (service, connector) = scripted_service(resolver, CountingConnector::new().with_write_delay(ms(3)));
        let tenant = TenantId(7);
        let log = connector.log(tenant);

        for q in ["a", "b", "c"] {
            service.enqueue(tenant, TrackRequest::new(q, "tester")).await.unwrap();
        }
        assert!(wait_until(LONG, || log.count_tag(b'A') >= 1).await);

        let current = service.current_track(tenant).await.unwrap();
        assert_eq!(current.map(|t| t.resolved_title), Some("Title of a".to_string()));
        assert_eq!(service.clear_queue(tenant).await.unwrap(), 2);
        assert_eq!(service.queue_depth(tenant).await.unwrap(), 0);

        assert!(wait_until(LONG, || log.count_tag(b'A') == 30).await);
        let session = service.registry().get(tenant).await.unwrap();
        assert!(wait_until(LONG, || session.state() == WorkerState::Idle).await);
        tokio::time::sleep(ms(100)).await;
        assert_eq!(log.count_tag(b'B'), 0);
        assert_eq!(log.count_tag(b'C'), 0);
        assert_eq!(service.current_track(tenant).await.unwrap(), None);
        service.shutdown_all().await;
    }
}
