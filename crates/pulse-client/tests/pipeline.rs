//! 파이프라인 통합 테스트.
//!
//! 일시정지된 tokio 시계와 스크립트 전송으로 flush 트리거, 재시도 간격,
//! 401 처리, 소진 저장, 재시작 복원을 검증한다.

mod common;

use common::{batch_files, test_config, wait_for, Reply, ScriptedTransport};
use pulse_client::event_bus::PipelineEvent;
use pulse_client::{PulseMetrics, TrackOptions};
use pulse_core::error::PulseError;
use pulse_core::models::batch::Batch;
use pulse_core::models::metadata::Metadata;
use pulse_core::models::metric::{decode_records, MetricRecord};
use pulse_core::ports::storage::OverflowStore;
use pulse_storage::overflow_store::FileOverflowStore;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

fn record(event: &str) -> MetricRecord {
    MetricRecord::new("svc", event)
}

fn is_delivered(e: &PipelineEvent) -> bool {
    matches!(e, PipelineEvent::BatchDelivered { .. })
}

#[tokio::test(start_paused = true)]
async fn batch_size_triggers_single_send() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics
        .configure(test_config(temp.path()).with_batch_size(3))
        .await
        .unwrap();

    for e in ["a", "b", "c"] {
        metrics.track(record(e));
    }
    wait_for(&mut rx, is_delivered).await;

    let sends = transport.sends();
    assert_eq!(sends.len(), 1);
    let events: Vec<_> = sends[0].records.iter().map(|r| r.event_type.as_str()).collect();
    assert_eq!(events, vec!["a", "b", "c"]);

    let stats = metrics.stats().await.unwrap();
    assert_eq!(stats.buffered, 0);
    assert_eq!(stats.in_flight, 0);
    assert!(stats.token_live);
}

#[tokio::test(start_paused = true)]
async fn below_batch_size_waits_for_timer() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    let configured_at = Instant::now();
    metrics
        .configure(
            test_config(temp.path())
                .with_batch_size(10)
                .with_batch_interval(Duration::from_secs(60)),
        )
        .await
        .unwrap();

    metrics.track(record("a"));
    metrics.track(record("b"));

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(transport.sends().is_empty(), "타이머 전에는 전송 없음");
    assert_eq!(metrics.stats().await.unwrap().buffered, 2);

    wait_for(&mut rx, is_delivered).await;
    let sends = transport.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].records.len(), 2);
    assert!(sends[0].at >= configured_at + Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn explicit_flush_sends_immediately() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics.configure(test_config(temp.path())).await.unwrap();
    let start = Instant::now();
    metrics.track(record("only"));
    metrics.flush().await;

    wait_for(&mut rx, is_delivered).await;
    let sends = transport.sends();
    assert_eq!(sends.len(), 1);
    assert!(sends[0].at - start < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn offline_batch_is_retried_then_spilled() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::offline();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics
        .configure(
            test_config(temp.path())
                .with_batch_size(2)
                .with_max_retries(2)
                .with_base_retry_delay(Duration::from_secs(2)),
        )
        .await
        .unwrap();

    metrics.track(record("first"));
    metrics.track(record("second"));

    let seen = wait_for(&mut rx, |e| matches!(e, PipelineEvent::BatchSpilled { .. })).await;

    let sends = transport.sends();
    assert_eq!(sends.len(), 3, "최초 1회 + 재시도 2회");
    let gap1 = sends[1].at - sends[0].at;
    let gap2 = sends[2].at - sends[1].at;
    assert!(gap1 >= Duration::from_secs(2) && gap1 < Duration::from_millis(2100), "{gap1:?}");
    assert!(gap2 >= Duration::from_secs(4) && gap2 < Duration::from_millis(4100), "{gap2:?}");

    let retries: Vec<u32> = seen
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::RetryScheduled { retry_count, .. } => Some(*retry_count),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2]);

    let files = batch_files(temp.path());
    assert_eq!(files.len(), 1, "배치는 정확히 한 번 저장");
    let stored = decode_records(&std::fs::read(&files[0]).unwrap()).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].event_type, "first");

    let stats = metrics.stats().await.unwrap();
    assert_eq!(stats.buffered, 0);
    assert_eq!(stats.waiting_retry, 0);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_refetches_token_with_same_count() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy().plan_sends(&[Reply::Unauthorized]);
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics.configure(test_config(temp.path())).await.unwrap();
    metrics.track(record("a"));
    metrics.flush().await;

    let seen = wait_for(&mut rx, is_delivered).await;
    assert!(
        !seen.iter().any(|e| matches!(e, PipelineEvent::RetryScheduled { .. })),
        "401 첫 응답은 재시도 카운트에 포함되지 않음"
    );
    assert!(seen.contains(&PipelineEvent::TokenInvalidated));

    assert_eq!(transport.token_calls().len(), 2);
    let sends = transport.sends();
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0].token, "svc-1");
    assert_eq!(sends[1].token, "svc-2");
    assert_eq!(sends[0].at, sends[1].at, "재발급 후 지연 없이 재전송");
}

#[tokio::test(start_paused = true)]
async fn repeated_unauthorized_counts_as_retry() {
    let temp = TempDir::new().unwrap();
    let transport =
        ScriptedTransport::healthy().plan_sends(&[Reply::Unauthorized, Reply::Unauthorized]);
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics.configure(test_config(temp.path())).await.unwrap();
    metrics.track(record("a"));
    metrics.flush().await;

    let seen = wait_for(&mut rx, is_delivered).await;
    let retry = seen
        .iter()
        .find_map(|e| match e {
            PipelineEvent::RetryScheduled {
                retry_count, delay, ..
            } => Some((*retry_count, *delay)),
            _ => None,
        })
        .expect("두 번째 401은 재시도 예약");
    assert_eq!(retry, (1, Duration::from_secs(2)));

    assert_eq!(transport.sends().len(), 3);
    assert_eq!(transport.token_calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn token_fetch_failure_counts_toward_retries() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy().plan_tokens(&[Reply::ServerError]);
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics.configure(test_config(temp.path())).await.unwrap();
    metrics.track(record("a"));
    metrics.flush().await;

    let seen = wait_for(&mut rx, is_delivered).await;
    assert!(seen
        .iter()
        .any(|e| matches!(e, PipelineEvent::RetryScheduled { retry_count: 1, .. })));

    let calls = transport.token_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1] - calls[0], Duration::from_secs(2));
    assert_eq!(transport.sends().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_batches_share_one_token_fetch() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy().token_delay(Duration::from_secs(1));
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics
        .configure(test_config(temp.path()).with_batch_size(1))
        .await
        .unwrap();
    for e in ["a", "b", "c"] {
        metrics.track(record(e));
    }

    let stats = metrics.stats().await.unwrap();
    assert_eq!(stats.awaiting_token, 3);

    let mut delivered = 0;
    while delivered < 3 {
        wait_for(&mut rx, is_delivered).await;
        delivered += 1;
    }

    assert_eq!(transport.token_calls().len(), 1);
    let sends = transport.sends();
    assert_eq!(sends.len(), 3);
    assert!(sends.iter().all(|s| s.token == "svc-1"));
}

#[tokio::test(start_paused = true)]
async fn restart_restores_stored_batches() {
    let temp = TempDir::new().unwrap();
    {
        let store = FileOverflowStore::open(temp.path().to_path_buf(), 1024 * 1024)
            .await
            .unwrap();
        store
            .persist(&Batch::new(vec![record("old1"), record("old2")]))
            .await
            .unwrap();
        store
            .persist(&Batch::new(vec![record("old3")]))
            .await
            .unwrap();
    }
    assert_eq!(batch_files(temp.path()).len(), 2);

    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics.configure(test_config(temp.path())).await.unwrap();

    let seen = wait_for(&mut rx, |e| matches!(e, PipelineEvent::Configured { .. })).await;
    assert!(seen.contains(&PipelineEvent::RecordsRestored {
        records: 3,
        files: 2
    }));
    assert_eq!(metrics.stats().await.unwrap().buffered, 3);
    assert!(batch_files(temp.path()).is_empty());
    assert!(transport.sends().is_empty(), "batch_size 미만이면 바로 보내지 않음");
}

#[tokio::test(start_paused = true)]
async fn restored_records_flush_when_batch_size_reached() {
    let temp = TempDir::new().unwrap();
    {
        let store = FileOverflowStore::open(temp.path().to_path_buf(), 1024 * 1024)
            .await
            .unwrap();
        store
            .persist(&Batch::new(vec![record("r1"), record("r2")]))
            .await
            .unwrap();
    }

    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics
        .configure(test_config(temp.path()).with_batch_size(2))
        .await
        .unwrap();

    wait_for(&mut rx, is_delivered).await;
    assert_eq!(transport.sends()[0].records.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_batch_requeued_without_persistence() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::offline();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics
        .configure(
            test_config(temp.path())
                .with_persistence(false)
                .with_max_retries(0),
        )
        .await
        .unwrap();
    metrics.track(record("a"));
    metrics.track(record("b"));
    metrics.flush().await;

    wait_for(&mut rx, |e| matches!(e, PipelineEvent::BatchRequeued { records: 2, .. })).await;

    assert_eq!(metrics.stats().await.unwrap().buffered, 2);
    assert!(batch_files(temp.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn requeue_over_capacity_drops_oldest() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::offline();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics
        .configure(
            test_config(temp.path())
                .with_persistence(false)
                .with_max_retries(0)
                .with_batch_size(2)
                .with_max_buffered_records(2),
        )
        .await
        .unwrap();

    metrics.track(record("a"));
    metrics.track(record("b"));
    metrics.track(record("c"));

    wait_for(&mut rx, |e| matches!(e, PipelineEvent::RecordsDropped { count: 1 })).await;
    assert_eq!(metrics.stats().await.unwrap().buffered, 2);

    // 남은 레코드는 b, c
    metrics.flush().await;
    let seen = wait_for(&mut rx, |e| matches!(e, PipelineEvent::BatchRequeued { .. })).await;
    assert!(!seen.is_empty());
    let last = transport.sends().pop().unwrap();
    let events: Vec<_> = last.records.iter().map(|r| r.event_type.as_str()).collect();
    assert_eq!(events, vec!["b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn disabled_manager_ignores_new_records() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());

    metrics.configure(test_config(temp.path())).await.unwrap();
    metrics.track(record("kept"));

    metrics.set_enabled(false);
    assert!(!metrics.is_enabled());
    metrics.track(record("ignored"));
    metrics.track_event("ignored_too", TrackOptions::new());
    assert_eq!(metrics.stats().await.unwrap().buffered, 1);

    metrics.set_enabled(true);
    metrics.track(record("again"));
    assert_eq!(metrics.stats().await.unwrap().buffered, 2);
}

#[tokio::test(start_paused = true)]
async fn track_before_configure_is_dropped() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());

    metrics.track(record("early"));
    let stats = metrics.stats().await.unwrap();
    assert!(!stats.configured);
    assert_eq!(stats.buffered, 0);

    metrics.configure(test_config(temp.path())).await.unwrap();
    assert_eq!(metrics.stats().await.unwrap().buffered, 0);
}

#[tokio::test(start_paused = true)]
async fn clear_metrics_discards_buffer() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());

    metrics.configure(test_config(temp.path())).await.unwrap();
    metrics.track(record("a"));
    metrics.track(record("b"));

    assert_eq!(metrics.clear_metrics().await, 2);
    metrics.flush().await;
    assert_eq!(metrics.stats().await.unwrap().buffered, 0);
    assert!(transport.sends().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reconfigure_keeps_buffer() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());

    metrics.configure(test_config(temp.path())).await.unwrap();
    metrics.track(record("a"));

    metrics
        .configure(test_config(temp.path()).with_batch_size(50))
        .await
        .unwrap();

    let stats = metrics.stats().await.unwrap();
    assert_eq!(stats.epoch, 2);
    assert_eq!(stats.buffered, 1);
}

#[tokio::test(start_paused = true)]
async fn credential_change_discards_stored_token() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics
        .configure(test_config(temp.path()).with_batch_size(1))
        .await
        .unwrap();
    metrics.track(record("before"));
    wait_for(&mut rx, is_delivered).await;
    assert_eq!(transport.token_calls().len(), 1);

    let mut changed = test_config(temp.path()).with_batch_size(1);
    changed.app_credential = "other-app-secret".to_string();
    metrics.configure(changed).await.unwrap();
    assert!(!metrics.stats().await.unwrap().token_live);

    metrics.track(record("after"));
    wait_for(&mut rx, is_delivered).await;

    assert_eq!(transport.token_calls().len(), 2);
    let sends = transport.sends();
    assert_eq!(sends[0].token, "svc-1");
    assert_eq!(sends[1].token, "svc-2");

    let saved = std::fs::read_to_string(temp.path().join("tokens").join("tokens.json")).unwrap();
    assert!(saved.contains("svc-2"));
    assert!(!saved.contains("svc-1"));
}

#[tokio::test(start_paused = true)]
async fn same_credential_reconfigure_keeps_token() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics
        .configure(test_config(temp.path()).with_batch_size(1))
        .await
        .unwrap();
    metrics.track(record("before"));
    wait_for(&mut rx, is_delivered).await;

    metrics
        .configure(test_config(temp.path()).with_batch_size(1).with_max_retries(5))
        .await
        .unwrap();
    metrics.track(record("after"));
    wait_for(&mut rx, is_delivered).await;

    assert_eq!(transport.token_calls().len(), 1);
    assert!(transport.sends().iter().all(|s| s.token == "svc-1"));
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    let metrics = PulseMetrics::with_transport_factory(ScriptedTransport::healthy().factory());

    let result = metrics
        .configure(test_config(temp.path()).with_batch_size(0))
        .await;
    assert!(result.is_err());
    assert!(!metrics.stats().await.unwrap().configured);
}

#[tokio::test(start_paused = true)]
async fn oversized_interval_is_rejected_and_manager_survives() {
    let temp = TempDir::new().unwrap();
    let metrics = PulseMetrics::with_transport_factory(ScriptedTransport::healthy().factory());

    let result = metrics
        .configure(test_config(temp.path()).with_batch_interval(Duration::from_secs(u64::MAX / 2)))
        .await;
    assert!(matches!(result, Err(PulseError::Config(_))));

    assert!(!metrics.stats().await.unwrap().configured);
    metrics.configure(test_config(temp.path())).await.unwrap();
    assert!(metrics.stats().await.unwrap().configured);
}

#[tokio::test(start_paused = true)]
async fn shutdown_spills_batches_waiting_for_retry() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::offline();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics
        .configure(test_config(temp.path()).with_max_retries(5))
        .await
        .unwrap();
    metrics.track(record("a"));
    metrics.flush().await;

    wait_for(&mut rx, |e| matches!(e, PipelineEvent::RetryScheduled { .. })).await;
    metrics.shutdown().await;

    assert_eq!(transport.sends().len(), 1, "종료 시 재시도하지 않음");
    assert_eq!(batch_files(temp.path()).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_buffer() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());

    metrics.configure(test_config(temp.path())).await.unwrap();
    metrics.track(record("last"));
    metrics.shutdown().await;

    let sends = transport.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].records[0].event_type, "last");
    assert!(batch_files(temp.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn calls_after_shutdown_are_ignored() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());

    metrics.configure(test_config(temp.path())).await.unwrap();
    metrics.shutdown().await;

    metrics.set_default_user_id(Some("late-user".to_string()));
    metrics.set_default_metadata(Metadata::new());
    metrics.track(record("late"));
    metrics.flush().await;

    assert!(matches!(metrics.stats().await, Err(PulseError::ChannelClosed)));
    assert!(transport.sends().is_empty());
}

#[test]
#[should_panic]
fn construction_outside_runtime_panics() {
    let _ = PulseMetrics::with_transport_factory(ScriptedTransport::healthy().factory());
}

#[tokio::test(start_paused = true)]
async fn typed_helpers_merge_defaults() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics
        .configure(
            test_config(temp.path())
                .with_default_service_code("shop")
                .with_device_info(true),
        )
        .await
        .unwrap();

    let mut defaults = Metadata::new();
    defaults.insert("app_version".to_string(), "1.2.0".into());
    metrics.set_default_metadata(defaults);
    metrics.set_default_user_id(Some("user-7".to_string()));

    metrics.track_screen_view("cart", Some("CartView"), TrackOptions::new());
    metrics.flush().await;
    wait_for(&mut rx, is_delivered).await;

    let sent = &transport.sends()[0].records[0];
    assert_eq!(sent.service_code, "shop");
    assert_eq!(sent.event_type, "screen_view");
    assert_eq!(sent.user_id.as_deref(), Some("user-7"));
    assert_eq!(
        sent.metadata_value("screen_name").and_then(|v| v.as_str()),
        Some("cart")
    );
    assert_eq!(
        sent.metadata_value("app_version").and_then(|v| v.as_str()),
        Some("1.2.0")
    );
    let device = sent.metadata_value("device").and_then(|v| v.as_object()).unwrap();
    assert!(device.contains_key("device_id"));
}

#[tokio::test(start_paused = true)]
async fn performance_tracker_records_elapsed_ms() {
    let temp = TempDir::new().unwrap();
    let transport = ScriptedTransport::healthy();
    let metrics = PulseMetrics::with_transport_factory(transport.factory());
    let mut rx = metrics.subscribe();

    metrics.configure(test_config(temp.path())).await.unwrap();

    let tracker = metrics
        .start_performance("checkout", "ui")
        .with_options(TrackOptions::new().user_id("u1"));
    tokio::time::sleep(Duration::from_millis(250)).await;
    let elapsed = tracker.stop_with([("step", "payment".into())]);
    assert_eq!(elapsed, 250.0);

    metrics.flush().await;
    wait_for(&mut rx, is_delivered).await;

    let sent = &transport.sends()[0].records[0];
    assert_eq!(sent.event_type, "performance");
    assert_eq!(sent.user_id.as_deref(), Some("u1"));
    assert_eq!(sent.metadata_value("value").and_then(|v| v.as_f64()), Some(250.0));
    assert_eq!(
        sent.metadata_value("step").and_then(|v| v.as_str()),
        Some("payment")
    );
}
