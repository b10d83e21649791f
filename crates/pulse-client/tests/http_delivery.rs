//! 실제 HTTP 전송 통합 테스트 (mockito 서버).

mod common;

use common::{batch_files, wait_for};
use pulse_client::event_bus::PipelineEvent;
use pulse_client::PulseMetrics;
use pulse_core::config::PulseConfig;
use pulse_core::models::metric::MetricRecord;
use std::time::Duration;
use tempfile::TempDir;

fn config(server: &mockito::ServerGuard, temp: &TempDir) -> PulseConfig {
    PulseConfig::new(
        server.url(),
        format!("{}/oauth/token", server.url()),
        "app-secret",
    )
    .with_storage_dir(temp.path())
    .with_device_info(false)
    .with_batch_size(2)
}

#[tokio::test]
async fn batch_delivered_over_http() {
    let temp = TempDir::new().unwrap();
    let mut server = mockito::Server::new_async().await;
    let token_mock = server
        .mock("GET", "/oauth/token")
        .match_header("authorization", "Bearer app-secret")
        .with_status(200)
        .with_body(r#"{"token":"svc_live","refresh_token":"ref_live"}"#)
        .expect(1)
        .create_async()
        .await;
    let track_mock = server
        .mock("POST", "/pulse/api/v1/customer/track")
        .match_header("authorization", "Bearer svc_live")
        .match_body(mockito::Matcher::Regex(r#""event_type":"login".*"event_type":"logout""#.to_string()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let metrics = PulseMetrics::new();
    let mut rx = metrics.subscribe();
    metrics.configure(config(&server, &temp)).await.unwrap();

    metrics.track(MetricRecord::new("svc", "login"));
    metrics.track(MetricRecord::new("svc", "logout"));
    wait_for(&mut rx, |e| matches!(e, PipelineEvent::BatchDelivered { records: 2, .. })).await;

    token_mock.assert_async().await;
    track_mock.assert_async().await;

    // 발급받은 자격증명은 파일로 저장
    let saved = std::fs::read_to_string(temp.path().join("tokens").join("tokens.json")).unwrap();
    assert!(saved.contains("svc_live"));

    metrics.shutdown().await;
}

#[tokio::test]
async fn unreachable_server_spills_to_disk() {
    let temp = TempDir::new().unwrap();
    let cfg = PulseConfig::new("http://127.0.0.1:1", "http://127.0.0.1:1/oauth/token", "app")
        .with_storage_dir(temp.path())
        .with_device_info(false)
        .with_batch_size(1)
        .with_max_retries(1)
        .with_base_retry_delay(Duration::from_millis(50))
        .with_request_timeout(Duration::from_secs(2));

    let metrics = PulseMetrics::new();
    let mut rx = metrics.subscribe();
    metrics.configure(cfg).await.unwrap();

    metrics.track(MetricRecord::new("svc", "offline"));
    wait_for(&mut rx, |e| matches!(e, PipelineEvent::BatchSpilled { .. })).await;

    assert_eq!(batch_files(temp.path()).len(), 1);
    metrics.shutdown().await;
}
