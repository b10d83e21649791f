//! HTTP 전송 세션.
//!
//! `Transport` 포트 구현. 설정 epoch마다 타임아웃이 적용된 reqwest 클라이언트 하나를
//! 토큰 발급기와 수집 클라이언트가 공유한다.

use async_trait::async_trait;
use pulse_core::config::PulseConfig;
use pulse_core::error::PulseError;
use pulse_core::models::credentials::CredentialPair;
use pulse_core::models::metric::MetricRecord;
use pulse_core::ports::transport::{Transport, TransportFactory};
use std::sync::Arc;
use tracing::debug;

use crate::auth::TokenFetcher;
use crate::http_client::IngestClient;

/// reqwest 기반 전송 세션
pub struct HttpTransport {
    fetcher: TokenFetcher,
    ingest: IngestClient,
}

impl HttpTransport {
    /// 설정으로 세션 생성
    ///
    /// 연결/읽기 타임아웃 = request_timeout, 전체 요청 타임아웃 = 2 × request_timeout
    pub fn new(config: &PulseConfig) -> Result<Self, PulseError> {
        let timeout = config.request_timeout();
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .timeout(timeout * 2)
            .build()
            .map_err(|e| PulseError::Transport(format!("HTTP 클라이언트 빌드 실패: {e}")))?;

        debug!(
            "전송 세션 생성: track={}, token={}, timeout={:?}",
            config.track_url(),
            config.token_url,
            timeout
        );

        Ok(Self {
            fetcher: TokenFetcher::new(client.clone(), &config.token_url, &config.app_credential),
            ingest: IngestClient::new(client, &config.track_url()),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_token(&self) -> Result<CredentialPair, PulseError> {
        self.fetcher.fetch().await
    }

    async fn send_batch(
        &self,
        service_token: &str,
        records: &[MetricRecord],
    ) -> Result<(), PulseError> {
        self.ingest.send(service_token, records).await
    }
}

/// 기본 HTTP 전송 팩토리
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn build(&self, config: &PulseConfig) -> Result<Arc<dyn Transport>, PulseError> {
        Ok(Arc::new(HttpTransport::new(config)?))
    }
}
