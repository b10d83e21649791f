//! 수집 엔드포인트 클라이언트.
//!
//! `POST <base>/pulse/api/v1/customer/track` 로 레코드 배열을 전송한다.

use pulse_core::error::PulseError;
use pulse_core::models::metric::{encode_records, MetricRecord};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

/// 배치 본문 Content-Type
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// 수집 API 클라이언트
#[derive(Clone)]
pub struct IngestClient {
    client: reqwest::Client,
    track_url: String,
}

impl IngestClient {
    /// 새 수집 클라이언트 생성
    pub fn new(client: reqwest::Client, track_url: &str) -> Self {
        Self {
            client,
            track_url: track_url.to_string(),
        }
    }

    /// 응답 상태 코드 확인 및 에러 매핑
    async fn check_response(resp: reqwest::Response) -> Result<(), PulseError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let text = resp.text().await.unwrap_or_else(|e| {
            warn!("응답 본문 읽기 실패: {e}");
            String::new()
        });
        Err(PulseError::from_status(status.as_u16(), text))
    }

    /// 배치 전송 1회
    pub async fn send(&self, service_token: &str, records: &[MetricRecord]) -> Result<(), PulseError> {
        let body = encode_records(records)?;
        debug!("배치 전송: {}개 레코드, {}bytes", records.len(), body.len());

        let resp = self
            .client
            .post(&self.track_url)
            .bearer_auth(service_token)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| PulseError::Transport(format!("배치 전송 요청 실패: {e}")))?;

        Self::check_response(resp).await?;
        debug!("배치 전송 성공");
        Ok(())
    }

    /// 수집 엔드포인트 URL
    pub fn track_url(&self) -> &str {
        &self.track_url
    }
}
