//! 전송 포트.
//!
//! 구현: `pulse-network` crate (reqwest)

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::PulseConfig;
use crate::error::PulseError;
use crate::models::credentials::CredentialPair;
use crate::models::metric::MetricRecord;

/// 토큰 발급 + 배치 전송 세션
///
/// 한 설정 epoch 동안 유지되며, configure 시 새로 만들어진다.
#[async_trait]
pub trait Transport: Send + Sync {
    /// 앱 자격증명으로 서비스 토큰 발급 (재시도 없음)
    async fn fetch_token(&self) -> Result<CredentialPair, PulseError>;

    /// 레코드 배치 전송: 2xx면 Ok, 401이면 `PulseError::Unauthorized`
    async fn send_batch(
        &self,
        service_token: &str,
        records: &[MetricRecord],
    ) -> Result<(), PulseError>;
}

/// 설정으로부터 전송 세션을 만드는 팩토리
pub trait TransportFactory: Send + Sync {
    fn build(&self, config: &PulseConfig) -> Result<Arc<dyn Transport>, PulseError>;
}
