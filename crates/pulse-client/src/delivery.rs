//! 배치 전송 결정.
//!
//! 배치 상태: `PENDING → SENDING → {DELIVERED | AWAITING_TOKEN | RETRY_SCHEDULED | SPILLED}`
//!
//! - 401 첫 응답: 서비스 토큰 재발급 후 같은 retry_count로 재전송
//! - 같은 시도 안의 두 번째 401, 토큰 발급 실패, 그 외 실패: 일반 실패
//! - 일반 실패: `retry_count < max_retries`면 `base * 2^retry_count` 뒤 재시도, 아니면 소진
//!
//! 소진 배치 처리(디스크 저장 또는 버퍼 재삽입)는 설정 epoch마다 한 번 결정된다.

use pulse_core::config::PulseConfig;
use pulse_core::error::PulseError;
use pulse_core::models::batch::Batch;
use pulse_core::ports::storage::OverflowStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// 실패 후 다음 단계
#[derive(Debug, PartialEq)]
pub enum Decision {
    /// 토큰 재발급 후 즉시 재전송 (retry_count 유지)
    Refetch(Batch),
    /// 지연 후 재시도 (retry_count 증가 완료)
    Retry { batch: Batch, delay: Duration },
    /// 재시도 소진
    Exhausted(Batch),
}

/// 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// 최대 재시도 횟수
    pub max_retries: u32,
    /// 기본 지연 (초)
    pub base_delay_secs: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &PulseConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_secs: config.base_retry_delay_secs,
        }
    }

    /// 증가 전 retry_count 기준 지연: base * 2^retry_count
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 2f64.powi(retry_count.min(30) as i32);
        Duration::try_from_secs_f64(self.base_delay_secs * factor).unwrap_or(Duration::MAX)
    }

    /// 전송 실패 처리
    pub fn after_send_error(&self, mut batch: Batch, err: &PulseError) -> Decision {
        if err.is_unauthorized() && !batch.auth_refreshed {
            debug!("배치 {} 401 수신, 토큰 재발급 후 재전송", batch.id);
            batch.auth_refreshed = true;
            return Decision::Refetch(batch);
        }
        self.after_failure(batch)
    }

    /// 일반 실패 처리 (토큰 발급 실패 포함)
    pub fn after_failure(&self, batch: Batch) -> Decision {
        if batch.retry_count < self.max_retries {
            let delay = self.delay_for(batch.retry_count);
            Decision::Retry {
                batch: batch.next_attempt(),
                delay,
            }
        } else {
            Decision::Exhausted(batch)
        }
    }
}

/// 재시도 소진 배치 처리 방식
#[derive(Clone)]
pub enum ExhaustionPolicy {
    /// 오버플로 저장소에 기록 (실패 시 재삽입)
    Spill(Arc<dyn OverflowStore>),
    /// 버퍼 앞에 재삽입
    Requeue,
}

impl std::fmt::Debug for ExhaustionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spill(_) => f.write_str("Spill"),
            Self::Requeue => f.write_str("Requeue"),
        }
    }
}

/// 소진 처리 결과
#[derive(Debug)]
pub enum ExhaustionOutcome {
    /// 디스크에 저장됨
    Spilled { batch: Batch, path: PathBuf },
    /// 버퍼 재삽입 필요
    Requeue(Batch),
}

impl ExhaustionPolicy {
    /// 소진 배치 처리
    pub async fn resolve(&self, batch: Batch) -> ExhaustionOutcome {
        match self {
            Self::Spill(store) => match store.persist(&batch).await {
                Ok(path) => {
                    warn!(
                        "배치 {} 재시도 소진, 디스크에 저장 ({}개 레코드)",
                        batch.id,
                        batch.len()
                    );
                    ExhaustionOutcome::Spilled { batch, path }
                }
                Err(e) => {
                    error!("배치 {} 저장 실패, 버퍼로 재삽입: {e}", batch.id);
                    ExhaustionOutcome::Requeue(batch)
                }
            },
            Self::Requeue => {
                warn!("배치 {} 재시도 소진, 버퍼로 재삽입", batch.id);
                ExhaustionOutcome::Requeue(batch)
            }
        }
    }
}
