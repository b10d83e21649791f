//! 배치 모델.
//!
//! flush 시점에 버퍼에서 원자적으로 떼어낸 레코드 스냅샷.
//! 전송·재시도·영속화의 단위이며 분할/병합되지 않는다.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::metric::MetricRecord;

/// 전송 단위 배치
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 배치 고유 ID
    pub id: Uuid,
    /// 삽입 순서가 보존된 레코드
    pub records: Vec<MetricRecord>,
    /// 재시도 카운터 (0부터 시작)
    pub retry_count: u32,
    /// 현재 시도에서 401로 토큰을 이미 재발급했는지
    pub auth_refreshed: bool,
    /// 배치 생성 시각
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// 새 배치 생성 (retry_count = 0)
    pub fn new(records: Vec<MetricRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            records,
            retry_count: 0,
            auth_refreshed: false,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 다음 재시도 준비: 카운터 증가, 401 재발급 플래그 초기화
    pub fn next_attempt(mut self) -> Self {
        self.retry_count += 1;
        self.auth_refreshed = false;
        self
    }

    /// 배치를 해체해 레코드 반환
    pub fn into_records(self) -> Vec<MetricRecord> {
        self.records
    }
}
