//! 로컬 저장소 포트.
//!
//! 구현: `pulse-storage` crate (파일 시스템)

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::PulseError;
use crate::models::batch::Batch;
use crate::models::credentials::CredentialPair;
use crate::models::metric::MetricRecord;

/// 디스크에서 복원한 레코드
#[derive(Debug, Default)]
pub struct RestoredRecords {
    /// 저장 시각 오름차순으로 이어 붙인 레코드
    pub records: Vec<MetricRecord>,
    /// 읽고 삭제한 파일 수
    pub files_loaded: usize,
    /// 파싱 실패로 남겨둔 파일
    pub files_skipped: Vec<PathBuf>,
}

/// 재시도를 소진한 배치의 용량 제한 저장소
#[async_trait]
pub trait OverflowStore: Send + Sync {
    /// 배치를 파일로 저장한 뒤 용량 제한 적용
    async fn persist(&self, batch: &Batch) -> Result<PathBuf, PulseError>;

    /// 저장된 배치를 모두 읽어 반환하고 원본 파일 삭제
    async fn load_all(&self) -> Result<RestoredRecords, PulseError>;

    /// 저장된 파일 총 용량 (bytes)
    async fn total_size(&self) -> Result<u64, PulseError>;
}

/// 자격증명 저장소
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// 저장된 자격증명 로드 (없으면 None)
    async fn load(&self) -> Result<Option<CredentialPair>, PulseError>;

    /// 자격증명 저장 (덮어쓰기)
    async fn save(&self, credentials: &CredentialPair) -> Result<(), PulseError>;

    /// 자격증명 삭제
    async fn clear(&self) -> Result<(), PulseError>;
}
