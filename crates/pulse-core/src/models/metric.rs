//! 메트릭 레코드 모델.
//!
//! 애플리케이션이 추적하는 단일 이벤트. 생성 후 불변이며 배치 단위로 한 번만 직렬화된다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::{Metadata, MetadataValue};

/// 단일 메트릭 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// 서비스 코드
    pub service_code: String,
    /// 이벤트 유형 (예: "screen_view", "error")
    pub event_type: String,
    /// 이벤트 하위 유형
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_sub_type: Option<String>,
    /// 사용자 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// 발생 시각 (ISO-8601)
    pub timestamp: DateTime<Utc>,
    /// 자유 형식 메타데이터
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl MetricRecord {
    /// 현재 시각으로 레코드 생성
    pub fn new(service_code: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            service_code: service_code.into(),
            event_type: event_type.into(),
            event_sub_type: None,
            user_id: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.event_sub_type = Some(sub_type.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 메타데이터 전체 설정 (빈 맵이면 생략)
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = if metadata.is_empty() {
            None
        } else {
            Some(metadata)
        };
        self
    }

    /// 메타데이터 항목 하나 추가
    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }

    /// 메타데이터 값 조회
    pub fn metadata_value(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }
}

/// 레코드 배열을 와이어 포맷(JSON 배열)으로 인코딩
pub fn encode_records(records: &[MetricRecord]) -> Result<Vec<u8>, crate::error::PulseError> {
    serde_json::to_vec(records).map_err(|e| crate::error::PulseError::Encoding(e.to_string()))
}

/// 와이어 포맷(JSON 배열)에서 레코드 디코딩
pub fn decode_records(bytes: &[u8]) -> Result<Vec<MetricRecord>, crate::error::PulseError> {
    serde_json::from_slice(bytes).map_err(|e| crate::error::PulseError::Decoding(e.to_string()))
}
