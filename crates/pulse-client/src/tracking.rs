//! 이벤트 추적 옵션과 타입별 헬퍼.
//!
//! 레코드 조립 순서: 기본 메타데이터 → 호출 메타데이터 → `device`.
//! 서비스 코드는 호출값 → 설정 기본값 → `"unknown"` 순으로 정한다.

use chrono::Utc;
use pulse_core::models::metadata::{Metadata, MetadataValue};
use pulse_core::models::metric::MetricRecord;

/// 서비스 코드가 없을 때 쓰는 값
pub const UNKNOWN_SERVICE_CODE: &str = "unknown";

pub const SCREEN_VIEW_EVENT: &str = "screen_view";
pub const USER_ACTION_EVENT: &str = "user_action";
pub const ERROR_EVENT: &str = "error";
pub const PERFORMANCE_EVENT: &str = "performance";

/// `track_event` 선택 인자
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackOptions {
    pub event_sub_type: Option<String>,
    pub service_code: Option<String>,
    pub user_id: Option<String>,
    pub metadata: Metadata,
}

impl TrackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.event_sub_type = Some(sub_type.into());
        self
    }

    pub fn service_code(mut self, code: impl Into<String>) -> Self {
        self.service_code = Some(code.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 헬퍼 고유 키를 깔고 호출 메타데이터로 덮어씀
    fn layered_over(mut self, base: Metadata) -> Self {
        let extra = std::mem::replace(&mut self.metadata, base);
        self.metadata.extend(extra);
        self
    }
}

/// 레코드 조립 기본값 (매니저 액터 소유)
#[derive(Debug, Clone, Default)]
pub struct RecordDefaults {
    pub service_code: Option<String>,
    pub user_id: Option<String>,
    pub metadata: Metadata,
    pub device: Option<MetadataValue>,
}

impl RecordDefaults {
    /// 이벤트 이름과 옵션으로 레코드 생성
    pub fn build(&self, event_type: &str, options: TrackOptions) -> MetricRecord {
        let mut metadata = self.metadata.clone();
        metadata.extend(options.metadata);
        if let Some(device) = &self.device {
            metadata.insert("device".to_string(), device.clone());
        }

        let service_code = options
            .service_code
            .or_else(|| self.service_code.clone())
            .unwrap_or_else(|| UNKNOWN_SERVICE_CODE.to_string());

        MetricRecord {
            service_code,
            event_type: event_type.to_string(),
            event_sub_type: options.event_sub_type,
            user_id: options.user_id.or_else(|| self.user_id.clone()),
            timestamp: Utc::now(),
            metadata: None,
        }
        .with_metadata(metadata)
    }
}

/// 화면 조회
pub fn screen_view(screen_name: &str, screen_class: Option<&str>, options: TrackOptions) -> TrackOptions {
    let mut base = Metadata::new();
    base.insert("screen_name".to_string(), screen_name.into());
    if let Some(class) = screen_class {
        base.insert("screen_class".to_string(), class.into());
    }
    options.layered_over(base)
}

/// 사용자 행동
pub fn user_action(
    action: &str,
    category: Option<&str>,
    label: Option<&str>,
    value: Option<MetadataValue>,
    options: TrackOptions,
) -> TrackOptions {
    let mut base = Metadata::new();
    base.insert("action".to_string(), action.into());
    if let Some(category) = category {
        base.insert("category".to_string(), category.into());
    }
    if let Some(label) = label {
        base.insert("label".to_string(), label.into());
    }
    if let Some(value) = value {
        base.insert("value".to_string(), value);
    }
    options.layered_over(base)
}

/// 에러
///
/// `std::io::Error`는 OS 에러 코드와 `io` 도메인을 채운다.
pub fn error(
    err: &(dyn std::error::Error + 'static),
    domain: Option<&str>,
    context: Option<&str>,
    options: TrackOptions,
) -> TrackOptions {
    let io_err = err.downcast_ref::<std::io::Error>();

    let mut base = Metadata::new();
    base.insert("error_message".to_string(), err.to_string().into());
    if let Some(code) = io_err.and_then(|e| e.raw_os_error()) {
        base.insert("error_code".to_string(), code.into());
    }
    let domain = domain.unwrap_or(if io_err.is_some() { "io" } else { "application" });
    base.insert("error_domain".to_string(), domain.into());
    if let Some(context) = context {
        base.insert("context".to_string(), context.into());
    }
    options.layered_over(base)
}

/// 성능 측정값
pub fn performance(name: &str, category: &str, value: f64, options: TrackOptions) -> TrackOptions {
    let mut base = Metadata::new();
    base.insert("metric_name".to_string(), name.into());
    base.insert("category".to_string(), category.into());
    base.insert("value".to_string(), value.into());
    options.layered_over(base)
}
