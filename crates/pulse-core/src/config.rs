//! 파이프라인 설정 구조체.
//!
//! 엔드포인트 URL, 배치 크기/주기, 재시도 정책, 로컬 저장소 용량 등
//! 하나의 설정 epoch 동안 불변인 스냅샷을 정의한다.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::PulseError;

/// 오버플로 저장소 디렉토리 이름
pub const STORAGE_DIR_NAME: &str = "PulseMetrics";

/// 주기 flush 간격 상한 (하루)
pub const MAX_BATCH_INTERVAL_SECS: f64 = 86_400.0;

/// 요청 타임아웃 상한
pub const MAX_REQUEST_TIMEOUT_SECS: f64 = 3_600.0;

/// 재시도 기본 지연 상한
pub const MAX_BASE_RETRY_DELAY_SECS: f64 = 3_600.0;

/// 파이프라인 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseConfig {
    /// 수집 서버 기본 URL
    pub base_url: String,
    /// 서비스 토큰 발급 URL
    pub token_url: String,
    /// 앱 장기 자격증명 (토큰 발급 시 Bearer)
    pub app_credential: String,
    /// 즉시 전송 임계 레코드 수
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 주기 flush 간격 (초)
    #[serde(default = "default_batch_interval_secs")]
    pub batch_interval_secs: f64,
    /// 요청 타임아웃 (초)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,
    /// 최대 재시도 횟수
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 재시도 기본 지연 (초): d, 2d, 4d ...
    #[serde(default = "default_base_retry_delay_secs")]
    pub base_retry_delay_secs: f64,
    /// 재시도 소진 배치를 디스크에 보관할지
    #[serde(default = "default_true")]
    pub persist_metrics: bool,
    /// 오버플로 저장소 최대 용량 (bytes)
    #[serde(default = "default_max_storage_bytes")]
    pub max_storage_bytes: u64,
    /// 오버플로 저장소 경로 (없으면 플랫폼 데이터 디렉토리)
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    /// 기본 서비스 코드
    #[serde(default)]
    pub default_service_code: Option<String>,
    /// 디바이스 정보를 메타데이터에 포함할지
    #[serde(default = "default_true")]
    pub include_device_info: bool,
    /// 메모리 버퍼 최대 레코드 수 (초과 시 가장 오래된 레코드부터 폐기)
    #[serde(default = "default_max_buffered_records")]
    pub max_buffered_records: usize,
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_interval_secs() -> f64 {
    60.0
}

fn default_request_timeout_secs() -> f64 {
    30.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_retry_delay_secs() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_max_storage_bytes() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_max_buffered_records() -> usize {
    10_000
}

impl PulseConfig {
    /// 필수 값만으로 생성 (나머지는 기본값)
    pub fn new(
        base_url: impl Into<String>,
        token_url: impl Into<String>,
        app_credential: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token_url: token_url.into(),
            app_credential: app_credential.into(),
            batch_size: default_batch_size(),
            batch_interval_secs: default_batch_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            base_retry_delay_secs: default_base_retry_delay_secs(),
            persist_metrics: true,
            max_storage_bytes: default_max_storage_bytes(),
            storage_dir: None,
            default_service_code: None,
            include_device_info: true,
            max_buffered_records: default_max_buffered_records(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval_secs = interval.as_secs_f64();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay_secs = delay.as_secs_f64();
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.persist_metrics = enabled;
        self
    }

    pub fn with_max_storage_bytes(mut self, bytes: u64) -> Self {
        self.max_storage_bytes = bytes;
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn with_default_service_code(mut self, code: impl Into<String>) -> Self {
        self.default_service_code = Some(code.into());
        self
    }

    pub fn with_device_info(mut self, include: bool) -> Self {
        self.include_device_info = include;
        self
    }

    pub fn with_max_buffered_records(mut self, max: usize) -> Self {
        self.max_buffered_records = max;
        self
    }

    /// 주기 flush 간격
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs_f64(self.batch_interval_secs)
    }

    /// 요청 타임아웃
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.request_timeout_secs)
    }

    /// 수집 엔드포인트 URL
    pub fn track_url(&self) -> String {
        format!(
            "{}/pulse/api/v1/customer/track",
            self.base_url.trim_end_matches('/')
        )
    }

    /// 오버플로 저장소 경로 결정 (설정값 또는 플랫폼 데이터 디렉토리)
    pub fn resolve_storage_dir(&self) -> Result<PathBuf, PulseError> {
        if let Some(dir) = &self.storage_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("com", "pulse", "metrics")
            .map(|p| p.data_dir().join(STORAGE_DIR_NAME))
            .ok_or_else(|| PulseError::Config("데이터 디렉토리를 결정할 수 없습니다".to_string()))
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<(), PulseError> {
        url::Url::parse(&self.base_url)
            .map_err(|e| PulseError::Config(format!("base_url 파싱 실패: {e}")))?;
        url::Url::parse(&self.token_url)
            .map_err(|e| PulseError::Config(format!("token_url 파싱 실패: {e}")))?;

        if self.batch_size == 0 {
            return Err(PulseError::Config("batch_size는 1 이상이어야 합니다".to_string()));
        }
        if !(self.batch_interval_secs > 0.0 && self.batch_interval_secs <= MAX_BATCH_INTERVAL_SECS) {
            return Err(PulseError::Config(format!(
                "batch_interval_secs는 0 초과 {MAX_BATCH_INTERVAL_SECS} 이하여야 합니다: {}",
                self.batch_interval_secs
            )));
        }
        if !(self.request_timeout_secs > 0.0 && self.request_timeout_secs <= MAX_REQUEST_TIMEOUT_SECS) {
            return Err(PulseError::Config(format!(
                "request_timeout_secs는 0 초과 {MAX_REQUEST_TIMEOUT_SECS} 이하여야 합니다: {}",
                self.request_timeout_secs
            )));
        }
        if !(self.base_retry_delay_secs >= 0.0
            && self.base_retry_delay_secs <= MAX_BASE_RETRY_DELAY_SECS)
        {
            return Err(PulseError::Config(format!(
                "base_retry_delay_secs는 0 이상 {MAX_BASE_RETRY_DELAY_SECS} 이하여야 합니다: {}",
                self.base_retry_delay_secs
            )));
        }
        if self.max_buffered_records < self.batch_size {
            return Err(PulseError::Config(format!(
                "max_buffered_records({})는 batch_size({}) 이상이어야 합니다",
                self.max_buffered_records, self.batch_size
            )));
        }
        Ok(())
    }
}
