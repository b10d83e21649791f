//! 로그 구독자 설치.
//!
//! `pulse_*` crate에만 적용되는 EnvFilter를 reload 레이어로 감싸
//! 런타임에 `PulseMetrics::set_log_level`로 바꿀 수 있게 한다.
//! 호스트 앱이 자체 구독자를 쓰면 설치하지 않아도 된다.

use pulse_core::error::PulseError;
use pulse_core::log_level::PulseLogLevel;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// 파이프라인 crate 목록 (EnvFilter 대상)
const PULSE_TARGETS: [&str; 4] = ["pulse_core", "pulse_network", "pulse_storage", "pulse_client"];

/// 설치된 필터의 reload 핸들
#[derive(Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// 필터 교체
    pub fn set_level(&self, level: PulseLogLevel) -> Result<(), PulseError> {
        self.handle
            .reload(filter_for(level))
            .map_err(|e| PulseError::Config(format!("로그 필터 교체 실패: {e}")))
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle").finish_non_exhaustive()
    }
}

/// 레벨에 맞는 EnvFilter 생성
pub fn filter_for(level: PulseLogLevel) -> EnvFilter {
    let directives = PULSE_TARGETS
        .iter()
        .map(|target| format!("{target}={}", level.as_directive()))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::new(directives)
}

/// 전역 구독자 설치 (프로세스당 한 번)
pub fn install(level: PulseLogLevel) -> Result<LogHandle, PulseError> {
    let (filter, handle) = reload::Layer::new(filter_for(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| PulseError::Config(format!("로그 구독자 설치 실패: {e}")))?;

    Ok(LogHandle { handle })
}
