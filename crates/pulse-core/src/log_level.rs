//! 로그 레벨.
//!
//! 매니저 공개 API의 로그 스위치. `tracing` 레벨 필터로 변환된다.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

use crate::error::PulseError;

/// 파이프라인 로그 레벨 (`None` < `Error` < ... < `Verbose`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseLogLevel {
    /// 로그 출력 안 함
    None,
    #[default]
    Error,
    Warning,
    Info,
    Debug,
    /// trace 레벨까지 출력
    Verbose,
}

impl PulseLogLevel {
    /// tracing 레벨 필터로 변환
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::None => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warning => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Verbose => LevelFilter::TRACE,
        }
    }

    /// EnvFilter 지시어에 쓰는 이름
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::None => "off",
            Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Verbose => "trace",
        }
    }
}

impl FromStr for PulseLogLevel {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "verbose" | "trace" => Ok(Self::Verbose),
            other => Err(PulseError::Config(format!("알 수 없는 로그 레벨: {other}"))),
        }
    }
}
