//! 설정 파일 관리.
//!
//! 플랫폼별 설정 디렉토리(또는 지정 경로)에 JSON 파일로 파이프라인 설정을 저장/로드한다.

use crate::config::PulseConfig;
use crate::error::PulseError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 설정 파일 이름
pub const CONFIG_FILE_NAME: &str = "pulse.json";

/// 설정 관리자
///
/// 설정 파일을 로드하거나 없으면 초기값으로 생성한다.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 로드된 설정
    config: PulseConfig,
    /// 설정 파일 경로
    config_path: PathBuf,
}

impl ConfigManager {
    /// 기존 설정 파일 로드
    pub fn with_path(config_path: PathBuf) -> Result<Self, PulseError> {
        let config = Self::load_from_file(&config_path)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    /// 설정 파일이 없으면 `initial`로 생성, 있으면 로드
    pub fn init(config_path: PathBuf, initial: PulseConfig) -> Result<Self, PulseError> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    PulseError::Config(format!(
                        "설정 디렉토리 생성 실패: {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
                info!("설정 디렉토리 생성: {}", parent.display());
            }
        }

        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::save_to_file(&config_path, &initial)?;
            info!("기본 설정 파일 생성: {}", config_path.display());
            initial
        };

        Ok(Self {
            config,
            config_path,
        })
    }

    /// 현재 설정 반환 (복제본)
    pub fn get(&self) -> PulseConfig {
        self.config.clone()
    }

    /// 설정 파일 경로 반환
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 플랫폼별 기본 설정 파일 경로
    ///
    /// - macOS: `~/Library/Application Support/com.pulse.metrics/pulse.json`
    /// - Windows: `%APPDATA%\pulse\metrics\config\pulse.json`
    /// - Linux: `~/.config/metrics/pulse.json`
    pub fn default_config_path() -> Result<PathBuf, PulseError> {
        directories::ProjectDirs::from("com", "pulse", "metrics")
            .map(|p| p.config_dir().join(CONFIG_FILE_NAME))
            .ok_or_else(|| PulseError::Config("설정 디렉토리를 결정할 수 없습니다".to_string()))
    }

    /// 파일에서 설정 로드
    fn load_from_file(path: &Path) -> Result<PulseConfig, PulseError> {
        let content = fs::read_to_string(path).map_err(|e| {
            PulseError::Config(format!("설정 파일 읽기 실패: {}: {}", path.display(), e))
        })?;

        let config: PulseConfig = serde_json::from_str(&content).map_err(|e| {
            PulseError::Config(format!("설정 파일 파싱 실패: {}: {}", path.display(), e))
        })?;

        debug!("설정 파일 로드 완료: {}", path.display());
        Ok(config)
    }

    /// 파일에 설정 저장
    fn save_to_file(path: &Path, config: &PulseConfig) -> Result<(), PulseError> {
        let content = serde_json::to_string_pretty(config)
            .map_err(|e| PulseError::Config(format!("설정 직렬화 실패: {}", e)))?;

        fs::write(path, content).map_err(|e| {
            PulseError::Config(format!("설정 파일 저장 실패: {}: {}", path.display(), e))
        })?;

        Ok(())
    }
}
