//! 자격증명 파일 저장소.
//!
//! 구조: `<storage_dir>/tokens/tokens.json`
//! 내용: `{"service_token": "...", "refresh_token": "..."}`

use async_trait::async_trait;
use pulse_core::error::PulseError;
use pulse_core::models::credentials::CredentialPair;
use pulse_core::ports::storage::TokenStore;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// 자격증명 하위 디렉토리
const TOKENS_DIR: &str = "tokens";

/// 자격증명 파일 이름
const TOKENS_FILE: &str = "tokens.json";

/// 파일 기반 자격증명 저장소
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// 저장소 열기 (`<storage_dir>/tokens` 없으면 생성)
    pub async fn open(storage_dir: &Path) -> Result<Self, PulseError> {
        let dir = storage_dir.join(TOKENS_DIR);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PulseError::Storage(format!("자격증명 디렉토리 생성 실패: {e}")))?;

        Ok(Self {
            path: dir.join(TOKENS_FILE),
        })
    }

    /// 자격증명 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<CredentialPair>, PulseError> {
        let bytes = match fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PulseError::Storage(format!("자격증명 파일 읽기 실패: {e}")));
            }
        };

        match serde_json::from_slice::<CredentialPair>(&bytes) {
            Ok(pair) => {
                debug!("저장된 자격증명 로드 (서비스 토큰 유효: {})", pair.is_live());
                Ok(Some(pair))
            }
            Err(e) => {
                warn!("자격증명 파일 파싱 실패, 무시: {e}");
                Err(PulseError::Decoding(format!("자격증명 파싱 실패: {e}")))
            }
        }
    }

    async fn save(&self, credentials: &CredentialPair) -> Result<(), PulseError> {
        let bytes = serde_json::to_vec_pretty(credentials)?;
        let tmp_path = self.path.with_extension("json.tmp");

        fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| PulseError::Storage(format!("자격증명 저장 실패: {e}")))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| PulseError::Storage(format!("자격증명 파일 이름 변경 실패: {e}")))?;

        debug!("자격증명 저장: {}", self.path.display());
        Ok(())
    }

    async fn clear(&self) -> Result<(), PulseError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("자격증명 삭제: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PulseError::Storage(format!("자격증명 삭제 실패: {e}"))),
        }
    }
}
