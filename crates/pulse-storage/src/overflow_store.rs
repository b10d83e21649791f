//! 오버플로 배치 저장소.
//!
//! 재시도를 소진한 배치를 JSON 파일로 보관하고, 용량 초과 시 오래된 파일부터 삭제한다.
//! 구조: `<storage_dir>/batch-<uuid>.json` (레코드 JSON 배열)
//!
//! 다음 configure 시 `load_all()`로 전부 읽어 버퍼로 되돌리고 원본 파일을 지운다.
//! 파싱에 실패한 파일은 수동 확인을 위해 삭제하지 않는다.

use async_trait::async_trait;
use pulse_core::error::PulseError;
use pulse_core::models::batch::Batch;
use pulse_core::models::metric::{decode_records, encode_records};
use pulse_core::ports::storage::{OverflowStore, RestoredRecords};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, error, info, warn};

/// 배치 파일 접두사
const BATCH_FILE_PREFIX: &str = "batch-";

/// 배치 파일 확장자
const BATCH_FILE_EXT: &str = "json";

/// 저장된 배치 파일 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBatchFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 파일 크기 (bytes)
    pub size: u64,
    /// 저장 시각 (파일 수정 시각)
    pub stored_at: SystemTime,
}

/// 파일 기반 오버플로 저장소
pub struct FileOverflowStore {
    /// 배치 파일 디렉토리
    dir: PathBuf,
    /// 최대 저장 용량 (bytes)
    max_storage_bytes: u64,
}

impl FileOverflowStore {
    /// 저장소 열기 (디렉토리 없으면 생성)
    pub async fn open(dir: PathBuf, max_storage_bytes: u64) -> Result<Self, PulseError> {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| PulseError::Storage(format!("저장소 디렉토리 생성 실패: {e}")))?;

        info!(
            "오버플로 저장소 초기화: {} (최대 {}bytes)",
            dir.display(),
            max_storage_bytes
        );

        Ok(Self {
            dir,
            max_storage_bytes,
        })
    }

    /// 배치 파일 디렉토리
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 최대 저장 용량
    pub fn max_storage_bytes(&self) -> u64 {
        self.max_storage_bytes
    }

    /// 배치 파일 경로
    fn batch_path(&self, batch: &Batch) -> PathBuf {
        self.dir
            .join(format!("{BATCH_FILE_PREFIX}{}.{BATCH_FILE_EXT}", batch.id))
    }

    /// 저장된 배치 파일 목록 (저장 시각 오름차순)
    pub async fn list(&self) -> Result<Vec<StoredBatchFile>, PulseError> {
        let mut files = Vec::new();

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| PulseError::Storage(format!("저장소 디렉토리 읽기 실패: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PulseError::Storage(format!("디렉토리 항목 읽기 실패: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BATCH_FILE_EXT) {
                continue;
            }

            let metadata = match fs::metadata(&path).await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!("메타데이터 읽기 실패: {}: {e}", path.display());
                    continue;
                }
            };

            files.push(StoredBatchFile {
                stored_at: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: metadata.len(),
                path,
            });
        }

        // 동일 시각이면 파일명으로 고정 정렬
        files.sort_by(|a, b| {
            a.stored_at
                .cmp(&b.stored_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(files)
    }

    /// 용량 초과 시 오래된 파일부터 삭제
    ///
    /// # Returns
    /// 삭제된 파일 수
    pub async fn enforce_storage_limit(&self) -> Result<usize, PulseError> {
        let files = self.list().await?;
        let total: u64 = files.iter().map(|f| f.size).sum();

        if total <= self.max_storage_bytes {
            return Ok(0);
        }

        warn!(
            "저장소 용량 초과 ({total} > {}), 오래된 배치 정리",
            self.max_storage_bytes
        );

        let mut current = total;
        let mut deleted = 0;
        for file in files {
            if current <= self.max_storage_bytes {
                break;
            }

            match fs::remove_file(&file.path).await {
                Ok(()) => {
                    current = current.saturating_sub(file.size);
                    deleted += 1;
                    debug!("오래된 배치 삭제: {}", file.path.display());
                }
                Err(e) => error!("배치 파일 삭제 실패: {}: {e}", file.path.display()),
            }
        }

        if current > self.max_storage_bytes {
            return Err(PulseError::Storage(format!(
                "용량 제한 적용 실패: {current}bytes 남음"
            )));
        }

        Ok(deleted)
    }
}

#[async_trait]
impl OverflowStore for FileOverflowStore {
    async fn persist(&self, batch: &Batch) -> Result<PathBuf, PulseError> {
        let bytes = encode_records(&batch.records)?;
        let path = self.batch_path(batch);
        let tmp_path = path.with_extension("json.tmp");

        // 임시 파일에 쓴 뒤 rename, 목록에는 완성된 파일만 보임
        fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| PulseError::Storage(format!("배치 파일 저장 실패: {e}")))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| PulseError::Storage(format!("배치 파일 이름 변경 실패: {e}")))?;

        debug!(
            "배치 저장: {} ({}개 레코드, {}bytes)",
            path.display(),
            batch.len(),
            bytes.len()
        );

        let evicted = self.enforce_storage_limit().await?;
        if evicted > 0 {
            info!("용량 초과로 배치 {evicted}개 삭제");
        }

        Ok(path)
    }

    async fn load_all(&self) -> Result<RestoredRecords, PulseError> {
        let files = self.list().await?;
        info!("저장된 배치 {}개 발견", files.len());

        let mut restored = RestoredRecords::default();
        for file in files {
            let bytes = match fs::read(&file.path).await {
                Ok(b) => b,
                Err(e) => {
                    error!("배치 파일 읽기 실패: {}: {e}", file.path.display());
                    restored.files_skipped.push(file.path);
                    continue;
                }
            };

            let records = match decode_records(&bytes) {
                Ok(r) => r,
                Err(e) => {
                    error!("배치 파일 파싱 실패, 보존: {}: {e}", file.path.display());
                    restored.files_skipped.push(file.path);
                    continue;
                }
            };

            if let Err(e) = fs::remove_file(&file.path).await {
                // 레코드는 복원, 다음 로드에서 중복될 수 있음 (at-least-once)
                warn!("복원한 배치 파일 삭제 실패: {}: {e}", file.path.display());
            }

            debug!(
                "배치 복원: {} ({}개 레코드)",
                file.path.display(),
                records.len()
            );
            restored.records.extend(records);
            restored.files_loaded += 1;
        }

        Ok(restored)
    }

    async fn total_size(&self) -> Result<u64, PulseError> {
        Ok(self.list().await?.iter().map(|f| f.size).sum())
    }
}
