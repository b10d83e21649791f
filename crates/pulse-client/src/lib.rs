//! # pulse-client
//!
//! 애플리케이션에 내장되는 메트릭 파이프라인.
//! 레코드를 메모리 버퍼에 모아 배치로 전송하고, 반복 실패한 배치는 로컬 저장소로 넘긴다.
//!
//! ## 구조
//!
//! - [`manager`]: `PulseMetrics` 핸들과 단일 액터 태스크
//! - [`buffer`]: 용량 제한이 있는 배치 버퍼
//! - [`delivery`]: 재시도/401/소진 결정
//! - [`event_bus`]: 파이프라인 이벤트 broadcast
//! - [`tracking`]: 이벤트 옵션과 타입별 추적 헬퍼
//! - [`performance`]: 소요 시간 측정기
//! - [`device`]: 디바이스 메타데이터 수집
//! - [`logging`]: 재설정 가능한 tracing 구독자
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! let metrics = PulseMetrics::new();
//! metrics.configure(PulseConfig::new(base_url, token_url, credential)).await?;
//! metrics.track_screen_view("home", None, TrackOptions::default());
//! metrics.flush().await;
//! metrics.shutdown().await;
//! ```

pub mod buffer;
pub mod delivery;
pub mod device;
pub mod event_bus;
pub mod logging;
pub mod manager;
pub mod performance;
pub mod tracking;

pub use manager::{PipelineStats, PulseMetrics};
pub use tracking::TrackOptions;
