//! 소요 시간 측정기.
//!
//! `stop()` 시 경과 시간(ms)을 `performance` 이벤트로 기록한다.

use pulse_core::models::metadata::MetadataValue;
use std::time::Duration;
use tokio::time::Instant;

use crate::manager::PulseMetrics;
use crate::tracking::TrackOptions;

/// 성능 측정기
pub struct PerformanceTracker {
    metrics: PulseMetrics,
    name: String,
    category: String,
    started_at: Instant,
    options: TrackOptions,
}

impl PerformanceTracker {
    /// 측정 시작
    pub fn start(metrics: PulseMetrics, name: &str, category: &str) -> Self {
        Self {
            metrics,
            name: name.to_string(),
            category: category.to_string(),
            started_at: Instant::now(),
            options: TrackOptions::default(),
        }
    }

    /// 기록 시 함께 보낼 옵션 (사용자 ID, 추가 메타데이터 등)
    pub fn with_options(mut self, options: TrackOptions) -> Self {
        self.options = options;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 측정 종료 및 기록
    ///
    /// # Returns
    /// 경과 시간 (ms)
    pub fn stop(self) -> f64 {
        self.stop_with(Vec::<(String, MetadataValue)>::new())
    }

    /// 추가 메타데이터와 함께 측정 종료
    pub fn stop_with<I, K>(self, extra: I) -> f64
    where
        I: IntoIterator<Item = (K, MetadataValue)>,
        K: Into<String>,
    {
        let elapsed_ms = self.elapsed().as_secs_f64() * 1000.0;

        let mut options = self.options;
        options
            .metadata
            .extend(extra.into_iter().map(|(k, v)| (k.into(), v)));

        self.metrics
            .track_performance(&self.name, &self.category, elapsed_ms, options);
        elapsed_ms
    }
}
