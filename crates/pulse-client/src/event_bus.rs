//! 파이프라인 이벤트 버스.
//!
//! `tokio::broadcast` 기반. 전송/재시도/저장 결과를 구독자에게 알린다.
//! 구독자가 없으면 이벤트는 버려진다.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// 파이프라인 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// 새 설정 적용 완료
    Configured { epoch: u64 },
    /// 배치 전송 성공
    BatchDelivered { batch_id: Uuid, records: usize },
    /// 재시도 예약
    RetryScheduled {
        batch_id: Uuid,
        retry_count: u32,
        delay: Duration,
    },
    /// 서비스 토큰 발급 완료
    TokenRefreshed,
    /// 401로 서비스 토큰 무효화
    TokenInvalidated,
    /// 재시도 소진 배치를 디스크에 저장
    BatchSpilled {
        batch_id: Uuid,
        records: usize,
        path: PathBuf,
    },
    /// 배치를 버퍼 앞에 재삽입
    BatchRequeued { batch_id: Uuid, records: usize },
    /// 버퍼 용량 초과로 레코드 폐기
    RecordsDropped { count: usize },
    /// 디스크에서 레코드 복원
    RecordsRestored { records: usize, files: usize },
}

/// 파이프라인 이벤트 버스
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// 새 이벤트 버스 생성
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 이벤트 발행
    pub fn publish(&self, event: PipelineEvent) {
        trace!("이벤트 발행: {:?}", event);
        let _ = self.tx.send(event);
    }

    /// 구독자 생성
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(PipelineEvent::TokenRefreshed);

        let event = rx.recv().await.unwrap();
        assert_eq!(event, PipelineEvent::TokenRefreshed);
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PipelineEvent::RecordsDropped { count: 3 });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            PipelineEvent::RecordsDropped { count: 3 }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            PipelineEvent::RecordsDropped { count: 3 }
        ));
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        bus.publish(PipelineEvent::TokenInvalidated);
    }
}
