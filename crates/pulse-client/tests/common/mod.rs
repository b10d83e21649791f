//! 통합 테스트 공용 도구.
//!
//! 응답 순서를 미리 정해둔 인메모리 전송과 이벤트 대기 헬퍼.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_client::event_bus::PipelineEvent;
use pulse_core::config::PulseConfig;
use pulse_core::error::PulseError;
use pulse_core::models::credentials::CredentialPair;
use pulse_core::models::metric::MetricRecord;
use pulse_core::ports::transport::{Transport, TransportFactory};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

/// 스크립트 응답
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Unauthorized,
    NetworkDown,
    ServerError,
}

impl Reply {
    fn into_error(self) -> Option<PulseError> {
        match self {
            Reply::Ok => None,
            Reply::Unauthorized => Some(PulseError::Unauthorized),
            Reply::NetworkDown => Some(PulseError::Transport("연결 거부".to_string())),
            Reply::ServerError => Some(PulseError::Server {
                status: 503,
                body: "unavailable".to_string(),
            }),
        }
    }
}

/// 기록된 전송 호출
#[derive(Debug, Clone)]
pub struct SendCall {
    pub at: Instant,
    pub token: String,
    pub records: Vec<MetricRecord>,
}

#[derive(Debug)]
struct Script {
    token_plan: VecDeque<Reply>,
    send_plan: VecDeque<Reply>,
    default_token: Reply,
    default_send: Reply,
    token_delay: Duration,
    token_calls: Vec<Instant>,
    sends: Vec<SendCall>,
    issued: usize,
}

/// 스크립트 전송 (팩토리 겸용, 복제본은 상태 공유)
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    /// 모든 요청 성공
    pub fn healthy() -> Self {
        Self::with_defaults(Reply::Ok, Reply::Ok)
    }

    /// 토큰은 성공, 전송은 모두 네트워크 실패
    pub fn offline() -> Self {
        Self::with_defaults(Reply::Ok, Reply::NetworkDown)
    }

    pub fn with_defaults(token: Reply, send: Reply) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                token_plan: VecDeque::new(),
                send_plan: VecDeque::new(),
                default_token: token,
                default_send: send,
                token_delay: Duration::ZERO,
                token_calls: Vec::new(),
                sends: Vec::new(),
                issued: 0,
            })),
        }
    }

    /// 다음 토큰 응답들 (소진 후 기본값)
    pub fn plan_tokens(self, replies: &[Reply]) -> Self {
        self.script.lock().token_plan.extend(replies.iter().copied());
        self
    }

    /// 다음 전송 응답들 (소진 후 기본값)
    pub fn plan_sends(self, replies: &[Reply]) -> Self {
        self.script.lock().send_plan.extend(replies.iter().copied());
        self
    }

    pub fn token_delay(self, delay: Duration) -> Self {
        self.script.lock().token_delay = delay;
        self
    }

    pub fn token_calls(&self) -> Vec<Instant> {
        self.script.lock().token_calls.clone()
    }

    pub fn sends(&self) -> Vec<SendCall> {
        self.script.lock().sends.clone()
    }

    pub fn factory(&self) -> Arc<dyn TransportFactory> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_token(&self) -> Result<CredentialPair, PulseError> {
        let (reply, delay) = {
            let mut script = self.script.lock();
            script.token_calls.push(Instant::now());
            let reply = script.token_plan.pop_front().unwrap_or(script.default_token);
            (reply, script.token_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply.into_error() {
            Some(err) => Err(err),
            None => {
                let mut script = self.script.lock();
                script.issued += 1;
                Ok(CredentialPair::new(format!("svc-{}", script.issued), "ref"))
            }
        }
    }

    async fn send_batch(&self, service_token: &str, records: &[MetricRecord]) -> Result<(), PulseError> {
        let mut script = self.script.lock();
        script.sends.push(SendCall {
            at: Instant::now(),
            token: service_token.to_string(),
            records: records.to_vec(),
        });
        let reply = script.send_plan.pop_front().unwrap_or(script.default_send);
        match reply.into_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl TransportFactory for ScriptedTransport {
    fn build(&self, _config: &PulseConfig) -> Result<Arc<dyn Transport>, PulseError> {
        Ok(Arc::new(self.clone()))
    }
}

/// 테스트 기본 설정 (디바이스 정보 제외)
pub fn test_config(storage_dir: &Path) -> PulseConfig {
    PulseConfig::new("https://pulse.test", "https://pulse.test/oauth/token", "app-secret")
        .with_storage_dir(storage_dir)
        .with_device_info(false)
}

/// 조건에 맞는 이벤트가 올 때까지 대기 (지나간 이벤트 반환)
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<PipelineEvent>, pred: F) -> Vec<PipelineEvent>
where
    F: Fn(&PipelineEvent) -> bool,
{
    let mut seen = Vec::new();
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let done = pred(&event);
                    seen.push(event);
                    if done {
                        return;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("이벤트 버스 닫힘"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(3600), wait)
        .await
        .expect("이벤트 대기 시간 초과");
    seen
}

/// 저장소 디렉토리의 배치 파일 목록
pub fn batch_files(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}
