//! Pulse 매니저.
//!
//! `PulseMetrics`는 단일 액터 태스크에 대한 복제 가능한 핸들이다.
//! 버퍼, 자격증명, 설정은 액터만 변경하며 핸들은 unbounded mpsc로 명령을 보낸다.
//! 네트워크 호출과 재시도 타이머는 별도 태스크에서 실행되고 결과를 다시 명령으로 돌려준다.
//! 마지막 핸들이 drop되면 `shutdown()`과 같은 정리 과정을 밟는다.

use parking_lot::Mutex;
use pulse_core::config::PulseConfig;
use pulse_core::error::PulseError;
use pulse_core::log_level::PulseLogLevel;
use pulse_core::models::batch::Batch;
use pulse_core::models::credentials::CredentialPair;
use pulse_core::models::metadata::{Metadata, MetadataValue};
use pulse_core::models::metric::MetricRecord;
use pulse_core::ports::storage::{OverflowStore, TokenStore};
use pulse_core::ports::transport::{Transport, TransportFactory};
use pulse_network::transport::HttpTransportFactory;
use pulse_storage::overflow_store::FileOverflowStore;
use pulse_storage::token_store::FileTokenStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::buffer::BatchBuffer;
use crate::delivery::{Decision, ExhaustionOutcome, ExhaustionPolicy, RetryPolicy};
use crate::device::DeviceInfo;
use crate::event_bus::{EventBus, PipelineEvent};
use crate::logging::LogHandle;
use crate::performance::PerformanceTracker;
use crate::tracking::{self, RecordDefaults, TrackOptions};

/// configure 이전 버퍼 용량
const UNCONFIGURED_BUFFER_CAPACITY: usize = 10_000;

/// 파이프라인 상태 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub configured: bool,
    /// 설정 epoch (configure마다 1 증가)
    pub epoch: u64,
    pub buffered: usize,
    pub in_flight: usize,
    pub awaiting_token: usize,
    pub waiting_retry: usize,
    /// 살아 있는 서비스 토큰 보유 여부
    pub token_live: bool,
}

/// 액터 명령
enum Command {
    Configure {
        config: Box<PulseConfig>,
        reply: oneshot::Sender<Result<(), PulseError>>,
    },
    Track(MetricRecord),
    TrackEvent {
        event_type: String,
        options: TrackOptions,
    },
    SetDefaultUserId(Option<String>),
    SetDefaultMetadata(Metadata),
    Flush {
        reply: oneshot::Sender<()>,
    },
    Clear {
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<PipelineStats>,
    },
    SendFinished {
        batch_id: Uuid,
        token: String,
        result: Result<(), PulseError>,
    },
    TokenFetched {
        epoch: u64,
        result: Result<CredentialPair, PulseError>,
    },
    RetryDue {
        batch_id: Uuid,
    },
    Shutdown {
        reply: Option<oneshot::Sender<()>>,
    },
}

struct LogState {
    level: PulseLogLevel,
    handle: Option<LogHandle>,
}

struct Inner {
    tx: mpsc::UnboundedSender<Command>,
    events: EventBus,
    enabled: AtomicBool,
    log: Mutex<LogState>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown { reply: None });
    }
}

/// 메트릭 파이프라인 핸들
#[derive(Clone)]
pub struct PulseMetrics {
    inner: Arc<Inner>,
}

impl PulseMetrics {
    /// HTTP 전송으로 매니저 생성
    ///
    /// # Panics
    /// tokio 런타임 밖에서 호출하면 패닉
    pub fn new() -> Self {
        Self::with_transport_factory(Arc::new(HttpTransportFactory))
    }

    /// 전송 팩토리를 지정해 매니저 생성
    ///
    /// # Panics
    /// tokio 런타임 밖에서 호출하면 패닉 (액터 태스크를 `tokio::spawn`으로 시작)
    pub fn with_transport_factory(factory: Arc<dyn TransportFactory>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = EventBus::default();

        let actor = PipelineActor::new(rx, tx.clone(), events.clone(), factory);
        tokio::spawn(actor.run());

        Self {
            inner: Arc::new(Inner {
                tx,
                events,
                enabled: AtomicBool::new(true),
                log: Mutex::new(LogState {
                    level: PulseLogLevel::default(),
                    handle: None,
                }),
            }),
        }
    }

    fn send(&self, cmd: Command) -> Result<(), PulseError> {
        self.inner
            .tx
            .send(cmd)
            .map_err(|_| PulseError::ChannelClosed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PulseError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| PulseError::ChannelClosed)
    }

    /// 설정 적용
    ///
    /// 전송 세션과 flush 타이머를 새로 만들고, 영속화가 켜져 있으면
    /// 저장된 자격증명과 배치를 다시 읽는다. 버퍼는 유지된다.
    pub async fn configure(&self, config: PulseConfig) -> Result<(), PulseError> {
        self.request(|reply| Command::Configure {
            config: Box::new(config),
            reply,
        })
        .await?
    }

    pub fn set_log_level(&self, level: PulseLogLevel) {
        let mut log = self.inner.log.lock();
        log.level = level;
        if let Some(handle) = &log.handle {
            if let Err(e) = handle.set_level(level) {
                warn!("{e}");
            }
        }
    }

    pub fn log_level(&self) -> PulseLogLevel {
        self.inner.log.lock().level
    }

    /// `logging::install`로 만든 핸들 연결 (현재 레벨 즉시 적용)
    pub fn attach_log_handle(&self, handle: LogHandle) {
        let mut log = self.inner.log.lock();
        if let Err(e) = handle.set_level(log.level) {
            warn!("{e}");
        }
        log.handle = Some(handle);
    }

    /// 비활성화는 새 레코드만 막는다 (버퍼/전송 중 배치는 계속 전달)
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
        info!("메트릭 수집 {}", if enabled { "활성화" } else { "비활성화" });
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// 완성된 레코드 추가
    pub fn track(&self, record: MetricRecord) {
        if !self.is_enabled() {
            debug!("수집 비활성화 상태, 레코드 무시: {}", record.event_type);
            return;
        }
        if self.send(Command::Track(record)).is_err() {
            warn!("매니저 종료됨, 레코드 무시");
        }
    }

    /// 기본값을 병합해 레코드 생성 후 추가
    pub fn track_event(&self, event_type: impl Into<String>, options: TrackOptions) {
        let event_type = event_type.into();
        if !self.is_enabled() {
            debug!("수집 비활성화 상태, 이벤트 무시: {event_type}");
            return;
        }
        if self
            .send(Command::TrackEvent {
                event_type,
                options,
            })
            .is_err()
        {
            warn!("매니저 종료됨, 이벤트 무시");
        }
    }

    pub fn track_screen_view(&self, screen_name: &str, screen_class: Option<&str>, options: TrackOptions) {
        self.track_event(
            tracking::SCREEN_VIEW_EVENT,
            tracking::screen_view(screen_name, screen_class, options),
        );
    }

    pub fn track_user_action(
        &self,
        action: &str,
        category: Option<&str>,
        label: Option<&str>,
        value: Option<MetadataValue>,
        options: TrackOptions,
    ) {
        self.track_event(
            tracking::USER_ACTION_EVENT,
            tracking::user_action(action, category, label, value, options),
        );
    }

    pub fn track_error(
        &self,
        err: &(dyn std::error::Error + 'static),
        domain: Option<&str>,
        context: Option<&str>,
        options: TrackOptions,
    ) {
        self.track_event(
            tracking::ERROR_EVENT,
            tracking::error(err, domain, context, options),
        );
    }

    pub fn track_performance(&self, name: &str, category: &str, value: f64, options: TrackOptions) {
        self.track_event(
            tracking::PERFORMANCE_EVENT,
            tracking::performance(name, category, value, options),
        );
    }

    /// 소요 시간 측정 시작
    pub fn start_performance(&self, name: &str, category: &str) -> PerformanceTracker {
        PerformanceTracker::start(self.clone(), name, category)
    }

    pub fn set_default_user_id(&self, user_id: Option<String>) {
        if self.send(Command::SetDefaultUserId(user_id)).is_err() {
            warn!("매니저 종료됨, 기본 사용자 ID 변경 무시");
        }
    }

    pub fn set_default_metadata(&self, metadata: Metadata) {
        if self.send(Command::SetDefaultMetadata(metadata)).is_err() {
            warn!("매니저 종료됨, 기본 메타데이터 변경 무시");
        }
    }

    /// 버퍼를 즉시 배치로 떼어내 전송 시작 (전송 완료가 아닌 시작 시점에 반환)
    pub async fn flush(&self) {
        if let Err(e) = self.request(|reply| Command::Flush { reply }).await {
            debug!("flush 무시: {e}");
        }
    }

    /// 버퍼를 전달 없이 비움
    ///
    /// # Returns
    /// 버린 레코드 수
    pub async fn clear_metrics(&self) -> usize {
        self.request(|reply| Command::Clear { reply })
            .await
            .unwrap_or(0)
    }

    pub async fn stats(&self) -> Result<PipelineStats, PulseError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// 파이프라인 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.inner.events.subscribe()
    }

    /// 타이머 중지, 마지막 flush, 전송 중 배치 대기(요청 타임아웃까지),
    /// 재시도 대기 배치는 소진 처리
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Shutdown { reply: Some(reply) }).is_ok() {
            let _ = rx.await;
        }
    }
}

/// # Panics
/// tokio 런타임 밖에서 호출하면 패닉
impl Default for PulseMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 설정 epoch별 세션
struct Session {
    config: PulseConfig,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    exhaustion: ExhaustionPolicy,
    token_store: Option<Arc<dyn TokenStore>>,
}

/// 파이프라인 상태를 독점하는 액터
struct PipelineActor {
    rx: mpsc::UnboundedReceiver<Command>,
    tx: mpsc::UnboundedSender<Command>,
    events: EventBus,
    factory: Arc<dyn TransportFactory>,
    session: Option<Session>,
    epoch: u64,
    buffer: BatchBuffer,
    credentials: CredentialPair,
    defaults: RecordDefaults,
    device: Option<MetadataValue>,
    in_flight: HashMap<Uuid, Batch>,
    awaiting_token: Vec<Batch>,
    /// 진행 중인 토큰 발급의 epoch
    token_fetch: Option<u64>,
    retry_waiting: HashMap<Uuid, Batch>,
    ticker: Option<Interval>,
    shutting_down: bool,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl PipelineActor {
    fn new(
        rx: mpsc::UnboundedReceiver<Command>,
        tx: mpsc::UnboundedSender<Command>,
        events: EventBus,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            rx,
            tx,
            events,
            factory,
            session: None,
            epoch: 0,
            buffer: BatchBuffer::new(UNCONFIGURED_BUFFER_CAPACITY),
            credentials: CredentialPair::default(),
            defaults: RecordDefaults::default(),
            device: None,
            in_flight: HashMap::new(),
            awaiting_token: Vec::new(),
            token_fetch: None,
            retry_waiting: HashMap::new(),
            ticker: None,
            shutting_down: false,
        }
    }

    async fn run(mut self) {
        debug!("매니저 액터 시작");
        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        let mut replies: Vec<_> = reply.into_iter().collect();
                        self.teardown(&mut replies).await;
                        for reply in replies {
                            let _ = reply.send(());
                        }
                        break;
                    }
                    Some(cmd) => self.handle(cmd).await,
                    None => {
                        self.teardown(&mut Vec::new()).await;
                        break;
                    }
                },
                _ = next_tick(&mut self.ticker) => self.flush_buffer("주기 타이머"),
            }
        }
        debug!("매니저 액터 종료");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Configure { config, reply } => {
                let result = if self.shutting_down {
                    Err(PulseError::ChannelClosed)
                } else {
                    self.configure(*config).await
                };
                if let Err(e) = &result {
                    error!("설정 적용 실패: {e}");
                }
                let _ = reply.send(result);
            }
            Command::Track(record) => self.enqueue(record),
            Command::TrackEvent {
                event_type,
                options,
            } => {
                let record = self.defaults.build(&event_type, options);
                self.enqueue(record);
            }
            Command::SetDefaultUserId(user_id) => self.defaults.user_id = user_id,
            Command::SetDefaultMetadata(metadata) => self.defaults.metadata = metadata,
            Command::Flush { reply } => {
                self.flush_buffer("명시적 flush");
                let _ = reply.send(());
            }
            Command::Clear { reply } => {
                let discarded = self.buffer.clear();
                info!("버퍼 비움: {discarded}개 레코드 폐기");
                let _ = reply.send(discarded);
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::SendFinished {
                batch_id,
                token,
                result,
            } => self.on_send_finished(batch_id, &token, result).await,
            Command::TokenFetched { epoch, result } => self.on_token_fetched(epoch, result).await,
            Command::RetryDue { batch_id } => {
                if let Some(batch) = self.retry_waiting.remove(&batch_id) {
                    debug!("배치 {} 재시도 (retry_count={})", batch.id, batch.retry_count);
                    self.dispatch(batch);
                }
            }
            // run/teardown에서 처리
            Command::Shutdown { .. } => {}
        }
    }

    async fn configure(&mut self, config: PulseConfig) -> Result<(), PulseError> {
        config.validate()?;
        let interval = config.batch_interval();
        let first_tick = Instant::now()
            .checked_add(interval)
            .ok_or_else(|| PulseError::Config(format!("flush 간격이 너무 큽니다: {interval:?}")))?;
        let transport = self.factory.build(&config)?;

        let (exhaustion, token_store) = if config.persist_metrics {
            match open_storage(&config).await {
                Ok((overflow, tokens)) => (
                    ExhaustionPolicy::Spill(overflow),
                    Some(tokens as Arc<dyn TokenStore>),
                ),
                Err(e) => {
                    error!("저장소 열기 실패, 버퍼 재삽입으로 동작: {e}");
                    (ExhaustionPolicy::Requeue, None)
                }
            }
        } else {
            (ExhaustionPolicy::Requeue, None)
        };

        let identity_changed = self.session.as_ref().is_some_and(|s| {
            s.config.token_url != config.token_url || s.config.app_credential != config.app_credential
        });
        if identity_changed {
            // 이전 자격증명으로 발급된 토큰은 메모리와 저장소 모두에서 폐기
            info!("앱 자격증명 변경, 기존 서비스 토큰 폐기");
            self.credentials = CredentialPair::default();
            if let Some(store) = &token_store {
                if let Err(e) = store.clear().await {
                    warn!("저장된 자격증명 삭제 실패: {e}");
                }
            }
        } else if let Some(store) = &token_store {
            match store.load().await {
                Ok(Some(pair)) => {
                    debug!("저장된 자격증명 사용 (서비스 토큰 유효: {})", pair.is_live());
                    self.credentials = pair;
                }
                Ok(None) => {}
                Err(e) => warn!("저장된 자격증명 로드 실패: {e}"),
            }
        }

        self.epoch += 1;
        let dropped = self.buffer.set_max_records(config.max_buffered_records);
        self.report_dropped(dropped);

        self.defaults.service_code = config.default_service_code.clone();
        self.defaults.device = if config.include_device_info {
            Some(
                self.device
                    .get_or_insert_with(|| DeviceInfo::collect().to_metadata())
                    .clone(),
            )
        } else {
            None
        };

        let mut ticker = tokio::time::interval_at(first_tick, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);

        info!(
            "설정 적용 (epoch {}): batch_size={}, interval={:?}, max_retries={}, 소진 처리={:?}",
            self.epoch, config.batch_size, interval, config.max_retries, exhaustion
        );

        let restore_from = match &exhaustion {
            ExhaustionPolicy::Spill(store) => Some(Arc::clone(store)),
            ExhaustionPolicy::Requeue => None,
        };
        let batch_size = config.batch_size;
        self.session = Some(Session {
            retry: RetryPolicy::from_config(&config),
            config,
            transport,
            exhaustion,
            token_store,
        });

        // 이전 세션의 토큰 발급 결과는 버리고 새 세션으로 다시 요청
        self.token_fetch = None;
        if !self.awaiting_token.is_empty() {
            self.ensure_token_fetch();
        }

        if let Some(store) = restore_from {
            self.restore(store).await;
        }

        self.events.publish(PipelineEvent::Configured { epoch: self.epoch });

        if self.buffer.reached(batch_size) {
            self.flush_buffer("배치 크기 도달");
        }
        Ok(())
    }

    async fn restore(&mut self, store: Arc<dyn OverflowStore>) {
        let restored = match store.load_all().await {
            Ok(r) => r,
            Err(e) => {
                error!("저장된 배치 복원 실패: {e}");
                return;
            }
        };

        if !restored.files_skipped.is_empty() {
            warn!("손상된 배치 파일 {}개 보존", restored.files_skipped.len());
        }
        if restored.records.is_empty() {
            return;
        }

        let count = restored.records.len();
        let mut dropped = 0;
        for record in restored.records {
            dropped += self.buffer.append(record);
        }
        self.report_dropped(dropped);

        info!(
            "디스크에서 레코드 {count}개 복원 (파일 {}개)",
            restored.files_loaded
        );
        self.events.publish(PipelineEvent::RecordsRestored {
            records: count,
            files: restored.files_loaded,
        });
    }

    fn enqueue(&mut self, record: MetricRecord) {
        if self.shutting_down {
            debug!("종료 중, 레코드 무시: {}", record.event_type);
            return;
        }
        let Some(session) = &self.session else {
            warn!("{}, 레코드 무시: {}", PulseError::ConfigurationMissing, record.event_type);
            return;
        };
        let batch_size = session.config.batch_size;

        let dropped = self.buffer.append(record);
        self.report_dropped(dropped);

        if self.buffer.reached(batch_size) {
            self.flush_buffer("배치 크기 도달");
        }
    }

    fn flush_buffer(&mut self, reason: &str) {
        if self.shutting_down || self.session.is_none() || self.buffer.is_empty() {
            return;
        }
        let batch = Batch::new(self.buffer.drain_all());
        debug!("flush ({reason}): 배치 {} ({}개 레코드)", batch.id, batch.len());
        self.dispatch(batch);
    }

    fn dispatch(&mut self, batch: Batch) {
        let transport = match &self.session {
            Some(s) => Arc::clone(&s.transport),
            None => {
                warn!("전송 세션 없음, 배치 {} 버퍼로 재삽입", batch.id);
                self.requeue(batch);
                return;
            }
        };

        match self.credentials.service_token().map(str::to_string) {
            Some(token) => self.start_send(transport, token, batch),
            None => {
                debug!("배치 {} 서비스 토큰 대기", batch.id);
                self.awaiting_token.push(batch);
                self.ensure_token_fetch();
            }
        }
    }

    fn start_send(&mut self, transport: Arc<dyn Transport>, token: String, batch: Batch) {
        let batch_id = batch.id;
        let records = batch.records.clone();
        debug!(
            batch_id = %batch_id,
            retry_count = batch.retry_count,
            "배치 전송 시작 ({}개 레코드)",
            records.len()
        );
        self.in_flight.insert(batch_id, batch);

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = transport.send_batch(&token, &records).await;
            let _ = tx.send(Command::SendFinished {
                batch_id,
                token,
                result,
            });
        });
    }

    /// 발급이 진행 중이 아니면 시작 (대기 배치는 한 번의 발급을 공유)
    fn ensure_token_fetch(&mut self) {
        if self.token_fetch.is_some() {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let transport = Arc::clone(&session.transport);
        let epoch = self.epoch;
        self.token_fetch = Some(epoch);
        debug!("서비스 토큰 발급 요청");

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = transport.fetch_token().await;
            let _ = tx.send(Command::TokenFetched { epoch, result });
        });
    }

    async fn on_token_fetched(&mut self, epoch: u64, result: Result<CredentialPair, PulseError>) {
        if self.token_fetch != Some(epoch) {
            debug!("이전 설정의 토큰 응답 무시 (epoch {epoch})");
            return;
        }
        self.token_fetch = None;
        let waiting = std::mem::take(&mut self.awaiting_token);

        let result = result.and_then(|pair| {
            if pair.is_live() {
                Ok(pair)
            } else {
                Err(PulseError::Decoding("빈 서비스 토큰".to_string()))
            }
        });

        match result {
            Ok(pair) => {
                info!("서비스 토큰 발급 완료, 대기 배치 {}개 전송", waiting.len());
                self.credentials = pair;
                self.save_credentials().await;
                self.events.publish(PipelineEvent::TokenRefreshed);
                for batch in waiting {
                    self.dispatch(batch);
                }
            }
            Err(e) => {
                warn!("서비스 토큰 발급 실패: {e}");
                for batch in waiting {
                    match self.retry_policy() {
                        Some(policy) => self.apply(policy.after_failure(batch)).await,
                        None => self.requeue(batch),
                    }
                }
            }
        }
    }

    async fn on_send_finished(
        &mut self,
        batch_id: Uuid,
        token: &str,
        result: Result<(), PulseError>,
    ) {
        let Some(batch) = self.in_flight.remove(&batch_id) else {
            return;
        };

        let err = match result {
            Ok(()) => {
                info!("배치 전송 성공: {} ({}개 레코드)", batch.id, batch.len());
                self.events.publish(PipelineEvent::BatchDelivered {
                    batch_id,
                    records: batch.len(),
                });
                return;
            }
            Err(e) => e,
        };

        warn!(
            batch_id = %batch_id,
            retry_count = batch.retry_count,
            "배치 전송 실패: {err}"
        );
        if err.is_unauthorized() {
            self.invalidate_token(token).await;
        }

        match self.retry_policy() {
            Some(policy) => self.apply(policy.after_send_error(batch, &err)).await,
            None => self.requeue(batch),
        }
    }

    /// 실패한 요청에 쓰인 토큰이 아직 살아 있으면 무효화
    async fn invalidate_token(&mut self, token: &str) {
        if self.credentials.service_token() != Some(token) {
            return;
        }
        info!("서비스 토큰 무효화 (401)");
        self.credentials.invalidate();
        self.save_credentials().await;
        self.events.publish(PipelineEvent::TokenInvalidated);
    }

    async fn save_credentials(&self) {
        let Some(store) = self.session.as_ref().and_then(|s| s.token_store.clone()) else {
            return;
        };
        if let Err(e) = store.save(&self.credentials).await {
            error!("자격증명 저장 실패: {e}");
        }
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        self.session.as_ref().map(|s| s.retry)
    }

    async fn apply(&mut self, decision: Decision) {
        match decision {
            Decision::Refetch(batch) if !self.shutting_down => self.dispatch(batch),
            Decision::Retry { batch, delay } if !self.shutting_down => {
                self.schedule_retry(batch, delay)
            }
            // 종료 중에는 재시도 없이 소진 처리
            Decision::Refetch(batch) | Decision::Retry { batch, .. } | Decision::Exhausted(batch) => {
                self.exhaust(batch).await
            }
        }
    }

    fn schedule_retry(&mut self, batch: Batch, delay: Duration) {
        let batch_id = batch.id;
        info!(
            batch_id = %batch_id,
            retry_count = batch.retry_count,
            "배치 재시도 예약: {:?} 후",
            delay
        );
        self.events.publish(PipelineEvent::RetryScheduled {
            batch_id,
            retry_count: batch.retry_count,
            delay,
        });
        self.retry_waiting.insert(batch_id, batch);

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::RetryDue { batch_id });
        });
    }

    async fn exhaust(&mut self, batch: Batch) {
        let policy = self
            .session
            .as_ref()
            .map(|s| s.exhaustion.clone())
            .unwrap_or(ExhaustionPolicy::Requeue);

        match policy.resolve(batch).await {
            ExhaustionOutcome::Spilled { batch, path } => {
                self.events.publish(PipelineEvent::BatchSpilled {
                    batch_id: batch.id,
                    records: batch.len(),
                    path,
                });
            }
            ExhaustionOutcome::Requeue(batch) => self.requeue(batch),
        }
    }

    fn requeue(&mut self, batch: Batch) {
        let batch_id = batch.id;
        let records = batch.len();
        let dropped = self.buffer.prepend(batch.into_records());
        self.events
            .publish(PipelineEvent::BatchRequeued { batch_id, records });
        self.report_dropped(dropped);
    }

    fn report_dropped(&self, dropped: usize) {
        if dropped == 0 {
            return;
        }
        warn!(
            "버퍼 용량({}) 초과, 오래된 레코드 {dropped}개 폐기",
            self.buffer.max_records()
        );
        self.events
            .publish(PipelineEvent::RecordsDropped { count: dropped });
    }

    fn stats(&self) -> PipelineStats {
        PipelineStats {
            configured: self.session.is_some(),
            epoch: self.epoch,
            buffered: self.buffer.len(),
            in_flight: self.in_flight.len(),
            awaiting_token: self.awaiting_token.len(),
            waiting_retry: self.retry_waiting.len(),
            token_live: self.credentials.is_live(),
        }
    }

    async fn teardown(&mut self, replies: &mut Vec<oneshot::Sender<()>>) {
        info!("매니저 종료 시작");
        self.ticker = None;
        self.flush_buffer("종료");
        self.shutting_down = true;

        let waiting: Vec<Batch> = self.retry_waiting.drain().map(|(_, b)| b).collect();
        for batch in waiting {
            self.exhaust(batch).await;
        }

        let timeout = self
            .session
            .as_ref()
            .map(|s| s.config.request_timeout())
            .unwrap_or(Duration::ZERO);
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now);

        while !self.in_flight.is_empty() || !self.awaiting_token.is_empty() {
            let next = tokio::time::timeout_at(deadline, self.rx.recv()).await;
            match next {
                Ok(Some(Command::Shutdown { reply })) => replies.extend(reply),
                Ok(Some(cmd)) => self.handle(cmd).await,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "종료 대기 시간 초과: 전송 중 {}개, 토큰 대기 {}개",
                        self.in_flight.len(),
                        self.awaiting_token.len()
                    );
                    break;
                }
            }
        }

        let leftovers: Vec<Batch> = self
            .in_flight
            .drain()
            .map(|(_, b)| b)
            .chain(self.awaiting_token.drain(..))
            .collect();
        for batch in leftovers {
            self.exhaust(batch).await;
        }

        if !self.buffer.is_empty() {
            warn!("종료 시 전달되지 못한 레코드 {}개 폐기", self.buffer.len());
        }
        info!("매니저 종료 완료");
    }
}

async fn open_storage(
    config: &PulseConfig,
) -> Result<(Arc<FileOverflowStore>, Arc<FileTokenStore>), PulseError> {
    let dir = config.resolve_storage_dir()?;
    let overflow = FileOverflowStore::open(dir.clone(), config.max_storage_bytes).await?;
    let tokens = FileTokenStore::open(&dir).await?;
    Ok((Arc::new(overflow), Arc::new(tokens)))
}
