//! # pulse-cli
//!
//! Pulse 메트릭 파이프라인 바이너리.
//! 설정 파일 관리, 단발성 이벤트 전송, 저장된 배치 재전송, 저장소 상태 확인.

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use pulse_client::event_bus::PipelineEvent;
use pulse_client::{PulseMetrics, TrackOptions};
use pulse_core::config::PulseConfig;
use pulse_core::config_manager::ConfigManager;
use pulse_core::log_level::PulseLogLevel;
use pulse_core::models::metadata::MetadataValue;
use pulse_core::ports::storage::OverflowStore;
use pulse_storage::overflow_store::FileOverflowStore;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pulse 메트릭 CLI
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리의 pulse.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 수집 서버 URL
    #[arg(long)]
    base_url: Option<String>,

    /// 서비스 토큰 발급 URL
    #[arg(long)]
    token_url: Option<String>,

    /// 앱 자격증명
    #[arg(long, env = "PULSE_APP_CREDENTIAL", hide_env_values = true)]
    credential: Option<String>,

    /// 오버플로 저장소 경로
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// 로그 레벨 (none, error, warning, info, debug, verbose)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: PulseLogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 설정 파일 생성 (이미 있으면 로드만)
    Init,
    /// 이벤트 전송
    Track {
        /// 이벤트 유형
        event_type: String,
        #[arg(long)]
        sub_type: Option<String>,
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        user: Option<String>,
        /// 메타데이터 key=value (값은 JSON으로 해석, 실패 시 문자열)
        #[arg(long = "meta", short = 'm', value_parser = parse_metadata)]
        metadata: Vec<(String, MetadataValue)>,
        /// 같은 이벤트 반복 횟수
        #[arg(long, default_value = "1")]
        count: usize,
    },
    /// 저장된 배치를 복원해 재전송
    Drain,
    /// 설정과 저장소 상태 출력
    Status,
}

/// `key=value` 메타데이터 파싱
fn parse_metadata(s: &str) -> Result<(String, MetadataValue), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("key=value 형식이 아닙니다: {s}"))?;
    if key.is_empty() {
        return Err(format!("빈 키: {s}"));
    }
    let value = serde_json::from_str::<MetadataValue>(raw)
        .unwrap_or_else(|_| MetadataValue::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn config_path(args: &Args) -> Result<PathBuf> {
    match &args.config {
        Some(path) => Ok(path.clone()),
        None => Ok(ConfigManager::default_config_path()?),
    }
}

/// CLI 인자로 설정 오버라이드
fn apply_overrides(config: &mut PulseConfig, args: &Args) {
    if let Some(url) = &args.base_url {
        config.base_url = url.clone();
    }
    if let Some(url) = &args.token_url {
        config.token_url = url.clone();
    }
    if let Some(credential) = &args.credential {
        config.app_credential = credential.clone();
    }
    if let Some(dir) = &args.storage_dir {
        config.storage_dir = Some(dir.clone());
    }
}

/// 인자만으로 설정 생성 (URL/자격증명 필수)
fn config_from_args(args: &Args) -> Option<PulseConfig> {
    match (&args.base_url, &args.token_url, &args.credential) {
        (Some(base), Some(token), Some(credential)) => {
            let mut config = PulseConfig::new(base, token, credential);
            apply_overrides(&mut config, args);
            Some(config)
        }
        _ => None,
    }
}

fn load_config(args: &Args) -> Result<PulseConfig> {
    let path = config_path(args)?;
    let config = if path.exists() {
        let mut config = ConfigManager::with_path(path)?.get();
        apply_overrides(&mut config, args);
        config
    } else {
        config_from_args(args).ok_or_else(|| {
            anyhow!(
                "설정 파일이 없습니다: {} (pulse init 또는 --base-url/--token-url/--credential 지정)",
                path.display()
            )
        })?
    };
    config.validate()?;
    Ok(config)
}

/// 종료 후 이벤트 집계
#[derive(Debug, Default)]
struct RunSummary {
    delivered: usize,
    spilled: usize,
    requeued: usize,
    restored: usize,
}

impl RunSummary {
    fn collect(rx: &mut broadcast::Receiver<PipelineEvent>) -> Self {
        let mut summary = Self::default();
        while let Ok(event) = rx.try_recv() {
            match event {
                PipelineEvent::BatchDelivered { records, .. } => summary.delivered += records,
                PipelineEvent::BatchSpilled { records, .. } => summary.spilled += records,
                PipelineEvent::BatchRequeued { records, .. } => summary.requeued += records,
                PipelineEvent::RecordsRestored { records, .. } => summary.restored += records,
                _ => {}
            }
        }
        summary
    }
}

async fn run_pipeline(config: PulseConfig, log_level: PulseLogLevel, command: &Command) -> Result<RunSummary> {
    let metrics = PulseMetrics::new();
    metrics.set_log_level(log_level);
    let mut rx = metrics.subscribe();
    metrics.configure(config).await?;

    if let Command::Track {
        event_type,
        sub_type,
        service,
        user,
        metadata,
        count,
    } = command
    {
        for _ in 0..*count {
            let mut options = TrackOptions::new();
            options.event_sub_type = sub_type.clone();
            options.service_code = service.clone();
            options.user_id = user.clone();
            options.metadata = metadata.iter().cloned().collect();
            metrics.track_event(event_type.as_str(), options);
        }
        info!("이벤트 {count}개 추가: {event_type}");
    }

    metrics.flush().await;
    metrics.shutdown().await;
    Ok(RunSummary::collect(&mut rx))
}

async fn print_status(config: &PulseConfig, path: &std::path::Path) -> Result<()> {
    println!("설정 파일: {}", path.display());
    println!("수집 URL: {}", config.track_url());
    println!("토큰 URL: {}", config.token_url);
    println!(
        "배치: {}개 / {}초, 재시도 {}회 (기본 지연 {}초)",
        config.batch_size, config.batch_interval_secs, config.max_retries, config.base_retry_delay_secs
    );

    if !config.persist_metrics {
        println!("오버플로 저장소: 비활성화");
        return Ok(());
    }
    let dir = config.resolve_storage_dir()?;
    let store = FileOverflowStore::open(dir.clone(), config.max_storage_bytes).await?;
    let files = store.list().await?;
    println!(
        "오버플로 저장소: {} (배치 {}개, {} / {} bytes)",
        dir.display(),
        files.len(),
        store.total_size().await?,
        config.max_storage_bytes
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // tracing 초기화
    let level = args.log_level.as_directive();
    let log_filter = format!(
        "pulse_cli={level},pulse_client={level},pulse_core={level},pulse_network={level},pulse_storage={level}"
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    match &args.command {
        Command::Init => {
            let path = config_path(&args)?;
            let initial = match config_from_args(&args) {
                Some(config) => config,
                None if path.exists() => ConfigManager::with_path(path.clone())?.get(),
                None => bail!("새 설정에는 --base-url, --token-url, --credential이 필요합니다"),
            };
            initial.validate()?;
            let manager = ConfigManager::init(path, initial)?;
            println!("설정 파일: {}", manager.config_path().display());
        }
        Command::Status => {
            let config = load_config(&args)?;
            print_status(&config, &config_path(&args)?).await?;
        }
        command @ (Command::Track { .. } | Command::Drain) => {
            let config = load_config(&args)?;
            info!("수집 서버: {}", config.base_url);

            let summary = run_pipeline(config, args.log_level, command).await?;
            println!(
                "전송 {}개, 디스크 저장 {}개, 재삽입 {}개 (복원 {}개)",
                summary.delivered, summary.spilled, summary.requeued, summary.restored
            );
        }
    }

    Ok(())
}
