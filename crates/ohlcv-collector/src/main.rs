//! Standalone OHLCV collector CLI.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ohlcv_collector::modules::{self, ingest::EXIT_OK};
use ohlcv_collector::{CollectorConfig, Result};
use ohlcv_core::{init_logging, LogConfig};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ohlcv-collector")]
#[command(about = "OHLCV ingestion and aggregation pipeline", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error). RUST_LOG가 있으면 무시
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 하루치 1분봉 수집
    Ingest {
        /// 대상 날짜 (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// 특정 심볼만 수집 (쉼표로 구분, 예: "NSE:TCS-EQ,INFY-EQ")
        #[arg(long)]
        symbols: Option<String>,
    },

    /// 하루치 원시 배치 집계 (1m/5m/15m/1d)
    Aggregate {
        /// 대상 날짜 (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// 전체 워크플로우 실행 (수집 → 집계)
    RunAll {
        /// 대상 날짜 (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// 데몬 모드: 주기적으로 전체 워크플로우 실행
    Daemon,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let fallback = format!(
        "ohlcv_collector={lvl},ohlcv_ingest={lvl},ohlcv_aggregate={lvl},ohlcv_storage={lvl}",
        lvl = cli.log_level
    );
    if let Err(e) = init_logging(LogConfig::from_env(&fallback)) {
        eprintln!("로깅 초기화 실패: {}", e);
    }

    tracing::info!("OHLCV Collector 시작");

    let code = match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "실행 실패");
            1
        }
    };

    tracing::info!(exit_code = code, "OHLCV Collector 종료");
    ExitCode::from(code)
}

async fn run(command: Commands) -> Result<u8> {
    let config = CollectorConfig::from_env()?;
    tracing::debug!(
        storage_root = %config.storage.root.display(),
        timezone = %config.market_timezone,
        "설정 로드 완료"
    );

    match command {
        Commands::Ingest { date, symbols } => {
            let date = config.resolve_date(date);
            let report = modules::run_ingest(&config, date, symbols.as_deref()).await?;
            report.log_summary();
            Ok(modules::exit_code(&report))
        }
        Commands::Aggregate { date } => {
            let date = config.resolve_date(date);
            let report = modules::run_aggregate(&config, date).await?;
            report.log_summary();
            Ok(EXIT_OK)
        }
        Commands::RunAll { date } => {
            let date = config.resolve_date(date);
            run_workflow(&config, date).await
        }
        Commands::Daemon => {
            tracing::info!(
                "=== 데몬 모드 시작 (주기: {}분) ===",
                config.daemon.interval_minutes
            );

            let mut interval = tokio::time::interval(config.daemon.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("종료 신호 수신, 데몬 종료 중...");
                        break;
                    }
                    _ = interval.tick() => {
                        let date = config.resolve_date(None);
                        match run_workflow(&config, date).await {
                            Ok(code) => tracing::info!(
                                exit_code = code,
                                "=== 워크플로우 완료, 다음 실행: {}분 후 ===",
                                config.daemon.interval_minutes
                            ),
                            Err(e) => tracing::error!("워크플로우 실패: {}", e),
                        }
                    }
                }
            }

            Ok(EXIT_OK)
        }
    }
}

/// 수집 후 집계. 자격증명 갱신 실패로 중단된 실행은 집계하지 않습니다.
async fn run_workflow(config: &CollectorConfig, date: NaiveDate) -> Result<u8> {
    tracing::info!(date = %date, "=== 전체 워크플로우 시작 ===");

    tracing::info!("Step 1/2: 수집");
    let ingest = modules::run_ingest(config, date, None).await?;
    ingest.log_summary();
    let code = modules::exit_code(&ingest);

    if let Some(err) = ingest.fatal_error() {
        tracing::error!(error = %err, "수집 중단, 집계 건너뜀");
        return Ok(code);
    }

    tracing::info!("Step 2/2: 집계");
    let aggregate = modules::run_aggregate(config, date).await?;
    aggregate.log_summary();

    tracing::info!("=== 전체 워크플로우 완료 ===");
    Ok(code)
}
