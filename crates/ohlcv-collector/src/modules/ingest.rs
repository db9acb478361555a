//! 일 단위 수집 단계.

use chrono::NaiveDate;
use ohlcv_core::Symbol;
use ohlcv_ingest::{
    CredentialManager, FyersClient, HistoryFetcher, HistorySource, IngestionOrchestrator,
    RateLimiter, RunReport, TokenRefresher,
};
use ohlcv_storage::{load_symbols, parse_symbol_list, FileCredentialStore, ObjectStore};
use std::sync::Arc;

use crate::{CollectorConfig, Result};

/// 모든 심볼 성공.
pub const EXIT_OK: u8 = 0;
/// 하나 이상 데드레터.
pub const EXIT_DEAD_LETTERS: u8 = 2;
/// 자격증명 갱신 실패로 중단.
pub const EXIT_FATAL: u8 = 3;

/// 쉼표로 구분된 CLI 심볼 목록 파싱 (예: "NSE:TCS-EQ,INFY-EQ")
pub fn parse_cli_symbols(list: &str, default_exchange: &str) -> Vec<Symbol> {
    let lines = list.split(',').collect::<Vec<_>>().join("\n");
    parse_symbol_list(&lines, default_exchange)
}

/// 수집 대상 심볼 결정 (CLI 목록 우선, 없으면 심볼 파일)
pub async fn resolve_symbols(config: &CollectorConfig, cli_symbols: Option<&str>) -> Result<Vec<Symbol>> {
    match cli_symbols {
        Some(list) => {
            let symbols = parse_cli_symbols(list, &config.ingest.default_exchange);
            tracing::info!(count = symbols.len(), "CLI 심볼 목록 사용");
            Ok(symbols)
        }
        None => Ok(load_symbols(&config.ingest.symbols_path, &config.ingest.default_exchange).await?),
    }
}

/// 설정값으로 수집 파이프라인을 조립합니다.
pub fn build_orchestrator(
    config: &CollectorConfig,
    source: Arc<dyn HistorySource>,
    credentials: Arc<CredentialManager>,
    store: Arc<dyn ObjectStore>,
) -> IngestionOrchestrator {
    let limiter = Arc::new(RateLimiter::new(config.rate_limiter()));
    let fetcher = HistoryFetcher::new(source, limiter, credentials, config.retry_policy())
        .with_namespace(config.ingest.metrics_namespace.clone());

    IngestionOrchestrator::new(Arc::new(fetcher), store, config.layout(), config.orchestrator())
}

/// 실제 업스트림 API로 하루치 수집을 실행합니다.
pub async fn run_ingest(
    config: &CollectorConfig,
    date: NaiveDate,
    cli_symbols: Option<&str>,
) -> Result<RunReport> {
    let symbols = resolve_symbols(config, cli_symbols).await?;
    if symbols.is_empty() {
        tracing::warn!("수집할 심볼이 없습니다");
    }

    let client = Arc::new(FyersClient::new(config.client())?);
    let refresher: Arc<dyn TokenRefresher> = client.clone();
    let credential_store = Arc::new(FileCredentialStore::new(&config.ingest.credentials_path));
    let credentials = CredentialManager::load(credential_store, refresher)
        .await?
        .with_namespace(config.ingest.metrics_namespace.clone());

    let orchestrator = build_orchestrator(
        config,
        client,
        Arc::new(credentials),
        super::local_store(config),
    );

    tracing::info!(
        date = %date,
        symbols = symbols.len(),
        max_concurrency = config.ingest.max_concurrency,
        max_per_sec = config.rate_limit.max_per_sec,
        max_per_min = config.rate_limit.max_per_min,
        "수집 시작"
    );
    Ok(orchestrator.run(&symbols, date).await)
}

/// 실행 결과를 프로세스 종료 코드로 변환합니다.
pub fn exit_code(report: &RunReport) -> u8 {
    if report.fatal.is_some() {
        EXIT_FATAL
    } else if report.dead_lettered > 0 || report.worker_panics > 0 || !report.aborted.is_empty() {
        EXIT_DEAD_LETTERS
    } else {
        EXIT_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ohlcv_core::ErrorClass;

    #[test]
    fn test_parse_cli_symbols() {
        let symbols = parse_cli_symbols("NSE:TCS-EQ, INFY-EQ,,BSE:SENSEX,NSE:TCS-EQ", "NSE");
        assert_eq!(
            symbols,
            vec![
                Symbol::new("NSE", "TCS-EQ"),
                Symbol::new("NSE", "INFY-EQ"),
                Symbol::new("BSE", "SENSEX"),
            ]
        );
    }

    #[test]
    fn test_exit_codes() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let mut report = RunReport::new(date, 2);
        report.record_success(10);
        report.record_success(10);
        assert_eq!(exit_code(&report), EXIT_OK);

        report.record_dead_letter(ErrorClass::Permanent);
        assert_eq!(exit_code(&report), EXIT_DEAD_LETTERS);

        report.fatal = Some("refresh rejected".to_string());
        assert_eq!(exit_code(&report), EXIT_FATAL);
    }
}
