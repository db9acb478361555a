//! 수집 실행 오케스트레이터.
//!
//! 심볼마다 수집 단위 하나를 만들어 `max_concurrency`개까지 병렬로 처리합니다.
//! 모든 심볼은 정확히 하나의 종료 결과(원시 배치 또는 데드레터)를 가지며,
//! 토큰 갱신이 실패하면 새 단위 스케줄링을 멈추고 진행 중인 단위만 마무리합니다.

use chrono::{NaiveDate, Utc};
use ohlcv_core::{
    DeadLetterParams, DeadLetterRecord, ErrorClass, FetchUnit, RawBatch, Symbol,
};
use ohlcv_storage::{ObjectStore, StorageLayout};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::fetcher::{FetchOutcome, HistoryFetcher};
use crate::stats::RunReport;
use crate::telemetry;

/// 업스트림 요청 해상도 (1분).
const RESOLUTION: &str = "1";

/// 오케스트레이터 설정.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 동시에 처리할 수집 단위 수
    pub max_concurrency: usize,
    /// 원시 배치에 붙일 태그
    pub tags: Option<String>,
    /// 메트릭 네임스페이스
    pub namespace: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 6,
            tags: None,
            namespace: telemetry::DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// 수집 단위 하나의 종료 결과.
#[derive(Debug, Clone)]
enum UnitResult {
    Stored {
        candles: usize,
    },
    DeadLettered {
        class: ErrorClass,
        detail: String,
        persisted: bool,
    },
}

/// 워커가 공유하는 핸들 묶음.
#[derive(Clone)]
struct UnitWorker {
    fetcher: Arc<HistoryFetcher>,
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
    tags: Option<String>,
    namespace: String,
}

impl UnitWorker {
    async fn process(&self, unit: FetchUnit) -> UnitResult {
        match self.fetcher.fetch(&unit).await {
            FetchOutcome::Success { payload, attempts } => {
                let batch = RawBatch::new(&unit, Utc::now(), payload, self.tags.clone());
                let candles = batch.history.len();
                match self.write_raw(&batch).await {
                    Ok(key) => {
                        telemetry::record_success(&self.namespace);
                        tracing::info!(key = %key, candles, attempts, "원시 배치 저장");
                        UnitResult::Stored { candles }
                    }
                    Err(detail) => {
                        tracing::error!(error = %detail, "원시 배치 저장 실패");
                        self.dead_letter(&unit, ErrorClass::Storage, attempts, detail)
                            .await
                    }
                }
            }
            FetchOutcome::Failed {
                class,
                attempts,
                detail,
            } => self.dead_letter(&unit, class, attempts, detail).await,
        }
    }

    async fn write_raw(&self, batch: &RawBatch) -> Result<String, String> {
        let key = self
            .layout
            .raw_key(&batch.symbol, batch.range_from, batch.ingested_at);
        let body = serde_json::to_vec(batch).map_err(|e| e.to_string())?;
        self.store
            .put(&key, body)
            .await
            .map_err(|e| e.to_string())?;
        Ok(key)
    }

    async fn dead_letter(
        &self,
        unit: &FetchUnit,
        class: ErrorClass,
        attempts: u32,
        detail: String,
    ) -> UnitResult {
        telemetry::record_failure(&self.namespace, class);

        let record = DeadLetterRecord {
            symbol: unit.symbol.clone(),
            class,
            attempts,
            failed_at: Utc::now(),
            detail: detail.clone(),
            params: DeadLetterParams {
                range_from: unit.range_from,
                range_to: unit.range_to,
                resolution: RESOLUTION.to_string(),
            },
        };
        let key = self
            .layout
            .dead_letter_key(&unit.symbol, unit.range_from, record.failed_at);

        let persisted = match serde_json::to_vec(&record) {
            Ok(body) => match self.store.put(&key, body).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "데드레터 기록 실패");
                    false
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "데드레터 직렬화 실패");
                false
            }
        };

        tracing::warn!(class = %class, attempts, key = %key, "데드레터 처리");
        UnitResult::DeadLettered {
            class,
            detail,
            persisted,
        }
    }
}

/// 수집 오케스트레이터.
pub struct IngestionOrchestrator {
    worker: UnitWorker,
    max_concurrency: usize,
}

impl IngestionOrchestrator {
    pub fn new(
        fetcher: Arc<HistoryFetcher>,
        store: Arc<dyn ObjectStore>,
        layout: StorageLayout,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            worker: UnitWorker {
                fetcher,
                store,
                layout,
                tags: config.tags.filter(|t| !t.is_empty()),
                namespace: config.namespace,
            },
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// 심볼 목록을 대상 날짜로 수집합니다.
    ///
    /// 중복 심볼은 첫 번째만 처리합니다.
    pub async fn run(&self, symbols: &[Symbol], date: NaiveDate) -> RunReport {
        let started = Instant::now();

        let mut seen = HashSet::new();
        let units: Vec<FetchUnit> = symbols
            .iter()
            .filter(|s| seen.insert((*s).clone()))
            .map(|s| FetchUnit::for_day(s.clone(), date))
            .collect();

        let mut report = RunReport::new(date, units.len());
        tracing::info!(
            date = %date,
            symbols = units.len(),
            max_concurrency = self.max_concurrency,
            "수집 시작"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        // 패닉한 작업도 데드레터로 남기기 위한 작업 ID → 수집 단위
        let mut in_flight = HashMap::new();

        for unit in units {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit.filter(|_| !cancel.is_cancelled()) else {
                report.aborted.push(unit.symbol);
                continue;
            };

            let worker = self.worker.clone();
            let cancel = cancel.clone();
            let span = tracing::info_span!("fetch", symbol = %unit.symbol);
            let tracked = unit.clone();
            let handle = tasks.spawn(
                async move {
                    let result = worker.process(unit).await;
                    if let UnitResult::DeadLettered { class, .. } = &result {
                        if class.is_fatal() {
                            cancel.cancel();
                        }
                    }
                    drop(permit);
                    result
                }
                .instrument(span),
            );
            in_flight.insert(handle.id(), tracked);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let result = match joined {
                Ok((id, result)) => {
                    in_flight.remove(&id);
                    result
                }
                Err(e) => {
                    report.worker_panics += 1;
                    let Some(unit) = in_flight.remove(&e.id()) else {
                        tracing::error!(error = %e, "수집 워커 비정상 종료 (단위 정보 없음)");
                        continue;
                    };
                    tracing::error!(symbol = %unit.symbol, error = %e, "수집 워커 비정상 종료");
                    self.worker
                        .dead_letter(&unit, ErrorClass::WorkerPanic, 0, e.to_string())
                        .await
                }
            };

            match result {
                UnitResult::Stored { candles } => report.record_success(candles),
                UnitResult::DeadLettered {
                    class,
                    detail,
                    persisted,
                } => {
                    report.record_dead_letter(class);
                    if !persisted {
                        report.dead_letter_write_failures += 1;
                    }
                    if class.is_fatal() && report.fatal.is_none() {
                        tracing::error!(reason = %detail, "토큰 갱신 실패, 새 수집 중단");
                        report.fatal = Some(detail);
                    }
                }
            }
        }

        if !report.aborted.is_empty() {
            telemetry::record_aborted(&self.worker.namespace, report.aborted.len() as u64);
        }
        report.refreshes = self.worker.fetcher.credentials().refresh_count();
        report.elapsed = started.elapsed();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::{sample_credentials, CountingRefresher};
    use crate::credentials::CredentialManager;
    use crate::error::FetchError;
    use crate::client::{FyersClient, FyersClientConfig};
    use crate::credentials::AccessToken;
    use crate::fetcher::tests::{fast_policy, payload, ScriptedSource};
    use crate::fetcher::HistorySource;
    use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use ohlcv_core::HistoryPayload;
    use std::time::Duration;
    use crate::stats::RunStatus;
    use ohlcv_storage::{MemoryCredentialStore, MemoryObjectStore};

    struct Harness {
        orchestrator: IngestionOrchestrator,
        store: Arc<MemoryObjectStore>,
        refresher: Arc<CountingRefresher>,
    }

    fn harness(
        source: Arc<dyn HistorySource>,
        refresher: CountingRefresher,
        store: MemoryObjectStore,
        max_concurrency: usize,
    ) -> Harness {
        harness_with_policy(source, refresher, store, max_concurrency, fast_policy())
    }

    fn harness_with_policy(
        source: Arc<dyn HistorySource>,
        refresher: CountingRefresher,
        store: MemoryObjectStore,
        max_concurrency: usize,
        policy: RetryPolicy,
    ) -> Harness {
        let refresher = Arc::new(refresher);
        let store = Arc::new(store);
        let credentials = Arc::new(CredentialManager::new(
            sample_credentials(),
            refresher.clone(),
            Arc::new(MemoryCredentialStore::new(sample_credentials())),
        ));
        let fetcher = Arc::new(HistoryFetcher::new(
            source,
            Arc::new(RateLimiter::new(RateLimiterConfig::default())),
            credentials,
            policy,
        ));
        let orchestrator = IngestionOrchestrator::new(
            fetcher,
            store.clone(),
            StorageLayout::default(),
            OrchestratorConfig {
                max_concurrency,
                ..OrchestratorConfig::default()
            },
        );
        Harness {
            orchestrator,
            store,
            refresher,
        }
    }

    fn symbols(tickers: &[&str]) -> Vec<Symbol> {
        tickers.iter().map(|t| Symbol::new("NSE", *t)).collect()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    async fn dead_letters(store: &MemoryObjectStore) -> Vec<DeadLetterRecord> {
        let mut records = Vec::new();
        for meta in store.list("errors/").await.unwrap() {
            let body = store.get(&meta.key).await.unwrap();
            records.push(serde_json::from_slice(&body).unwrap());
        }
        records
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_symbol_has_one_terminal_outcome() {
        let source = Arc::new(ScriptedSource::new());
        source
            .script(
                "NSE:BAD-EQ",
                vec![Err(FetchError::Permanent("invalid symbol".into()))],
            )
            .await;
        source
            .script(
                "NSE:INFY-EQ",
                vec![Err(FetchError::Transient("reset".into())), Ok(payload(5))],
            )
            .await;

        let h = harness(
            source,
            CountingRefresher::ok(),
            MemoryObjectStore::new(),
            3,
        );
        let report = h
            .orchestrator
            .run(
                &symbols(&["TCS-EQ", "INFY-EQ", "BAD-EQ", "SBIN-EQ", "WIPRO-EQ"]),
                date(),
            )
            .await;

        assert_eq!(report.total, 5);
        assert_eq!(report.succeeded, 4);
        assert_eq!(report.dead_lettered, 1);
        assert_eq!(report.succeeded + report.dead_lettered, report.total);
        assert_eq!(report.total_candles, 3 * 3 + 5);
        assert_eq!(report.status(), RunStatus::CompletedWithFailures);

        assert_eq!(h.store.list("raw/").await.unwrap().len(), 4);
        let records = dead_letters(&h.store).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, Symbol::new("NSE", "BAD-EQ"));
        assert_eq!(records[0].class, ErrorClass::Permanent);
        assert_eq!(records[0].attempts, 1);
        assert_eq!(records[0].params.resolution, "1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_auth_expiry_refreshes_once() {
        let source = Arc::new(ScriptedSource::requiring_token("access-2"));
        let tickers: Vec<String> = (0..10).map(|i| format!("SYM{}-EQ", i)).collect();
        let tickers: Vec<&str> = tickers.iter().map(String::as_str).collect();

        let h = harness(
            source,
            CountingRefresher::ok(),
            MemoryObjectStore::new(),
            10,
        );
        let report = h.orchestrator.run(&symbols(&tickers), date()).await;

        assert_eq!(report.succeeded, 10);
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(report.refreshes, 1);
        assert_eq!(report.status(), RunStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_aborts_remaining_units() {
        let source = Arc::new(ScriptedSource::requiring_token("never"));
        let h = harness(
            source,
            CountingRefresher::failing(),
            MemoryObjectStore::new(),
            1,
        );

        let report = h
            .orchestrator
            .run(&symbols(&["A-EQ", "B-EQ", "C-EQ", "D-EQ"]), date())
            .await;

        assert_eq!(report.status(), RunStatus::Aborted);
        assert!(report.fatal.is_some());
        assert_eq!(report.dead_lettered, 1);
        assert_eq!(report.aborted.len(), 3);
        assert_eq!(
            report.by_class.get(&ErrorClass::CredentialRefreshFailed),
            Some(&1)
        );
        assert_eq!(h.refresher.calls(), 1);
        assert!(h.store.list("raw/").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_write_failure_becomes_storage_dead_letter() {
        let h = harness(
            Arc::new(ScriptedSource::new()),
            CountingRefresher::ok(),
            MemoryObjectStore::rejecting_writes_under("raw/"),
            2,
        );

        let report = h.orchestrator.run(&symbols(&["TCS-EQ"]), date()).await;

        assert_eq!(report.dead_lettered, 1);
        assert_eq!(report.by_class.get(&ErrorClass::Storage), Some(&1));
        let records = dead_letters(&h.store).await;
        assert_eq!(records[0].class, ErrorClass::Storage);
        assert_eq!(records[0].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_symbols_collapsed() {
        let source = Arc::new(ScriptedSource::new());
        let h = harness(
            source.clone(),
            CountingRefresher::ok(),
            MemoryObjectStore::new(),
            2,
        );

        let report = h
            .orchestrator
            .run(&symbols(&["TCS-EQ", "TCS-EQ", "INFY-EQ"]), date())
            .await;

        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_raw_batch_is_readable_json() {
        let h = harness(
            Arc::new(ScriptedSource::new()),
            CountingRefresher::ok(),
            MemoryObjectStore::new(),
            1,
        );
        h.orchestrator.run(&symbols(&["TCS-EQ"]), date()).await;

        let keys = h.store.keys().await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with(
            "raw/symbol=NSE_TCS-EQ/exchange=NSE/year=2024/month=01/day=02/ingest-"
        ));
        let batch: RawBatch =
            serde_json::from_slice(&h.store.get(&keys[0]).await.unwrap()).unwrap();
        assert_eq!(batch.symbol, Symbol::new("NSE", "TCS-EQ"));
        assert_eq!(batch.history.len(), 3);
    }

    /// 특정 종목 응답에서 패닉하는 소스.
    struct PanickingSource {
        ticker: &'static str,
    }

    #[async_trait]
    impl HistorySource for PanickingSource {
        async fn fetch_history(
            &self,
            unit: &FetchUnit,
            _token: &AccessToken,
        ) -> Result<HistoryPayload, FetchError> {
            if unit.symbol.ticker == self.ticker {
                panic!("candle row index out of bounds");
            }
            Ok(payload(2))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_worker_is_dead_lettered() {
        let h = harness(
            Arc::new(PanickingSource { ticker: "BROKEN-EQ" }),
            CountingRefresher::ok(),
            MemoryObjectStore::new(),
            2,
        );

        let report = h
            .orchestrator
            .run(&symbols(&["TCS-EQ", "BROKEN-EQ", "INFY-EQ"]), date())
            .await;

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.dead_lettered, 1);
        assert_eq!(report.succeeded + report.dead_lettered, report.total);
        assert_eq!(report.worker_panics, 1);
        assert_eq!(report.by_class.get(&ErrorClass::WorkerPanic), Some(&1));
        assert_eq!(report.status(), RunStatus::CompletedWithFailures);

        let records = dead_letters(&h.store).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, Symbol::new("NSE", "BROKEN-EQ"));
        assert_eq!(records[0].class, ErrorClass::WorkerPanic);
        assert!(records[0].detail.contains("panic"));
    }

    #[tokio::test]
    async fn test_huge_retry_after_still_reaches_dead_letter() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(429)
            .with_header("retry-after", "1e20")
            .create_async()
            .await;
        let client = FyersClient::new(FyersClientConfig {
            history_url: format!("{}/data/history", server.url()),
            ..FyersClientConfig::default()
        })
        .unwrap();

        let h = harness_with_policy(
            Arc::new(client),
            CountingRefresher::ok(),
            MemoryObjectStore::new(),
            1,
            RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(50))
                .without_jitter(),
        );
        let report = h.orchestrator.run(&symbols(&["TCS-EQ"]), date()).await;

        assert_eq!(report.worker_panics, 0);
        assert_eq!(report.dead_lettered, 1);
        assert_eq!(report.by_class.get(&ErrorClass::RateLimited), Some(&1));
        let records = dead_letters(&h.store).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].class, ErrorClass::RateLimited);
        assert_eq!(records[0].attempts, 2);
    }
}
