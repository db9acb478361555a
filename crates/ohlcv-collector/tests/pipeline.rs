//! 수집 → 집계 전체 흐름 테스트 (인메모리 저장소, 가짜 업스트림).

use async_trait::async_trait;
use chrono::NaiveDate;
use ohlcv_collector::modules::{build_engine, build_orchestrator, exit_code};
use ohlcv_collector::CollectorConfig;
use ohlcv_core::{
    CredentialSet, DeadLetterRecord, ErrorClass, FetchUnit, HistoryPayload, Symbol, Timeframe,
};
use ohlcv_ingest::{
    AccessToken, CredentialManager, FetchError, HistorySource, RefreshError, RefreshedTokens,
    TokenRefresher,
};
use ohlcv_storage::{MemoryCredentialStore, MemoryObjectStore, ObjectStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 2024-01-02 09:15 IST
const T_0915: f64 = 1_704_167_100.0;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

fn config() -> CollectorConfig {
    CollectorConfig::from_lookup(|key| match key {
        "BACKOFF_BASE_MS" => Some("10".to_string()),
        "BACKOFF_MAX_MS" => Some("100".to_string()),
        _ => None,
    })
    .unwrap()
}

fn credentials(access_token: &str) -> CredentialSet {
    CredentialSet {
        client_id: "APP-100".to_string(),
        app_secret: "secret".to_string(),
        access_token: access_token.to_string(),
        refresh_token: "refresh-1".to_string(),
        last_updated: None,
    }
}

fn universe() -> Vec<Symbol> {
    ["TCS-EQ", "INFY-EQ", "RELIANCE-EQ", "HDFCBANK-EQ", "DELISTED-EQ"]
        .into_iter()
        .map(|t| Symbol::new("NSE", t))
        .collect()
}

/// 장 시작 3분 캔들을 돌려주는 업스트림.
///
/// `DELISTED-EQ`는 재시도 불가 에러, 유효 토큰이 아니면 인증 만료.
struct FakeMarket {
    valid_token: String,
    calls: AtomicUsize,
}

impl FakeMarket {
    fn new(valid_token: &str) -> Self {
        Self {
            valid_token: valid_token.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HistorySource for FakeMarket {
    async fn fetch_history(
        &self,
        unit: &FetchUnit,
        token: &AccessToken,
    ) -> Result<HistoryPayload, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if token.token != self.valid_token {
            return Err(FetchError::AuthExpired("code -16: token expired".to_string()));
        }
        if unit.symbol.ticker == "DELISTED-EQ" {
            return Err(FetchError::Permanent("code -300: invalid symbol".to_string()));
        }
        Ok(HistoryPayload {
            candles: vec![
                vec![T_0915, 10.0, 10.0, 10.0, 10.0, 100.0],
                vec![T_0915 + 60.0, 10.0, 10.2, 10.0, 10.2, 150.0],
                vec![T_0915 + 120.0, 10.2, 10.2, 10.1, 10.1, 200.0],
            ],
        })
    }
}

struct FakeRefresher {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeRefresher {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TokenRefresher for FakeRefresher {
    async fn refresh(&self, _credentials: &CredentialSet) -> Result<RefreshedTokens, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if self.fail {
            return Err(RefreshError::Rejected("refresh token revoked".to_string()));
        }
        Ok(RefreshedTokens {
            access_token: "fresh".to_string(),
            refresh_token: None,
        })
    }
}

struct Harness {
    store: Arc<MemoryObjectStore>,
    credential_store: Arc<MemoryCredentialStore>,
    market: Arc<FakeMarket>,
    refresher: Arc<FakeRefresher>,
}

impl Harness {
    fn new(initial_token: &str, refresh_fails: bool) -> Self {
        Self {
            store: Arc::new(MemoryObjectStore::new()),
            credential_store: Arc::new(MemoryCredentialStore::new(credentials(initial_token))),
            market: Arc::new(FakeMarket::new("fresh")),
            refresher: Arc::new(FakeRefresher::new(refresh_fails)),
        }
    }

    async fn ingest(&self, config: &CollectorConfig) -> ohlcv_ingest::RunReport {
        let manager = CredentialManager::load(self.credential_store.clone(), self.refresher.clone())
            .await
            .unwrap();
        let orchestrator = build_orchestrator(
            config,
            self.market.clone(),
            Arc::new(manager),
            self.store.clone(),
        );
        orchestrator.run(&universe(), date()).await
    }

    async fn dead_letters(&self) -> Vec<DeadLetterRecord> {
        let mut records = Vec::new();
        for meta in self.store.list("errors/").await.unwrap() {
            let body = self.store.get(&meta.key).await.unwrap();
            records.push(serde_json::from_slice(&body).unwrap());
        }
        records
    }
}

#[tokio::test(start_paused = true)]
async fn test_one_permanent_failure_among_five_symbols() {
    let config = config();
    let harness = Harness::new("fresh", false);

    let report = harness.ingest(&config).await;
    assert_eq!(report.total, 5);
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.by_class.get(&ErrorClass::Permanent), Some(&1));
    assert!(report.aborted.is_empty());
    assert_eq!(exit_code(&report), 2);

    let dead_letters = harness.dead_letters().await;
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].class, ErrorClass::Permanent);
    assert_eq!(dead_letters[0].attempts, 1);

    assert_eq!(harness.store.list("raw/").await.unwrap().len(), 4);
    assert_eq!(harness.market.calls.load(Ordering::SeqCst), 5);
    assert_eq!(harness.refresher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ingest_then_aggregate_five_minute_bucket() {
    let config = config();
    let harness = Harness::new("fresh", false);
    harness.ingest(&config).await;

    let engine = build_engine(&config, harness.store.clone());
    let report = engine.run(date()).await.unwrap();
    assert_eq!(report.batches_read, 4);
    assert_eq!(report.symbols, 4);
    assert_eq!(report.partitions_written, 16);

    let rows = engine
        .read_partition(Timeframe::M5, &Symbol::new("NSE", "TCS-EQ"), date())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let bucket = &rows[0];
    assert_eq!(bucket.bucket_start, 1_704_167_100);
    assert_eq!(bucket.open, 10.0);
    assert_eq!(bucket.high, 10.2);
    assert_eq!(bucket.low, 10.0);
    assert_eq!(bucket.close, 10.1);
    assert_eq!(bucket.volume, 450.0);
}

#[tokio::test(start_paused = true)]
async fn test_expired_token_refreshed_once_for_all_symbols() {
    let config = config();
    let harness = Harness::new("stale", false);

    let report = harness.ingest(&config).await;
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.dead_lettered, 1);
    assert_eq!(report.refreshes, 1);
    assert_eq!(harness.refresher.calls.load(Ordering::SeqCst), 1);

    let stored = harness.credential_store.snapshot().await;
    assert_eq!(stored.access_token, "fresh");
    assert!(stored.last_updated.is_some());
    assert_eq!(harness.credential_store.save_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_aborts_run() {
    let config = config();
    let harness = Harness::new("stale", true);

    let report = harness.ingest(&config).await;
    assert!(report.fatal.is_some());
    assert_eq!(report.succeeded, 0);
    assert_eq!(exit_code(&report), 3);
    assert_eq!(harness.refresher.calls.load(Ordering::SeqCst), 1);
    assert!(harness.store.list("raw/").await.unwrap().is_empty());
}
