//! 환경변수 기반 설정 모듈.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use ohlcv_aggregate::{AggregationConfig, DEFAULT_MARKET_TIMEZONE};
use ohlcv_core::Timeframe;
use ohlcv_ingest::client::{DEFAULT_HISTORY_URL, DEFAULT_REFRESH_URL};
use ohlcv_ingest::{FyersClientConfig, OrchestratorConfig, RateLimiterConfig, RetryPolicy};
use ohlcv_storage::StorageLayout;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CollectorError;
use crate::Result;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 요청 한도 설정
    pub rate_limit: RateLimitConfig,
    /// 수집 설정
    pub ingest: IngestConfig,
    /// 저장소 설정
    pub storage: StorageConfig,
    /// 시장 타임존
    pub market_timezone: Tz,
    /// 고정 대상 날짜 (없으면 시장 타임존의 오늘)
    pub target_date: Option<NaiveDate>,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
}

/// 요청 한도 설정
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 초당 최대 요청 수
    pub max_per_sec: u32,
    /// 분당 최대 요청 수
    pub max_per_min: u32,
}

/// 수집 설정
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// 동시 처리 수집 단위 수
    pub max_concurrency: usize,
    /// 수집 단위당 최대 시도 횟수
    pub max_attempts: u32,
    /// 백오프 기본 지연 (밀리초)
    pub backoff_base_ms: u64,
    /// 백오프 최대 지연 (밀리초)
    pub backoff_max_ms: u64,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    pub history_url: String,
    pub refresh_url: String,
    /// 심볼 목록 파일
    pub symbols_path: PathBuf,
    /// 자격증명 JSON 파일
    pub credentials_path: PathBuf,
    /// 거래소 접두어가 없는 심볼에 붙일 거래소
    pub default_exchange: String,
    /// 원시 배치 태그
    pub tags: Option<String>,
    /// 메트릭 네임스페이스
    pub metrics_namespace: String,
}

/// 저장소 설정
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// 로컬 오브젝트 저장소 루트
    pub root: PathBuf,
    pub raw_prefix: String,
    pub dlq_prefix: String,
    pub processed_prefix: String,
}

/// 데몬 모드 설정
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 워크플로우 실행 주기 (분 단위)
    pub interval_minutes: u64,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드 (`.env` 파일 포함)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정을 만듭니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let market_timezone = match vars.get("MARKET_TIMEZONE") {
            Some(name) => name.parse::<Tz>().map_err(|e| {
                CollectorError::Config(format!("MARKET_TIMEZONE '{}' 해석 실패: {}", name, e))
            })?,
            None => DEFAULT_MARKET_TIMEZONE,
        };

        let target_date = match vars.get("TARGET_DATE") {
            Some(raw) => Some(NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
                CollectorError::Config(format!("TARGET_DATE '{}' 형식 오류 (YYYY-MM-DD): {}", raw, e))
            })?),
            None => None,
        };

        Ok(Self {
            rate_limit: RateLimitConfig {
                max_per_sec: vars.parse("MAX_PER_SEC", 9),
                max_per_min: vars.parse("MAX_PER_MIN", 180),
            },
            ingest: IngestConfig {
                max_concurrency: vars.parse("MAX_CONCURRENCY", 6),
                max_attempts: vars.parse("MAX_ATTEMPTS", 5),
                backoff_base_ms: vars.parse("BACKOFF_BASE_MS", 2000),
                backoff_max_ms: vars.parse("BACKOFF_MAX_MS", 30_000),
                request_timeout_secs: vars.parse("REQUEST_TIMEOUT_SECS", 30),
                history_url: vars.string("HISTORY_URL", DEFAULT_HISTORY_URL),
                refresh_url: vars.string("REFRESH_URL", DEFAULT_REFRESH_URL),
                symbols_path: vars.string("SYMBOLS_PATH", "config/symbols.txt").into(),
                credentials_path: vars
                    .string("CREDENTIALS_PATH", "config/fyers-credentials.json")
                    .into(),
                default_exchange: vars.string("DEFAULT_EXCHANGE", "NSE"),
                tags: vars.get("INGEST_TAGS"),
                metrics_namespace: vars.string("METRICS_NAMESPACE", "PriceFeedParser/Ingest"),
            },
            storage: StorageConfig {
                root: vars.string("STORAGE_ROOT", "./data").into(),
                raw_prefix: vars.string("RAW_PREFIX", "raw"),
                dlq_prefix: vars.string("DLQ_PREFIX", "errors"),
                processed_prefix: vars.string("PROCESSED_PREFIX", "processed"),
            },
            market_timezone,
            target_date,
            daemon: DaemonConfig {
                interval_minutes: vars.parse("DAEMON_INTERVAL_MINUTES", 60),
            },
        })
    }

    /// 실행 대상 날짜 결정 (CLI 인자 > TARGET_DATE > 시장 타임존의 오늘)
    pub fn resolve_date(&self, cli_date: Option<NaiveDate>) -> NaiveDate {
        cli_date
            .or(self.target_date)
            .unwrap_or_else(|| Utc::now().with_timezone(&self.market_timezone).date_naive())
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(
            &self.storage.raw_prefix,
            &self.storage.dlq_prefix,
            &self.storage.processed_prefix,
        )
    }

    pub fn rate_limiter(&self) -> RateLimiterConfig {
        RateLimiterConfig::new(self.rate_limit.max_per_sec, self.rate_limit.max_per_min)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.ingest.max_attempts,
            Duration::from_millis(self.ingest.backoff_base_ms),
            Duration::from_millis(self.ingest.backoff_max_ms),
        )
    }

    pub fn client(&self) -> FyersClientConfig {
        FyersClientConfig {
            history_url: self.ingest.history_url.clone(),
            refresh_url: self.ingest.refresh_url.clone(),
            timeout: Duration::from_secs(self.ingest.request_timeout_secs),
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrency: self.ingest.max_concurrency,
            tags: self.ingest.tags.clone(),
            namespace: self.ingest.metrics_namespace.clone(),
        }
    }

    pub fn aggregation(&self) -> AggregationConfig {
        AggregationConfig {
            timezone: self.market_timezone,
            timeframes: Timeframe::ALL.to_vec(),
            ..AggregationConfig::default()
        }
    }
}

impl DaemonConfig {
    /// 워크플로우 실행 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

/// 빈 값은 설정되지 않은 것으로 취급하는 조회 래퍼.
struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// 값을 파싱 (실패 시 기본값 사용)
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, "설정값 파싱 실패, 기본값 사용");
                default
            }),
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<CollectorConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CollectorConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.rate_limit.max_per_sec, 9);
        assert_eq!(config.rate_limit.max_per_min, 180);
        assert_eq!(config.ingest.max_concurrency, 6);
        assert_eq!(config.ingest.max_attempts, 5);
        assert_eq!(config.ingest.default_exchange, "NSE");
        assert_eq!(config.ingest.tags, None);
        assert_eq!(config.market_timezone, chrono_tz::Asia::Kolkata);
        assert_eq!(config.layout(), StorageLayout::default());
        assert_eq!(config.daemon.interval(), Duration::from_secs(3600));

        let policy = config.retry_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(2000));
        assert_eq!(policy.max_delay, Duration::from_millis(30_000));
    }

    #[test]
    fn test_overrides_and_lenient_parse() {
        let config = config_from(&[
            ("MAX_PER_SEC", "4"),
            ("MAX_CONCURRENCY", "many"),
            ("RAW_PREFIX", "ohlcv/raw"),
            ("INGEST_TAGS", "nightly"),
            ("MARKET_TIMEZONE", "America/New_York"),
        ])
        .unwrap();

        assert_eq!(config.rate_limit.max_per_sec, 4);
        assert_eq!(config.ingest.max_concurrency, 6);
        assert_eq!(config.layout().raw_root(), "ohlcv/raw/");
        assert_eq!(config.orchestrator().tags.as_deref(), Some("nightly"));
        assert_eq!(config.aggregation().timezone, chrono_tz::America::New_York);
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let err = config_from(&[("MARKET_TIMEZONE", "Mars/Olympus")]).unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
    }

    #[test]
    fn test_resolve_date_precedence() {
        let config = config_from(&[("TARGET_DATE", "2024-01-02")]).unwrap();
        let cli = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        assert_eq!(config.resolve_date(Some(cli)), cli);
        assert_eq!(
            config.resolve_date(None),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert!(config_from(&[("TARGET_DATE", "02/01/2024")]).is_err());
    }
}
