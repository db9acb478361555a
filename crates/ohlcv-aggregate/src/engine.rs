//! 일 단위 집계 작업.
//!
//! 처리 순서:
//! 1. 대상 날짜의 원시 배치 목록 조회 및 파싱 (형식 오류는 건너뛰고 집계)
//! 2. 캔들 펼치기와 중복 제거
//! 3. 대상 현지 날짜 밖의 캔들 제외
//! 4. 심볼별 타임프레임 재샘플링 (rayon 병렬)
//! 5. `(timeframe, exchange, symbol, day)` 파티션 덮어쓰기
//! 6. 이번 실행에서 캔들이 없는 같은 날짜의 기존 파티션 삭제
//!
//! 같은 원시 데이터로 다시 실행하면 같은 바이트가 기록됩니다.

use chrono::{NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;
use ohlcv_core::{Candle, ErrorClass, ProcessedRow, RawBatch, Symbol, Timeframe};
use ohlcv_storage::{ObjectStore, PartitionDate, ProcessedPartition, RawObjectKey, StorageLayout};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dedup::{deduplicate, SourcedBatch};
use crate::error::{AggregateError, AggregateResult};
use crate::resample::resample;
use crate::writer::{decode_rows, encode_rows};

/// 기본 시장 타임존.
pub const DEFAULT_MARKET_TIMEZONE: Tz = chrono_tz::Asia::Kolkata;

/// 하루의 초.
const DAY_SECS: i64 = 86_400;

/// 집계 설정.
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// 버킷 정렬과 날짜 판정에 쓰는 시장 타임존
    pub timezone: Tz,
    /// 출력 타임프레임
    pub timeframes: Vec<Timeframe>,
    /// 메트릭 네임스페이스
    pub namespace: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_MARKET_TIMEZONE,
            timeframes: Timeframe::ALL.to_vec(),
            namespace: "PriceFeedParser/Aggregate".to_string(),
        }
    }
}

/// 집계 실행 통계.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregationReport {
    pub date: Option<NaiveDate>,
    /// 대상 날짜의 원시 오브젝트 수
    pub objects_listed: usize,
    /// 파싱 성공한 배치 수
    pub batches_read: usize,
    /// 읽기 실패나 형식 오류로 건너뛴 배치 수
    pub batches_skipped: usize,
    /// 형식 오류로 제외된 캔들 행 수
    pub rows_rejected: usize,
    /// 펼친 캔들 수
    pub candles_in: usize,
    /// 제거된 중복 수
    pub duplicates_dropped: usize,
    /// 대상 날짜 밖이라 제외된 캔들 수
    pub out_of_day: usize,
    /// 처리한 심볼 수
    pub symbols: usize,
    /// 타임프레임별 기록 행 수
    pub rows_by_timeframe: BTreeMap<Timeframe, usize>,
    /// 덮어쓴 파티션 수
    pub partitions_written: usize,
    /// 캔들이 없어져 삭제한 파티션 수
    pub partitions_removed: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl AggregationReport {
    /// 기록된 전체 행 수.
    pub fn rows_written(&self) -> usize {
        self.rows_by_timeframe.values().sum()
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self) {
        let by_timeframe: Vec<String> = self
            .rows_by_timeframe
            .iter()
            .map(|(tf, count)| format!("{}={}", tf, count))
            .collect();

        tracing::info!(
            date = ?self.date,
            objects = self.objects_listed,
            batches = self.batches_read,
            skipped = self.batches_skipped,
            candles_in = self.candles_in,
            duplicates = self.duplicates_dropped,
            out_of_day = self.out_of_day,
            symbols = self.symbols,
            rows = by_timeframe.join(","),
            partitions = self.partitions_written,
            removed = self.partitions_removed,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "집계 완료"
        );
    }
}

/// 인코딩된 파티션 하나.
struct EncodedPartition {
    partition: ProcessedPartition,
    rows: usize,
    body: Vec<u8>,
}

/// 집계 엔진.
pub struct AggregationEngine {
    store: Arc<dyn ObjectStore>,
    layout: StorageLayout,
    config: AggregationConfig,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn ObjectStore>, layout: StorageLayout, config: AggregationConfig) -> Self {
        Self {
            store,
            layout,
            config,
        }
    }

    /// 대상 날짜의 시장 타임존 UTC 오프셋 (초).
    pub fn utc_offset_secs(&self, date: NaiveDate) -> AggregateResult<i64> {
        let noon = date
            .and_hms_opt(12, 0, 0)
            .ok_or_else(|| AggregateError::InvalidDate(date.to_string()))?;
        let local = self
            .config
            .timezone
            .from_local_datetime(&noon)
            .earliest()
            .ok_or_else(|| AggregateError::InvalidDate(format!("{} ({})", date, self.config.timezone)))?;
        Ok(local.offset().fix().local_minus_utc() as i64)
    }

    /// 대상 날짜를 집계합니다.
    pub async fn run(&self, date: NaiveDate) -> AggregateResult<AggregationReport> {
        let started = Instant::now();
        let mut report = AggregationReport {
            date: Some(date),
            ..AggregationReport::default()
        };

        let batches = self.read_batches(date, &mut report).await?;

        let deduplicated = deduplicate(batches);
        report.candles_in = deduplicated.candles_in;
        report.duplicates_dropped = deduplicated.duplicates;
        report.rows_rejected = deduplicated.rows_rejected;

        let offset = self.utc_offset_secs(date)?;
        let day_start = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AggregateError::InvalidDate(date.to_string()))?
            .and_utc()
            .timestamp()
            - offset;

        let mut by_symbol: BTreeMap<Symbol, Vec<Candle>> = BTreeMap::new();
        for candle in deduplicated.candles {
            if candle.timestamp < day_start || candle.timestamp >= day_start + DAY_SECS {
                report.out_of_day += 1;
                continue;
            }
            by_symbol.entry(candle.symbol.clone()).or_default().push(candle);
        }
        report.symbols = by_symbol.len();

        if report.out_of_day > 0 {
            tracing::warn!(count = report.out_of_day, "대상 날짜 밖 캔들 제외");
        }

        let layout = self.layout.clone();
        let timeframes = self.config.timeframes.clone();
        let encoded = tokio::task::spawn_blocking(move || {
            encode_partitions(&by_symbol, &timeframes, offset, &layout, date)
        })
        .await
        .map_err(|e| AggregateError::Task(e.to_string()))??;

        let mut written = HashSet::new();
        for item in encoded {
            let prefix = item.partition.prefix();
            self.store.delete_prefix(&prefix).await?;
            self.store.put(&item.partition.part_key(), item.body).await?;
            written.insert(prefix);

            *report
                .rows_by_timeframe
                .entry(item.partition.timeframe)
                .or_insert(0) += item.rows;
            report.partitions_written += 1;
            metrics::counter!(
                "aggregate_rows_written_total",
                "namespace" => self.config.namespace.clone(),
                "timeframe" => item.partition.timeframe.label()
            )
            .increment(item.rows as u64);
        }

        report.partitions_removed = self.remove_stale_partitions(date, &written).await?;

        report.elapsed = started.elapsed();
        Ok(report)
    }

    async fn read_batches(
        &self,
        date: NaiveDate,
        report: &mut AggregationReport,
    ) -> AggregateResult<Vec<SourcedBatch>> {
        let target = PartitionDate::from(date);
        let objects = self.store.list(&self.layout.raw_root()).await?;

        let mut batches = Vec::new();
        for meta in objects {
            let Some(parsed) = RawObjectKey::parse(&meta.key) else {
                continue;
            };
            if parsed.date != target {
                continue;
            }
            report.objects_listed += 1;

            let body = match self.store.get(&meta.key).await {
                Ok(body) => body,
                Err(e) => {
                    self.record_skipped(ErrorClass::Storage, report);
                    tracing::warn!(key = %meta.key, error = %e, "원시 배치 읽기 실패, 건너뜀");
                    continue;
                }
            };
            match serde_json::from_slice::<RawBatch>(&body) {
                Ok(batch) => {
                    report.batches_read += 1;
                    batches.push(SourcedBatch {
                        key: meta.key,
                        batch,
                    });
                }
                Err(e) => {
                    self.record_skipped(ErrorClass::MalformedRawBatch, report);
                    tracing::warn!(key = %meta.key, error = %e, "형식이 잘못된 원시 배치 건너뜀");
                }
            }
        }

        tracing::info!(
            date = %date,
            batches = report.batches_read,
            skipped = report.batches_skipped,
            "원시 배치 읽기 완료"
        );
        Ok(batches)
    }

    fn record_skipped(&self, class: ErrorClass, report: &mut AggregationReport) {
        report.batches_skipped += 1;
        metrics::counter!(
            "aggregate_batches_skipped_total",
            "namespace" => self.config.namespace.clone(),
            "class" => class.as_str()
        )
        .increment(1);
    }

    /// 대상 날짜의 기존 파티션 중 이번 실행에서 쓰지 않은 것을 삭제합니다.
    ///
    /// 설정된 타임프레임만 대상으로 하며 삭제한 파티션 수를 반환합니다.
    async fn remove_stale_partitions(
        &self,
        date: NaiveDate,
        written: &HashSet<String>,
    ) -> AggregateResult<usize> {
        let target = PartitionDate::from(date);
        let mut stale = BTreeSet::new();
        for meta in self.store.list(&self.layout.processed_root()).await? {
            let Some(partition) = self.layout.parse_processed_key(&meta.key) else {
                continue;
            };
            if partition.date != target || !self.config.timeframes.contains(&partition.timeframe) {
                continue;
            }
            let prefix = partition.prefix();
            if !written.contains(&prefix) {
                stale.insert(prefix);
            }
        }

        for prefix in &stale {
            self.store.delete_prefix(prefix).await?;
            tracing::info!(prefix = %prefix, "캔들 없는 기존 파티션 삭제");
        }
        Ok(stale.len())
    }

    /// 파티션 하나를 읽어 집계 행으로 돌려줍니다.
    pub async fn read_partition(
        &self,
        timeframe: Timeframe,
        symbol: &Symbol,
        date: NaiveDate,
    ) -> AggregateResult<Vec<ProcessedRow>> {
        let partition = self.layout.processed_partition(timeframe, symbol, date);
        let body = self.store.get(&partition.part_key()).await?;
        decode_rows(body)
    }
}

fn encode_partitions(
    by_symbol: &BTreeMap<Symbol, Vec<Candle>>,
    timeframes: &[Timeframe],
    offset: i64,
    layout: &StorageLayout,
    date: NaiveDate,
) -> AggregateResult<Vec<EncodedPartition>> {
    let per_symbol: Vec<AggregateResult<Vec<EncodedPartition>>> = by_symbol
        .par_iter()
        .map(|(symbol, candles)| {
            timeframes
                .iter()
                .map(|&timeframe| -> AggregateResult<EncodedPartition> {
                    let rows = resample(candles, timeframe, offset);
                    Ok(EncodedPartition {
                        partition: layout.processed_partition(timeframe, symbol, date),
                        rows: rows.len(),
                        body: encode_rows(&rows)?,
                    })
                })
                .collect::<AggregateResult<Vec<_>>>()
        })
        .collect();

    let mut encoded = Vec::new();
    for partitions in per_symbol {
        encoded.extend(partitions?);
    }
    Ok(encoded)
}
