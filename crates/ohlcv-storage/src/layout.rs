//! 오브젝트 경로 규칙.
//!
//! ```text
//! raw/symbol=<SYM>/exchange=<EXCH>/year=YYYY/month=MM/day=DD/ingest-<ts>.json
//! errors/symbol=<SYM>/year=YYYY/month=MM/day=DD/failed-<ts>.json
//! processed/timeframe=<tf>/exchange=<EXCH>/symbol=<SYM>/year=YYYY/month=MM/day=DD/part-00000.parquet
//! ```
//!
//! 집계 출력은 `(timeframe, exchange, symbol, day)` 파티션 단위로 덮어씁니다.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use ohlcv_core::{sanitize_key, Symbol, Timeframe};

/// 파일명에 쓰는 타임스탬프 형식 (정렬 가능, 파일시스템 안전).
const FILE_TS_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// 집계 파티션 안의 parquet 파일 이름.
pub const PART_FILE_NAME: &str = "part-00000.parquet";

/// 저장소 루트 아래 세 영역의 접두어.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub raw_prefix: String,
    pub dead_letter_prefix: String,
    pub processed_prefix: String,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("raw", "errors", "processed")
    }
}

impl StorageLayout {
    pub fn new(
        raw_prefix: impl AsRef<str>,
        dead_letter_prefix: impl AsRef<str>,
        processed_prefix: impl AsRef<str>,
    ) -> Self {
        Self {
            raw_prefix: normalize_prefix(raw_prefix.as_ref()),
            dead_letter_prefix: normalize_prefix(dead_letter_prefix.as_ref()),
            processed_prefix: normalize_prefix(processed_prefix.as_ref()),
        }
    }

    /// 원시 배치 키.
    pub fn raw_key(&self, symbol: &Symbol, date: NaiveDate, ingested_at: DateTime<Utc>) -> String {
        format!(
            "{}/symbol={}/exchange={}/{}/ingest-{}.json",
            self.raw_prefix,
            symbol.path_key(),
            sanitize_key(&symbol.exchange),
            PartitionDate::from(date).segments(),
            ingested_at.format(FILE_TS_FORMAT)
        )
    }

    /// 데드레터 키.
    pub fn dead_letter_key(
        &self,
        symbol: &Symbol,
        date: NaiveDate,
        failed_at: DateTime<Utc>,
    ) -> String {
        format!(
            "{}/symbol={}/{}/failed-{}.json",
            self.dead_letter_prefix,
            symbol.path_key(),
            PartitionDate::from(date).segments(),
            failed_at.format(FILE_TS_FORMAT)
        )
    }

    /// 원시 영역 전체 접두어 (날짜 필터링은 `RawObjectKey`로 수행).
    pub fn raw_root(&self) -> String {
        format!("{}/", self.raw_prefix)
    }

    /// 데드레터 영역 전체 접두어.
    pub fn dead_letter_root(&self) -> String {
        format!("{}/", self.dead_letter_prefix)
    }

    /// 집계 영역 전체 접두어.
    pub fn processed_root(&self) -> String {
        format!("{}/", self.processed_prefix)
    }

    /// 집계 영역 키에서 파티션을 복원합니다. 규칙에 맞지 않으면 `None`.
    pub fn parse_processed_key(&self, key: &str) -> Option<ProcessedPartition> {
        let rest = key.strip_prefix(&self.processed_root())?;
        let mut timeframe = None;
        let mut exchange = None;
        let mut symbol_key = None;
        let mut year = None;
        let mut month = None;
        let mut day = None;

        for segment in rest.split('/') {
            match segment.split_once('=') {
                Some(("timeframe", v)) => timeframe = v.parse::<Timeframe>().ok(),
                Some(("exchange", v)) => exchange = Some(v.to_string()),
                Some(("symbol", v)) => symbol_key = Some(v.to_string()),
                Some(("year", v)) => year = v.parse::<i32>().ok(),
                Some(("month", v)) => month = v.parse::<u32>().ok(),
                Some(("day", v)) => day = v.parse::<u32>().ok(),
                _ => {}
            }
        }

        Some(ProcessedPartition {
            prefix: self.processed_prefix.clone(),
            timeframe: timeframe?,
            exchange: exchange?,
            symbol_key: symbol_key?,
            date: PartitionDate {
                year: year?,
                month: month?,
                day: day?,
            },
        })
    }

    /// 집계 파티션.
    pub fn processed_partition(
        &self,
        timeframe: Timeframe,
        symbol: &Symbol,
        date: NaiveDate,
    ) -> ProcessedPartition {
        ProcessedPartition {
            prefix: self.processed_prefix.clone(),
            timeframe,
            exchange: sanitize_key(&symbol.exchange),
            symbol_key: symbol.path_key(),
            date: PartitionDate::from(date),
        }
    }
}

fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_matches('/').to_string()
}

/// `year=YYYY/month=MM/day=DD` 파티션 날짜.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl PartitionDate {
    /// 경로 세그먼트 문자열.
    pub fn segments(&self) -> String {
        format!("year={:04}/month={:02}/day={:02}", self.year, self.month, self.day)
    }

    pub fn to_naive(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

impl From<NaiveDate> for PartitionDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

/// 덮어쓰기 대상이 되는 집계 파티션 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessedPartition {
    prefix: String,
    pub timeframe: Timeframe,
    pub exchange: String,
    pub symbol_key: String,
    pub date: PartitionDate,
}

impl ProcessedPartition {
    /// 파티션 디렉토리 접두어 (`/`로 끝남).
    pub fn prefix(&self) -> String {
        format!(
            "{}/timeframe={}/exchange={}/symbol={}/{}/",
            self.prefix,
            self.timeframe.label(),
            self.exchange,
            self.symbol_key,
            self.date.segments()
        )
    }

    /// 파티션 안의 parquet 파일 키.
    pub fn part_key(&self) -> String {
        format!("{}{}", self.prefix(), PART_FILE_NAME)
    }
}

/// 파싱된 원시 배치 키.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObjectKey {
    pub symbol_key: String,
    pub exchange: String,
    pub date: PartitionDate,
    pub file_name: String,
}

impl RawObjectKey {
    /// 원시 배치 키를 파싱합니다. 규칙에 맞지 않으면 `None`.
    pub fn parse(key: &str) -> Option<Self> {
        let mut symbol_key = None;
        let mut exchange = None;
        let mut year = None;
        let mut month = None;
        let mut day = None;

        let mut segments = key.split('/').peekable();
        let mut file_name = None;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                file_name = Some(segment);
                break;
            }
            match segment.split_once('=') {
                Some(("symbol", v)) => symbol_key = Some(v.to_string()),
                Some(("exchange", v)) => exchange = Some(v.to_string()),
                Some(("year", v)) => year = v.parse::<i32>().ok(),
                Some(("month", v)) => month = v.parse::<u32>().ok(),
                Some(("day", v)) => day = v.parse::<u32>().ok(),
                _ => {}
            }
        }

        let file_name = file_name.filter(|f| f.ends_with(".json"))?;
        Some(Self {
            symbol_key: symbol_key?,
            exchange: exchange?,
            date: PartitionDate {
                year: year?,
                month: month?,
                day: day?,
            },
            file_name: file_name.to_string(),
        })
    }
}
