//! 수집 단위(FetchUnit)와 원시 배치(RawBatch).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Candle, Symbol};

/// 한 번의 수집 실행에서 심볼 하나에 대한 이력 요청.
///
/// 실행 동안만 존재하는 일시적 값입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchUnit {
    /// 대상 심볼
    pub symbol: Symbol,
    /// 요청 시작일 (포함)
    pub range_from: NaiveDate,
    /// 요청 종료일 (포함)
    pub range_to: NaiveDate,
}

impl FetchUnit {
    /// 하루치 수집 단위를 생성합니다.
    pub fn for_day(symbol: Symbol, date: NaiveDate) -> Self {
        Self {
            symbol,
            range_from: date,
            range_to: date,
        }
    }
}

/// 업스트림 이력 응답 본문 중 캔들 배열.
///
/// 각 행은 `[ts, open, high, low, close, volume]` 형식입니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryPayload {
    #[serde(default)]
    pub candles: Vec<Vec<f64>>,
}

impl HistoryPayload {
    /// 캔들 행 수.
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// 비어 있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

/// 하나의 FetchUnit에 대해 저장된 원시 캔들 배치.
///
/// 한 번 기록되면 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBatch {
    /// 심볼
    pub symbol: Symbol,
    /// 거래소 코드
    pub exchange: String,
    /// 수집 시각
    pub ingested_at: DateTime<Utc>,
    /// 요청 시작일
    pub range_from: NaiveDate,
    /// 요청 종료일
    pub range_to: NaiveDate,
    /// 수집 태그 (운영 메타데이터)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    /// 업스트림 응답
    pub history: HistoryPayload,
}

impl RawBatch {
    /// 수집 단위와 응답으로 배치를 생성합니다.
    pub fn new(
        unit: &FetchUnit,
        ingested_at: DateTime<Utc>,
        history: HistoryPayload,
        tags: Option<String>,
    ) -> Self {
        Self {
            symbol: unit.symbol.clone(),
            exchange: unit.symbol.exchange.clone(),
            ingested_at,
            range_from: unit.range_from,
            range_to: unit.range_to,
            tags,
            history,
        }
    }

    /// 중첩 배열을 개별 캔들로 펼칩니다.
    ///
    /// 형식이 맞지 않는 행은 제외하고, 제외된 행 수를 함께 반환합니다.
    pub fn candles(&self) -> (Vec<Candle>, usize) {
        let mut rejected = 0;
        let candles = self
            .history
            .candles
            .iter()
            .filter_map(|row| match Candle::from_row(&self.symbol, row) {
                Ok(candle) => Some(candle),
                Err(_) => {
                    rejected += 1;
                    None
                }
            })
            .collect();
        (candles, rejected)
    }
}
