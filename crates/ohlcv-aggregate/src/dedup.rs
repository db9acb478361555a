//! 중복 캔들 제거.
//!
//! 같은 `(symbol, timestamp)` 캔들이 여러 배치에 있으면 가장 나중에 수집된 값을 사용합니다.
//! 배치 순서는 `(ingested_at, object key)`로 정해지므로 입력 순서와 무관하게 결과가 같습니다.

use ohlcv_core::{Candle, RawBatch, Symbol};
use std::collections::BTreeMap;

/// 오브젝트 키와 함께 읽어온 원시 배치.
#[derive(Debug, Clone)]
pub struct SourcedBatch {
    pub key: String,
    pub batch: RawBatch,
}

/// 중복 제거 결과.
#[derive(Debug, Clone, Default)]
pub struct Deduplicated {
    /// `(symbol, timestamp)` 순으로 정렬된 유일 캔들
    pub candles: Vec<Candle>,
    /// 펼친 전체 캔들 수
    pub candles_in: usize,
    /// 덮어써진 중복 수
    pub duplicates: usize,
    /// 형식 오류로 제외된 행 수
    pub rows_rejected: usize,
}

/// 배치들을 펼치고 중복을 제거합니다.
pub fn deduplicate(mut batches: Vec<SourcedBatch>) -> Deduplicated {
    batches.sort_by(|a, b| {
        a.batch
            .ingested_at
            .cmp(&b.batch.ingested_at)
            .then_with(|| a.key.cmp(&b.key))
    });

    let mut latest: BTreeMap<(Symbol, i64), Candle> = BTreeMap::new();
    let mut result = Deduplicated::default();

    for sourced in &batches {
        let (candles, rejected) = sourced.batch.candles();
        result.rows_rejected += rejected;
        result.candles_in += candles.len();

        for candle in candles {
            let key = (candle.symbol.clone(), candle.timestamp);
            if latest.insert(key, candle).is_some() {
                result.duplicates += 1;
            }
        }
    }

    result.candles = latest.into_values().collect();
    result
}
