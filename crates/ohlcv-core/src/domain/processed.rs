//! 집계 결과 행.

use serde::{Deserialize, Serialize};

use crate::{Symbol, Timeframe};

/// 재샘플링된 OHLCV 행.
///
/// 하루치 원시 배치로부터 언제든 다시 계산할 수 있으며,
/// 출력 파티션 안에서 `(symbol, timeframe, bucket_start)`가 유일합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRow {
    pub symbol: Symbol,
    pub exchange: String,
    pub timeframe: Timeframe,
    /// 버킷 시작 시각 (epoch 초)
    pub bucket_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
