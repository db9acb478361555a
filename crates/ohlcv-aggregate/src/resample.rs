//! 타임프레임 재샘플링.
//!
//! 버킷 규칙: 시가는 첫 캔들, 고가는 최대, 저가는 최소, 종가는 마지막 캔들, 거래량은 합계.
//! 캔들이 없는 버킷은 만들지 않습니다.

use ohlcv_core::{Candle, ProcessedRow, Timeframe};

/// 한 심볼의 캔들을 `timeframe` 버킷으로 묶습니다.
///
/// `candles`는 같은 심볼이며 timestamp 오름차순이어야 합니다.
pub fn resample(candles: &[Candle], timeframe: Timeframe, utc_offset_secs: i64) -> Vec<ProcessedRow> {
    let mut rows: Vec<ProcessedRow> = Vec::new();

    for candle in candles {
        let bucket = timeframe.bucket_start(candle.timestamp, utc_offset_secs);

        match rows.last_mut() {
            Some(row) if row.bucket_start == bucket => {
                row.high = row.high.max(candle.high);
                row.low = row.low.min(candle.low);
                row.close = candle.close;
                row.volume += candle.volume;
            }
            _ => rows.push(ProcessedRow {
                symbol: candle.symbol.clone(),
                exchange: candle.symbol.exchange.clone(),
                timeframe,
                bucket_start: bucket,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
            }),
        }
    }

    rows
}
