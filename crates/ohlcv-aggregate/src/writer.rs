//! 집계 행 parquet 인코딩.

use ohlcv_core::{ProcessedRow, Symbol, Timeframe};
use polars::prelude::*;
use std::io::Cursor;

use crate::error::{AggregateError, AggregateResult};

/// parquet 컬럼 순서.
pub const COLUMNS: [&str; 9] = [
    "symbol",
    "exchange",
    "timeframe",
    "bucket_start",
    "open",
    "high",
    "low",
    "close",
    "volume",
];

/// 집계 행을 DataFrame으로 변환합니다.
pub fn rows_to_dataframe(rows: &[ProcessedRow]) -> AggregateResult<DataFrame> {
    let symbols: Vec<String> = rows.iter().map(|r| r.symbol.to_string()).collect();
    let exchanges: Vec<String> = rows.iter().map(|r| r.exchange.clone()).collect();
    let timeframes: Vec<&str> = rows.iter().map(|r| r.timeframe.label()).collect();
    let bucket_starts: Vec<i64> = rows.iter().map(|r| r.bucket_start).collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let volumes: Vec<f64> = rows.iter().map(|r| r.volume).collect();

    let df = DataFrame::new(vec![
        Column::new("symbol".into(), symbols),
        Column::new("exchange".into(), exchanges),
        Column::new("timeframe".into(), timeframes),
        Column::new("bucket_start".into(), bucket_starts),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])?;
    Ok(df)
}

/// 집계 행을 parquet 바이트로 인코딩합니다.
pub fn encode_rows(rows: &[ProcessedRow]) -> AggregateResult<Vec<u8>> {
    let mut df = rows_to_dataframe(rows)?;
    let mut buffer = Vec::new();
    ParquetWriter::new(&mut buffer).finish(&mut df)?;
    Ok(buffer)
}

/// parquet 바이트를 집계 행으로 디코딩합니다.
pub fn decode_rows(bytes: Vec<u8>) -> AggregateResult<Vec<ProcessedRow>> {
    let df = ParquetReader::new(Cursor::new(bytes)).finish()?;

    for name in COLUMNS {
        if df.column(name).is_err() {
            return Err(AggregateError::Parquet(format!("missing column '{}'", name)));
        }
    }

    let symbols = df.column("symbol")?.str()?;
    let exchanges = df.column("exchange")?.str()?;
    let timeframes = df.column("timeframe")?.str()?;
    let bucket_starts = df.column("bucket_start")?.i64()?;
    let opens = df.column("open")?.f64()?;
    let highs = df.column("high")?.f64()?;
    let lows = df.column("low")?.f64()?;
    let closes = df.column("close")?.f64()?;
    let volumes = df.column("volume")?.f64()?;

    let null_at = |column: &str, i: usize| AggregateError::Parquet(format!("null {} at row {}", column, i));

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let symbol: Symbol = symbols
            .get(i)
            .ok_or_else(|| null_at("symbol", i))?
            .parse()
            .map_err(|e| AggregateError::Parquet(format!("row {}: {}", i, e)))?;
        let timeframe_label = timeframes.get(i).ok_or_else(|| null_at("timeframe", i))?;
        let timeframe = Timeframe::from_label(timeframe_label).ok_or_else(|| {
            AggregateError::Parquet(format!("row {}: unknown timeframe {}", i, timeframe_label))
        })?;

        rows.push(ProcessedRow {
            symbol,
            exchange: exchanges
                .get(i)
                .ok_or_else(|| null_at("exchange", i))?
                .to_string(),
            timeframe,
            bucket_start: bucket_starts.get(i).ok_or_else(|| null_at("bucket_start", i))?,
            open: opens.get(i).unwrap_or(f64::NAN),
            high: highs.get(i).unwrap_or(f64::NAN),
            low: lows.get(i).unwrap_or(f64::NAN),
            close: closes.get(i).unwrap_or(f64::NAN),
            volume: volumes.get(i).unwrap_or(0.0),
        });
    }

    Ok(rows)
}
