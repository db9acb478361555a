//! 1분봉 캔들.

use serde::{Deserialize, Serialize};

use crate::{CoreError, Symbol};

/// 업스트림이 생성한 1분 해상도 캔들.
///
/// 생성 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 심볼
    pub symbol: Symbol,
    /// 분 시작 시각 (epoch 초)
    pub timestamp: i64,
    /// 시가
    pub open: f64,
    /// 고가
    pub high: f64,
    /// 저가
    pub low: f64,
    /// 종가
    pub close: f64,
    /// 거래량
    pub volume: f64,
}

impl Candle {
    /// 업스트림 행 형식 `[ts, open, high, low, close, volume]`에서 생성합니다.
    ///
    /// 6개 미만의 필드나 비유한 값이 있으면 거부합니다.
    pub fn from_row(symbol: &Symbol, row: &[f64]) -> Result<Self, CoreError> {
        if row.len() < 6 {
            return Err(CoreError::InvalidCandle(format!(
                "필드 수 부족: {} (최소 6)",
                row.len()
            )));
        }
        if row[..6].iter().any(|v| !v.is_finite()) {
            return Err(CoreError::InvalidCandle(format!("비유한 값: {:?}", row)));
        }

        Ok(Self {
            symbol: symbol.clone(),
            timestamp: row[0] as i64,
            open: row[1],
            high: row[2],
            low: row[3],
            close: row[4],
            volume: row[5],
        })
    }
}
