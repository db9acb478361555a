//! 집계 출력 타임프레임 정의.
//!
//! 1분봉 원시 데이터를 재샘플링할 수 있는 고정 폭 타임프레임과
//! 버킷 시작 시각 계산을 제공합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::CoreError;

/// 집계 타임프레임.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1분봉
    #[serde(rename = "1m")]
    M1,
    /// 5분봉
    #[serde(rename = "5m")]
    M5,
    /// 15분봉
    #[serde(rename = "15m")]
    M15,
    /// 일봉
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// 기본 출력 타임프레임 전체.
    pub const ALL: [Timeframe; 4] = [Timeframe::M1, Timeframe::M5, Timeframe::M15, Timeframe::D1];

    /// 이 타임프레임의 기간을 반환합니다.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.as_secs() as u64)
    }

    /// 이 타임프레임의 초 단위 값을 반환합니다.
    pub fn as_secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::D1 => 24 * 60 * 60,
        }
    }

    /// 파티션 경로에 쓰이는 라벨.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::D1 => "1d",
        }
    }

    /// 라벨에서 파싱합니다.
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim() {
            "1m" => Some(Timeframe::M1),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "1d" | "d1" => Some(Timeframe::D1),
            _ => None,
        }
    }

    /// `ts`가 속하는 버킷의 시작 시각 (epoch 초).
    ///
    /// `utc_offset_secs`만큼 이동한 현지 시각 기준으로 정렬하므로
    /// 일봉 버킷은 현지 자정에서 시작합니다.
    pub fn bucket_start(&self, ts: i64, utc_offset_secs: i64) -> i64 {
        let width = self.as_secs();
        (ts + utc_offset_secs).div_euclid(width) * width - utc_offset_secs
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| CoreError::InvalidTimeframe(s.to_string()))
    }
}
