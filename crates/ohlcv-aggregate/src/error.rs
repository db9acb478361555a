//! 집계 에러 타입.

use ohlcv_storage::StorageError;
use thiserror::Error;

/// 집계 작업 에러.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// 저장소 오류
    #[error("저장소 오류: {0}")]
    Storage(#[from] StorageError),

    /// parquet 인코딩/디코딩 오류
    #[error("parquet 오류: {0}")]
    Parquet(String),

    /// 현지 날짜를 계산할 수 없음
    #[error("잘못된 날짜: {0}")]
    InvalidDate(String),

    /// 블로킹 작업 실패
    #[error("집계 작업 실패: {0}")]
    Task(String),
}

impl From<polars::prelude::PolarsError> for AggregateError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        AggregateError::Parquet(err.to_string())
    }
}

/// 집계 작업 Result 타입.
pub type AggregateResult<T> = Result<T, AggregateError>;
