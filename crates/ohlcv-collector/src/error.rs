//! 에러 타입 정의.

use ohlcv_aggregate::AggregateError;
use ohlcv_ingest::IngestError;
use ohlcv_storage::StorageError;
use std::fmt;

/// Collector 에러 타입
#[derive(Debug)]
pub enum CollectorError {
    /// 설정 에러
    Config(String),
    /// 저장소 에러
    Storage(StorageError),
    /// 수집 에러
    Ingest(IngestError),
    /// 집계 에러
    Aggregate(AggregateError),
    /// 일반 에러
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Storage(e) => write!(f, "Storage error: {}", e),
            Self::Ingest(e) => write!(f, "Ingest error: {}", e),
            Self::Aggregate(e) => write!(f, "Aggregate error: {}", e),
            Self::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for CollectorError {}

impl From<StorageError> for CollectorError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<IngestError> for CollectorError {
    fn from(err: IngestError) -> Self {
        Self::Ingest(err)
    }
}

impl From<AggregateError> for CollectorError {
    fn from(err: AggregateError) -> Self {
        Self::Aggregate(err)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CollectorError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err)
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
