//! 원시 1분봉 배치를 중복 제거하고 여러 타임프레임으로 재샘플링해
//! 파티션 단위 parquet 데이터셋으로 기록합니다.

pub mod dedup;
pub mod engine;
pub mod error;
pub mod resample;
pub mod writer;

pub use dedup::{deduplicate, Deduplicated, SourcedBatch};
pub use engine::{AggregationConfig, AggregationEngine, AggregationReport, DEFAULT_MARKET_TIMEZONE};
pub use error::{AggregateError, AggregateResult};
pub use resample::resample;
pub use writer::{decode_rows, encode_rows};
