//! OHLCV 수집기.
//!
//! 이 crate는 스케줄러가 호출하는 단일 바이너리를 제공합니다:
//! - 일 단위 1분봉 수집 (요청 한도, 재시도, 토큰 갱신, 데드레터)
//! - 원시 배치 집계 (중복 제거, 1m/5m/15m/1d 재샘플링, parquet 파티션)
//! - 데몬 모드 (주기적 전체 워크플로우)

pub mod config;
pub mod error;
pub mod modules;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
