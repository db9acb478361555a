//! 일 단위 집계 단계.

use chrono::NaiveDate;
use ohlcv_aggregate::{AggregationEngine, AggregationReport};
use ohlcv_storage::ObjectStore;
use std::sync::Arc;

use crate::{CollectorConfig, Result};

/// 설정값으로 집계 엔진을 조립합니다.
pub fn build_engine(config: &CollectorConfig, store: Arc<dyn ObjectStore>) -> AggregationEngine {
    AggregationEngine::new(store, config.layout(), config.aggregation())
}

/// 로컬 저장소의 하루치 원시 배치를 집계합니다.
pub async fn run_aggregate(config: &CollectorConfig, date: NaiveDate) -> Result<AggregationReport> {
    tracing::info!(date = %date, timezone = %config.market_timezone, "집계 시작");
    let engine = build_engine(config, super::local_store(config));
    Ok(engine.run(date).await?)
}
