//! 워크플로우 단계 모듈.

pub mod aggregate;
pub mod ingest;

use ohlcv_storage::{LocalObjectStore, ObjectStore};
use std::sync::Arc;

use crate::CollectorConfig;

pub use aggregate::{build_engine, run_aggregate};
pub use ingest::{build_orchestrator, exit_code, parse_cli_symbols, run_ingest};

/// 설정된 루트 아래 로컬 오브젝트 저장소.
pub fn local_store(config: &CollectorConfig) -> Arc<dyn ObjectStore> {
    Arc::new(LocalObjectStore::new(&config.storage.root))
}
