//! 수집 메트릭 헬퍼 함수.
//!
//! `metrics` 파사드로 기록하며, 레코더가 설치되지 않으면 아무 일도 하지 않습니다.
//! 모든 메트릭에는 `namespace` 라벨이 붙습니다.

use metrics::counter;
use ohlcv_core::ErrorClass;

/// 기본 메트릭 네임스페이스.
pub const DEFAULT_NAMESPACE: &str = "PriceFeedParser/Ingest";

/// 원시 배치 저장 성공.
pub fn record_success(namespace: &str) {
    counter!("ingest_success_total", "namespace" => namespace.to_string()).increment(1);
}

/// 데드레터 처리된 수집 단위.
pub fn record_failure(namespace: &str, class: ErrorClass) {
    counter!(
        "ingest_failed_total",
        "namespace" => namespace.to_string(),
        "class" => class.as_str()
    )
    .increment(1);
}

/// 치명적 실패로 시작하지 못한 수집 단위.
pub fn record_aborted(namespace: &str, count: u64) {
    counter!("ingest_aborted_total", "namespace" => namespace.to_string()).increment(count);
}

/// 토큰 갱신 결과 (`success`, `failure`, `persist_failed`).
pub fn record_credential_refresh(namespace: &str, result: &'static str) {
    counter!(
        "credential_refresh_total",
        "namespace" => namespace.to_string(),
        "result" => result
    )
    .increment(1);
}

/// 재시도 예약.
pub fn record_retry(namespace: &str, class: ErrorClass) {
    counter!(
        "ingest_retry_total",
        "namespace" => namespace.to_string(),
        "class" => class.as_str()
    )
    .increment(1);
}
