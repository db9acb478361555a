//! 수집 실행 요약.

use chrono::NaiveDate;
use ohlcv_core::{ErrorClass, Symbol};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{IngestError, RefreshError};

/// 실행 종료 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// 모든 심볼 성공
    Completed,
    /// 일부 심볼 데드레터
    CompletedWithFailures,
    /// 치명적 실패로 중단
    Aborted,
}

/// 수집 실행 통계.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// 대상 날짜
    pub date: NaiveDate,
    /// 수집 단위 수
    pub total: usize,
    /// 원시 배치 저장 성공
    pub succeeded: usize,
    /// 데드레터 처리
    pub dead_lettered: usize,
    /// 치명적 실패로 시작하지 못한 심볼
    pub aborted: Vec<Symbol>,
    /// 데드레터 분류별 수
    pub by_class: BTreeMap<ErrorClass, usize>,
    /// 토큰 갱신 횟수
    pub refreshes: u64,
    /// 저장된 총 캔들 수
    pub total_candles: usize,
    /// 데드레터 기록 자체가 실패한 수
    pub dead_letter_write_failures: usize,
    /// 워커 태스크 패닉 수
    pub worker_panics: usize,
    /// 치명적 실패 사유
    pub fatal: Option<String>,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn new(date: NaiveDate, total: usize) -> Self {
        Self {
            date,
            total,
            succeeded: 0,
            dead_lettered: 0,
            aborted: Vec::new(),
            by_class: BTreeMap::new(),
            refreshes: 0,
            total_candles: 0,
            dead_letter_write_failures: 0,
            worker_panics: 0,
            fatal: None,
            elapsed: Duration::ZERO,
        }
    }

    /// 성공 기록.
    pub fn record_success(&mut self, candles: usize) {
        self.succeeded += 1;
        self.total_candles += candles;
    }

    /// 데드레터 기록.
    pub fn record_dead_letter(&mut self, class: ErrorClass) {
        self.dead_lettered += 1;
        *self.by_class.entry(class).or_insert(0) += 1;
    }

    /// 최종 상태.
    pub fn status(&self) -> RunStatus {
        if self.fatal.is_some() {
            RunStatus::Aborted
        } else if self.dead_lettered > 0 || self.worker_panics > 0 {
            RunStatus::CompletedWithFailures
        } else {
            RunStatus::Completed
        }
    }

    /// 치명적 실패를 에러로 변환합니다.
    pub fn fatal_error(&self) -> Option<IngestError> {
        self.fatal
            .as_ref()
            .map(|reason| IngestError::CredentialRefreshFailed(RefreshError::Fatal(reason.clone())))
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self) {
        let by_class: Vec<String> = self
            .by_class
            .iter()
            .map(|(class, count)| format!("{}={}", class, count))
            .collect();

        tracing::info!(
            date = %self.date,
            status = ?self.status(),
            total = self.total,
            succeeded = self.succeeded,
            dead_lettered = self.dead_lettered,
            aborted = self.aborted.len(),
            by_class = by_class.join(","),
            refreshes = self.refreshes,
            total_candles = self.total_candles,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "수집 완료"
        );

        if let Some(reason) = &self.fatal {
            tracing::error!(reason = %reason, aborted = self.aborted.len(), "수집 중단");
        }
    }
}
