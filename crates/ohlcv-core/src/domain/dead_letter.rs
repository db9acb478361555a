//! 데드레터 레코드.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{ErrorClass, Symbol};

/// 재시도를 모두 소진했거나 재시도 불가 실패를 만난 수집 단위의 기록.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// 심볼
    pub symbol: Symbol,
    /// 마지막으로 관측된 실패 분류
    pub class: ErrorClass,
    /// 총 시도 횟수
    pub attempts: u32,
    /// 실패 확정 시각
    pub failed_at: DateTime<Utc>,
    /// 원본 에러 상세
    pub detail: String,
    /// 요청 파라미터
    pub params: DeadLetterParams,
}

/// 실패한 요청의 파라미터.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterParams {
    pub range_from: NaiveDate,
    pub range_to: NaiveDate,
    pub resolution: String,
}
