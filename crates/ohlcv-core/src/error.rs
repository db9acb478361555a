//! 파이프라인 공통 에러 타입과 실패 분류 체계.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 도메인 타입 파싱/검증 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 잘못된 심볼 식별자
    #[error("잘못된 심볼: {0}")]
    InvalidSymbol(String),

    /// 지원하지 않는 타임프레임
    #[error("잘못된 타임프레임: {0}")]
    InvalidTimeframe(String),

    /// 캔들 행 형식 오류
    #[error("잘못된 캔들 행: {0}")]
    InvalidCandle(String),
}

/// 실패 분류.
///
/// 데드레터 레코드와 실행 통계에 기록되는 분류이며,
/// 재시도 여부와 전파 방식을 결정합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// 접근 토큰 만료/무효 (갱신 후 1회 재시도)
    AuthExpired,
    /// 업스트림이 보고한 요청 한도 초과 (백오프 재시도)
    RateLimited,
    /// 타임아웃, 연결 끊김, 5xx (백오프 재시도)
    TransientNetwork,
    /// 재시도 불가 (인증 외 4xx, 잘못된 심볼 등)
    Permanent,
    /// 토큰 갱신 자체가 실패 (실행 전체에 치명적)
    CredentialRefreshFailed,
    /// 파싱할 수 없는 원시 배치 (집계 시 건너뜀)
    MalformedRawBatch,
    /// 원시 배치 저장 실패
    Storage,
    /// 수집 워커가 결과 없이 비정상 종료 (패닉)
    WorkerPanic,
}

impl ErrorClass {
    /// 백오프 재시도 대상인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::RateLimited | ErrorClass::TransientNetwork)
    }

    /// 실행 전체를 중단시키는 치명적 분류인지 확인.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorClass::CredentialRefreshFailed)
    }

    /// 로그/메트릭 라벨.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::AuthExpired => "auth_expired",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::TransientNetwork => "transient_network",
            ErrorClass::Permanent => "permanent",
            ErrorClass::CredentialRefreshFailed => "credential_refresh_failed",
            ErrorClass::MalformedRawBatch => "malformed_raw_batch",
            ErrorClass::Storage => "storage",
            ErrorClass::WorkerPanic => "worker_panic",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
