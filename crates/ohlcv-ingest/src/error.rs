//! 수집 에러 타입 정의.

use ohlcv_core::ErrorClass;
use ohlcv_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// 단일 이력 요청의 분류된 실패.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// 접근 토큰 만료 또는 무효
    #[error("인증 만료: {0}")]
    AuthExpired(String),

    /// 업스트림 요청 한도 초과
    #[error("요청 한도 초과: {detail}")]
    RateLimited {
        detail: String,
        /// `Retry-After` 헤더 값
        retry_after: Option<Duration>,
    },

    /// 타임아웃, 연결 오류, 해석 불가 응답
    #[error("일시적 오류: {0}")]
    Transient(String),

    /// 업스트림 5xx
    #[error("서버 오류: {detail}")]
    ServerError {
        detail: String,
        /// `Retry-After` 헤더 값
        retry_after: Option<Duration>,
    },

    /// 재시도해도 성공할 수 없는 요청
    #[error("영구 오류: {0}")]
    Permanent(String),
}

impl FetchError {
    /// 실패 분류.
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::AuthExpired(_) => ErrorClass::AuthExpired,
            FetchError::RateLimited { .. } => ErrorClass::RateLimited,
            FetchError::Transient(_) | FetchError::ServerError { .. } => {
                ErrorClass::TransientNetwork
            }
            FetchError::Permanent(_) => ErrorClass::Permanent,
        }
    }

    /// 업스트림이 지정한 재시도 대기 시간.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after, .. }
            | FetchError::ServerError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            FetchError::Permanent(err.to_string())
        } else if err.is_timeout() {
            FetchError::Transient(format!("timeout: {}", err))
        } else if err.is_connect() {
            FetchError::Transient(format!("connect: {}", err))
        } else {
            FetchError::Transient(err.to_string())
        }
    }
}

/// 토큰 갱신 에러.
///
/// 어떤 변형이든 실행 전체에 치명적입니다.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// 갱신에 필요한 자격증명 필드 누락
    #[error("자격증명 누락: {0}")]
    MissingCredentials(String),

    /// 업스트림이 갱신 요청을 거부함
    #[error("토큰 갱신 거부: {0}")]
    Rejected(String),

    /// 갱신 요청 전송/응답 해석 실패
    #[error("토큰 갱신 요청 실패: {0}")]
    Request(String),

    /// 이전 갱신 실패로 더 이상 갱신하지 않음
    #[error("토큰 갱신 불가 (이전 실패): {0}")]
    Fatal(String),
}

impl From<reqwest::Error> for RefreshError {
    fn from(err: reqwest::Error) -> Self {
        RefreshError::Request(err.to_string())
    }
}

/// 수집 실행 수준 에러.
#[derive(Debug, Error)]
pub enum IngestError {
    /// 토큰 갱신 실패 (실행 중단)
    #[error("자격증명 갱신 실패: {0}")]
    CredentialRefreshFailed(#[from] RefreshError),

    /// 저장소 오류
    #[error("저장소 오류: {0}")]
    Storage(#[from] StorageError),

    /// HTTP 클라이언트 구성 오류
    #[error("HTTP 클라이언트 오류: {0}")]
    Client(String),
}

/// 수집 작업 Result 타입.
pub type IngestResult<T> = Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_classes() {
        assert_eq!(
            FetchError::AuthExpired("x".into()).class(),
            ErrorClass::AuthExpired
        );
        assert_eq!(
            FetchError::Transient("x".into()).class(),
            ErrorClass::TransientNetwork
        );
        let limited = FetchError::RateLimited {
            detail: "429".into(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(limited.class(), ErrorClass::RateLimited);
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(FetchError::Permanent("x".into()).retry_after(), None);
    }
}
