//! 수집 단위 하나를 끝까지 처리하는 이력 수집기.
//!
//! 매 시도마다 요청 제한기 허가를 받고, 현재 토큰으로 요청한 뒤,
//! 실패는 `RetryStateMachine`에 넘겨 다음 행동을 정합니다.

use async_trait::async_trait;
use ohlcv_core::{ErrorClass, FetchUnit, HistoryPayload};
use std::sync::Arc;

use crate::credentials::{AccessToken, CredentialManager};
use crate::error::FetchError;
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryPolicy, RetryStateMachine, RetryStep};
use crate::telemetry;

/// 이력 데이터 소스.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// 수집 단위 하나를 한 번 요청합니다. 재시도는 호출자 책임입니다.
    async fn fetch_history(
        &self,
        unit: &FetchUnit,
        token: &AccessToken,
    ) -> Result<HistoryPayload, FetchError>;
}

/// 수집 단위의 최종 결과.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 캔들 응답 수신
    Success {
        payload: HistoryPayload,
        attempts: u32,
    },
    /// 데드레터 대상
    Failed {
        class: ErrorClass,
        attempts: u32,
        detail: String,
    },
}

impl FetchOutcome {
    /// 실행 전체를 중단시켜야 하는 실패인지 확인.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchOutcome::Failed { class, .. } if class.is_fatal())
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FetchOutcome::Success { attempts, .. } | FetchOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// 이력 수집기.
pub struct HistoryFetcher {
    source: Arc<dyn HistorySource>,
    limiter: Arc<RateLimiter>,
    credentials: Arc<CredentialManager>,
    policy: RetryPolicy,
    namespace: String,
}

impl HistoryFetcher {
    pub fn new(
        source: Arc<dyn HistorySource>,
        limiter: Arc<RateLimiter>,
        credentials: Arc<CredentialManager>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            limiter,
            credentials,
            policy,
            namespace: telemetry::DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// 메트릭 네임스페이스 설정.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    /// 수집 단위를 성공 또는 데드레터 판정까지 처리합니다.
    pub async fn fetch(&self, unit: &FetchUnit) -> FetchOutcome {
        let mut machine = RetryStateMachine::new(self.policy.clone());

        loop {
            let attempt = machine.begin_attempt();
            // 대기 중 다른 작업이 갱신했을 수 있으므로 매 시도마다 다시 읽음
            let token = self.credentials.access_token().await;
            let permit = self.limiter.acquire().await;
            tracing::debug!(attempt, waited_ms = permit.waited.as_millis() as u64, "이력 요청");

            let error = match self.source.fetch_history(unit, &token).await {
                Ok(payload) => {
                    machine.on_success();
                    return FetchOutcome::Success {
                        payload,
                        attempts: machine.attempts(),
                    };
                }
                Err(error) => error,
            };

            match machine.on_failure(&error) {
                RetryStep::Retry(delay) => {
                    tracing::warn!(
                        attempt,
                        class = %error.class(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "이력 요청 실패, 재시도 예약"
                    );
                    telemetry::record_retry(&self.namespace, error.class());
                    tokio::time::sleep(delay).await;
                }
                RetryStep::RefreshThenRetry => {
                    tracing::warn!(attempt, error = %error, "인증 만료, 토큰 갱신 후 재시도");
                    match self.credentials.refresh(token.generation).await {
                        Ok(fresh) => {
                            tracing::debug!(generation = fresh.generation, "갱신된 토큰으로 재시도");
                        }
                        Err(refresh_error) => {
                            machine.on_refresh_failed();
                            return FetchOutcome::Failed {
                                class: ErrorClass::CredentialRefreshFailed,
                                attempts: machine.attempts(),
                                detail: format!("{} (원인: {})", refresh_error, error),
                            };
                        }
                    }
                }
                RetryStep::DeadLetter { class, attempts } => {
                    tracing::warn!(attempt, class = %class, error = %error, "이력 요청 최종 실패");
                    return FetchOutcome::Failed {
                        class,
                        attempts,
                        detail: error.to_string(),
                    };
                }
            }
        }
    }
}
