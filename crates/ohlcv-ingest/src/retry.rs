//! 재시도 정책과 상태 기계.
//!
//! ```text
//! Pending → Attempting → Succeeded
//!              │
//!              ├→ Retrying → Attempting ...
//!              └→ DeadLettered
//! ```
//!
//! - `RateLimited`/`TransientNetwork`: 시도 예산 안에서 지수 백오프 재시도
//! - `AuthExpired`: 토큰 갱신 후 1회 재시도 (예산에 포함하지 않음)
//! - `Permanent`: 즉시 데드레터

use ohlcv_core::ErrorClass;
use rand::Rng;
use std::time::Duration;

use crate::error::FetchError;

/// 재시도 정책.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 백오프 재시도 대상 실패에 대한 최대 시도 수 (인증 재시도 제외)
    pub max_attempts: u32,
    /// 첫 재시도 대기 시간
    pub base_delay: Duration,
    /// 대기 시간 상한
    pub max_delay: Duration,
    /// 지터 적용 여부
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(2000), Duration::from_millis(30_000))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: true,
        }
    }

    /// 지터 없는 정책 (테스트용).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// 지터 상한 (`base_delay / 4`, 미포함).
    pub fn jitter_bound(&self) -> Duration {
        self.base_delay / 4
    }

    /// `retry`번째 재시도(1부터)의 대기 시간.
    ///
    /// `base * 2^(retry-1) + jitter`를 상한으로 자릅니다.
    /// 지터가 `base/4` 미만이므로 재시도 번호에 대해 단조 비감소입니다.
    pub fn backoff(&self, retry: u32, jitter: Duration) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let multiplier = 1u32 << exponent;
        let delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .saturating_add(jitter.min(self.jitter_bound()));
        delay.min(self.max_delay)
    }

    fn sample_jitter(&self) -> Duration {
        let bound_ms = self.jitter_bound().as_millis() as u64;
        if !self.jitter || bound_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..bound_ms))
    }

    /// 업스트림 `Retry-After`와 결합한 대기 시간.
    fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(retry, self.sample_jitter());
        match retry_after {
            Some(hint) => backoff.max(hint.min(self.max_delay)),
            None => backoff,
        }
    }
}

/// 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    Attempting { attempt: u32 },
    Retrying { attempt: u32 },
    Succeeded { attempts: u32 },
    DeadLettered { class: ErrorClass, attempts: u32 },
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. } | RetryState::DeadLettered { .. }
        )
    }
}

/// 실패 후 다음 행동.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// 대기 후 재시도
    Retry(Duration),
    /// 토큰 갱신 후 즉시 재시도
    RefreshThenRetry,
    /// 종료 (데드레터)
    DeadLetter { class: ErrorClass, attempts: u32 },
}

/// 수집 단위 하나의 재시도 상태 기계.
#[derive(Debug, Clone)]
pub struct RetryStateMachine {
    policy: RetryPolicy,
    state: RetryState,
    /// 전체 시도 수
    attempts: u32,
    /// 예산에 포함되는 시도 수
    budgeted: u32,
    auth_retry_used: bool,
    auth_retry_pending: bool,
}

impl RetryStateMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Pending,
            attempts: 0,
            budgeted: 0,
            auth_retry_used: false,
            auth_retry_pending: false,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// 지금까지의 전체 시도 수.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// 새 시도를 시작하고 시도 번호를 반환합니다.
    pub fn begin_attempt(&mut self) -> u32 {
        debug_assert!(!self.state.is_terminal());
        self.attempts += 1;
        if self.auth_retry_pending {
            self.auth_retry_pending = false;
        } else {
            self.budgeted += 1;
        }
        self.state = RetryState::Attempting {
            attempt: self.attempts,
        };
        self.attempts
    }

    /// 현재 시도 성공.
    pub fn on_success(&mut self) {
        self.state = RetryState::Succeeded {
            attempts: self.attempts,
        };
    }

    /// 현재 시도 실패. 다음 행동을 결정합니다.
    pub fn on_failure(&mut self, error: &FetchError) -> RetryStep {
        let class = error.class();
        match class {
            ErrorClass::AuthExpired if !self.auth_retry_used => {
                self.auth_retry_used = true;
                self.auth_retry_pending = true;
                self.state = RetryState::Retrying {
                    attempt: self.attempts,
                };
                RetryStep::RefreshThenRetry
            }
            ErrorClass::RateLimited | ErrorClass::TransientNetwork
                if self.budgeted < self.policy.max_attempts =>
            {
                let delay = self.policy.delay_for(self.budgeted, error.retry_after());
                self.state = RetryState::Retrying {
                    attempt: self.attempts,
                };
                RetryStep::Retry(delay)
            }
            _ => self.dead_letter(class),
        }
    }

    /// 토큰 갱신 실패 (실행 전체 치명적).
    pub fn on_refresh_failed(&mut self) -> RetryStep {
        self.dead_letter(ErrorClass::CredentialRefreshFailed)
    }

    fn dead_letter(&mut self, class: ErrorClass) -> RetryStep {
        self.state = RetryState::DeadLettered {
            class,
            attempts: self.attempts,
        };
        RetryStep::DeadLetter {
            class,
            attempts: self.attempts,
        }
    }
}
