//! 업스트림 시장 데이터 API에서 1분봉 이력을 수집합니다.
//!
//! 구성 요소:
//! - `RateLimiter`: 초당/분당 이중 슬라이딩 윈도우 제한
//! - `CredentialManager`: 단일 비행 토큰 갱신
//! - `HistoryFetcher`: 요청, 응답 분류, 재시도 상태 기계
//! - `IngestionOrchestrator`: 제한된 병렬 처리와 실행 요약
//! - `FyersClient`: 실제 HTTP 엔드포인트 구현

pub mod client;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;
pub mod stats;
pub mod telemetry;

pub use client::{classify_response, FyersClient, FyersClientConfig};
pub use credentials::{AccessToken, CredentialManager, RefreshedTokens, TokenRefresher};
pub use error::{FetchError, IngestError, IngestResult, RefreshError};
pub use fetcher::{FetchOutcome, HistoryFetcher, HistorySource};
pub use orchestrator::{IngestionOrchestrator, OrchestratorConfig};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RatePermit};
pub use retry::{RetryPolicy, RetryState, RetryStateMachine, RetryStep};
pub use stats::{RunReport, RunStatus};
