//! 자격증명 관리자.
//!
//! 접근 토큰 조회는 읽기 잠금만 사용하고, 갱신은 단일 비행(single-flight)으로 직렬화합니다.
//!
//! 각 토큰에는 세대(generation) 번호가 붙습니다. 인증 만료를 관측한 호출자는
//! 자신이 사용한 세대를 넘겨 갱신을 요청하고, 그 사이 다른 호출자가 이미 갱신했다면
//! 업스트림 호출 없이 새 토큰을 그대로 받습니다.
//!
//! 갱신이 한 번 실패하면 실패 상태가 고정되어 이후 모든 갱신 요청이 즉시 실패합니다.

use async_trait::async_trait;
use chrono::Utc;
use ohlcv_core::CredentialSet;
use ohlcv_storage::CredentialStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, RwLock};

use crate::error::{IngestResult, RefreshError};
use crate::telemetry;

/// 갱신으로 발급된 토큰 쌍.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// 업스트림이 새 리프레시 토큰을 주지 않으면 `None`
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("refresh_token_rotated", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// 리프레시 토큰으로 새 접근 토큰을 발급받는 업스트림 엔드포인트.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credentials: &CredentialSet) -> Result<RefreshedTokens, RefreshError>;
}

/// 요청에 사용할 접근 토큰과 그 세대 번호.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub client_id: String,
    pub token: String,
    pub generation: u64,
}

impl AccessToken {
    /// `Authorization` 헤더 값 (`client_id:access_token`).
    pub fn authorization(&self) -> String {
        format!("{}:{}", self.client_id, self.token)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("client_id", &self.client_id)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct TokenState {
    credentials: CredentialSet,
    generation: u64,
}

impl TokenState {
    fn token(&self) -> AccessToken {
        AccessToken {
            client_id: self.credentials.client_id.clone(),
            token: self.credentials.access_token.clone(),
            generation: self.generation,
        }
    }
}

/// 자격증명 관리자.
pub struct CredentialManager {
    state: RwLock<TokenState>,
    refresh_guard: Mutex<()>,
    failure: OnceLock<String>,
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<dyn CredentialStore>,
    refreshes: AtomicU64,
    persist_failures: AtomicU64,
    namespace: String,
}

impl CredentialManager {
    /// 이미 읽어 둔 자격증명으로 생성합니다.
    pub fn new(
        credentials: CredentialSet,
        refresher: Arc<dyn TokenRefresher>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            state: RwLock::new(TokenState {
                credentials,
                generation: 0,
            }),
            refresh_guard: Mutex::new(()),
            failure: OnceLock::new(),
            refresher,
            store,
            refreshes: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            namespace: telemetry::DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// 자격증명 저장소에서 읽어 생성합니다.
    pub async fn load(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> IngestResult<Self> {
        let credentials = store.load().await?;
        tracing::info!(
            client_id = %credentials.client_id,
            last_updated = ?credentials.last_updated,
            "자격증명 로드 완료"
        );
        Ok(Self::new(credentials, refresher, store))
    }

    /// 메트릭 네임스페이스 설정.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// 현재 접근 토큰.
    pub async fn access_token(&self) -> AccessToken {
        self.state.read().await.token()
    }

    /// 토큰을 갱신합니다.
    ///
    /// `stale_generation`은 호출자가 인증 만료를 관측한 토큰의 세대입니다.
    /// 이미 더 새로운 세대가 있으면 업스트림 호출 없이 그 토큰을 반환합니다.
    pub async fn refresh(&self, stale_generation: u64) -> Result<AccessToken, RefreshError> {
        let _guard = self.refresh_guard.lock().await;

        if let Some(reason) = self.failure.get() {
            return Err(RefreshError::Fatal(reason.clone()));
        }

        let current = {
            let state = self.state.read().await;
            if state.generation > stale_generation {
                tracing::debug!(
                    stale_generation,
                    generation = state.generation,
                    "이미 갱신된 토큰 재사용"
                );
                return Ok(state.token());
            }
            state.credentials.clone()
        };

        if !current.is_refreshable() {
            let err = RefreshError::MissingCredentials(
                "client_id, app_secret, refresh_token 중 누락된 값이 있음".to_string(),
            );
            return Err(self.latch_failure(err));
        }

        tracing::info!(generation = stale_generation, "접근 토큰 갱신 요청");
        let tokens = match self.refresher.refresh(&current).await {
            Ok(tokens) => tokens,
            Err(err) => return Err(self.latch_failure(err)),
        };

        let updated = current.with_tokens(tokens.access_token, tokens.refresh_token, Utc::now());

        // 저장 실패는 실행을 멈추지 않음 (새 토큰은 메모리에 유지)
        if let Err(e) = self.store.save(&updated).await {
            self.persist_failures.fetch_add(1, Ordering::SeqCst);
            telemetry::record_credential_refresh(&self.namespace, "persist_failed");
            tracing::warn!(error = %e, "갱신된 자격증명 저장 실패");
        }

        let mut state = self.state.write().await;
        state.credentials = updated;
        state.generation += 1;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        telemetry::record_credential_refresh(&self.namespace, "success");
        tracing::info!(generation = state.generation, "접근 토큰 갱신 완료");

        Ok(state.token())
    }

    fn latch_failure(&self, err: RefreshError) -> RefreshError {
        let _ = self.failure.set(err.to_string());
        telemetry::record_credential_refresh(&self.namespace, "failure");
        tracing::error!(error = %err, "접근 토큰 갱신 실패, 이후 갱신 중단");
        err
    }

    /// 갱신 실패 상태인지 확인.
    pub fn is_failed(&self) -> bool {
        self.failure.get().is_some()
    }

    /// 성공한 갱신 횟수.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// 갱신 후 저장에 실패한 횟수.
    pub fn persist_failure_count(&self) -> u64 {
        self.persist_failures.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("failed", &self.is_failed())
            .field("refreshes", &self.refresh_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ohlcv_storage::MemoryCredentialStore;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// 호출 수를 세는 테스트용 갱신기.
    pub(crate) struct CountingRefresher {
        pub calls: AtomicUsize,
        pub fail: bool,
        pub delay: Duration,
    }

    impl CountingRefresher {
        pub(crate) fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Duration::from_millis(50),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::ok()
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(
            &self,
            _credentials: &CredentialSet,
        ) -> Result<RefreshedTokens, RefreshError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(RefreshError::Rejected("invalid refresh token".to_string()));
            }
            Ok(RefreshedTokens {
                access_token: format!("access-{}", n + 1),
                refresh_token: None,
            })
        }
    }

    pub(crate) fn sample_credentials() -> CredentialSet {
        CredentialSet {
            client_id: "APP-100".to_string(),
            app_secret: "secret".to_string(),
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            last_updated: None,
        }
    }

    fn manager(
        refresher: Arc<CountingRefresher>,
        store: Arc<MemoryCredentialStore>,
    ) -> Arc<CredentialManager> {
        Arc::new(CredentialManager::new(sample_credentials(), refresher, store))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refresh_is_single_flight() {
        let refresher = Arc::new(CountingRefresher::ok());
        let store = Arc::new(MemoryCredentialStore::new(sample_credentials()));
        let manager = manager(refresher.clone(), store.clone());

        let stale = manager.access_token().await.generation;
        assert_eq!(stale, 0);

        let tasks = (0..10).map(|_| {
            let manager = manager.clone();
            async move { manager.refresh(stale).await }
        });
        let results = futures::future::join_all(tasks).await;

        assert_eq!(refresher.calls(), 1);
        assert_eq!(manager.refresh_count(), 1);
        for result in results {
            let token = result.unwrap();
            assert_eq!(token.generation, 1);
            assert_eq!(token.token, "access-2");
        }

        let saved = store.snapshot().await;
        assert_eq!(saved.access_token, "access-2");
        assert_eq!(saved.refresh_token, "refresh-1");
        assert!(saved.last_updated.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_is_latched() {
        let refresher = Arc::new(CountingRefresher::failing());
        let store = Arc::new(MemoryCredentialStore::new(sample_credentials()));
        let manager = manager(refresher.clone(), store.clone());

        let first = manager.refresh(0).await;
        assert!(matches!(first, Err(RefreshError::Rejected(_))));
        assert!(manager.is_failed());

        let second = manager.refresh(0).await;
        assert!(matches!(second, Err(RefreshError::Fatal(_))));
        assert_eq!(refresher.calls(), 1);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_fatal() {
        let refresher = Arc::new(CountingRefresher::ok());
        let mut credentials = sample_credentials();
        credentials.refresh_token.clear();
        let store = Arc::new(MemoryCredentialStore::new(credentials.clone()));
        let manager = CredentialManager::new(credentials, refresher.clone(), store);

        assert!(matches!(
            manager.refresh(0).await,
            Err(RefreshError::MissingCredentials(_))
        ));
        assert_eq!(refresher.calls(), 0);
        assert!(manager.is_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_failure_keeps_new_token() {
        let refresher = Arc::new(CountingRefresher::ok());
        let store = Arc::new(MemoryCredentialStore::new(sample_credentials()));
        store.set_fail_saves(true);
        let manager = manager(refresher, store.clone());

        let token = manager.refresh(0).await.unwrap();
        assert_eq!(token.token, "access-2");
        assert_eq!(manager.access_token().await.token, "access-2");
        assert_eq!(manager.persist_failure_count(), 1);
        assert!(!manager.is_failed());
        assert_eq!(store.snapshot().await.access_token, "access-1");
    }

    #[test]
    fn test_access_token_debug_hides_token() {
        let token = AccessToken {
            client_id: "APP-100".to_string(),
            token: "very-secret".to_string(),
            generation: 3,
        };
        assert_eq!(token.authorization(), "APP-100:very-secret");
        assert!(!format!("{:?}", token).contains("very-secret"));
    }
}
