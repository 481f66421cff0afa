//! 만료를 아는 토큰 캐시
//!
//! 토큰 공급자 호출은 한 번에 하나만 진행됩니다. 갱신 중에 들어온 요청은
//! 진행 중인 호출의 대기자로 붙고, 호출이 끝나면 (성공이든 실패든) 슬롯이
//! 비워져 다음 요청이 새 호출을 시작합니다.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::AuthToken;
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::logging::Logger;

// ============================================================================
// RenewableAuthToken - 갱신 가능한 토큰
// ============================================================================

/// 공급자가 돌려주는 토큰과 예상 만료 시각
#[derive(Debug, Clone, PartialEq)]
pub struct RenewableAuthToken {
    pub token: AuthToken,
    pub expected_expiration_time: Option<DateTime<Utc>>,
}

impl RenewableAuthToken {
    /// 만료 없는 토큰
    pub fn new(token: AuthToken) -> Self {
        Self {
            token,
            expected_expiration_time: None,
        }
    }

    pub fn with_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.expected_expiration_time = Some(at);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expected_expiration_time.is_some_and(|at| at <= now)
    }
}

// ============================================================================
// AuthTokenProvider - 토큰 공급자
// ============================================================================

/// 토큰 공급자 콜백
#[async_trait]
pub trait AuthTokenProvider: Send + Sync {
    async fn get_token(&self) -> DriverResult<RenewableAuthToken>;

    /// 갱신하면 다른 토큰을 줄 수 있는지 여부
    fn is_renewable(&self) -> bool {
        true
    }
}

/// 고정 토큰 (만료 없음)
#[derive(Debug, Clone)]
pub struct StaticAuthTokenProvider {
    token: AuthToken,
}

impl StaticAuthTokenProvider {
    pub fn new(token: AuthToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl AuthTokenProvider for StaticAuthTokenProvider {
    async fn get_token(&self) -> DriverResult<RenewableAuthToken> {
        Ok(RenewableAuthToken::new(self.token.clone()))
    }

    fn is_renewable(&self) -> bool {
        false
    }
}

/// 비동기 클로저 공급자
pub struct FnAuthTokenProvider {
    f: Box<dyn Fn() -> BoxFuture<'static, DriverResult<RenewableAuthToken>> + Send + Sync>,
}

impl FnAuthTokenProvider {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DriverResult<RenewableAuthToken>> + Send + 'static,
    {
        Self {
            f: Box::new(move || f().boxed()),
        }
    }
}

#[async_trait]
impl AuthTokenProvider for FnAuthTokenProvider {
    async fn get_token(&self) -> DriverResult<RenewableAuthToken> {
        (self.f)().await
    }
}

impl fmt::Debug for FnAuthTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnAuthTokenProvider")
    }
}

// ============================================================================
// AuthTokenHolder - 토큰 캐시
// ============================================================================

type RefreshOutcome = DriverResult<Arc<RenewableAuthToken>>;

struct HolderState {
    current: Option<Arc<RenewableAuthToken>>,
    /// 서버가 토큰 만료를 알려온 경우
    stale: bool,
    /// 진행 중인 갱신의 대기자 목록; `None` 이면 진행 중인 갱신 없음
    refresh: Option<Vec<oneshot::Sender<RefreshOutcome>>>,
}

/// 단일 갱신 토큰 캐시
pub struct AuthTokenHolder {
    provider: Arc<dyn AuthTokenProvider>,
    state: Mutex<HolderState>,
    logger: Logger,
}

impl AuthTokenHolder {
    pub fn new(provider: Arc<dyn AuthTokenProvider>, logger: Logger) -> Self {
        Self {
            provider,
            state: Mutex::new(HolderState {
                current: None,
                stale: false,
                refresh: None,
            }),
            logger,
        }
    }

    /// 고정 토큰 홀더
    pub fn fixed(token: AuthToken, logger: Logger) -> Self {
        Self::new(Arc::new(StaticAuthTokenProvider::new(token)), logger)
    }

    /// 캐시된 토큰
    pub fn get(&self) -> Option<AuthToken> {
        self.state.lock().current.as_ref().map(|t| t.token.clone())
    }

    pub fn is_token_expired(&self) -> bool {
        let state = self.state.lock();
        match &state.current {
            None => true,
            Some(token) => state.stale || token.is_expired_at(Utc::now()),
        }
    }

    /// 서버가 거부한 토큰을 만료로 표시
    pub fn mark_expired(&self) {
        self.state.lock().stale = true;
    }

    pub fn is_renewable(&self) -> bool {
        self.provider.is_renewable()
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refresh.is_some()
    }

    /// 만료되었으면 갱신을 기다린 뒤 현재 토큰 반환
    pub async fn get_fresh(self: &Arc<Self>) -> DriverResult<AuthToken> {
        if self.is_token_expired() {
            self.schedule_refresh().wait().await?;
        }
        self.get()
            .ok_or_else(|| DriverError::authentication("No auth token available"))
    }

    /// 갱신 시작 또는 진행 중인 갱신에 합류
    pub fn schedule_refresh(self: &Arc<Self>) -> RefreshHandle {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut state = self.state.lock();
            match state.refresh.as_mut() {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    state.refresh = Some(vec![tx]);
                    true
                }
            }
        };

        if start {
            let holder = Arc::clone(self);
            tokio::spawn(async move { holder.refresh().await });
        }
        RefreshHandle { rx }
    }

    async fn refresh(&self) {
        self.logger.debug("Refreshing auth token");
        let result = match AssertUnwindSafe(self.provider.get_token()).catch_unwind().await {
            Ok(result) => result.map(Arc::new),
            Err(_) => Err(DriverError::authentication("Auth token provider panicked")),
        };

        let waiters = {
            let mut state = self.state.lock();
            if let Ok(token) = &result {
                state.current = Some(token.clone());
                state.stale = false;
            }
            state.refresh.take().unwrap_or_default()
        };

        if let Err(e) = &result {
            self.logger.warn(format!("Auth token refresh failed: {}", e));
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl fmt::Debug for AuthTokenHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AuthTokenHolder")
            .field("current", &state.current)
            .field("stale", &state.stale)
            .field("refreshing", &state.refresh.is_some())
            .finish()
    }
}

/// 진행 중인 갱신의 결과 대기
#[derive(Debug)]
pub struct RefreshHandle {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl RefreshHandle {
    pub async fn wait(self) -> DriverResult<Arc<RenewableAuthToken>> {
        self.rx
            .await
            .map_err(|_| DriverError::internal("Auth token refresh was abandoned"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_provider(
        calls: Arc<AtomicUsize>,
        fail: bool,
    ) -> Arc<dyn AuthTokenProvider> {
        Arc::new(FnAuthTokenProvider::new(move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
                if fail {
                    return Err(DriverError::authentication("sso down"));
                }
                Ok(RenewableAuthToken::new(AuthToken::bearer(format!("token-{}", n))))
            }
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_get_fresh_calls_provider_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let holder = Arc::new(AuthTokenHolder::new(counting_provider(calls.clone(), false), Logger::none()));
        assert!(holder.is_token_expired());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let holder = holder.clone();
                tokio::spawn(async move { holder.get_fresh().await })
            })
            .collect();
        let results = futures::future::join_all(tasks).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap(), AuthToken::bearer("token-1"));
        }
        assert!(!holder.is_refreshing());
        assert!(!holder.is_token_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_notifies_all_and_clears_slot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let holder = Arc::new(AuthTokenHolder::new(counting_provider(calls.clone(), true), Logger::none()));

        let first = holder.schedule_refresh();
        let second = holder.schedule_refresh();
        assert!(matches!(first.wait().await, Err(DriverError::Authentication(_))));
        assert!(matches!(second.wait().await, Err(DriverError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!holder.is_refreshing());

        assert!(holder.get_fresh().await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_time_triggers_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let provider = Arc::new(FnAuthTokenProvider::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let token = RenewableAuthToken::new(AuthToken::bearer(format!("t{}", n)));
                // 첫 토큰은 이미 만료된 상태로 발급
                if n == 0 {
                    Ok(token.with_expiration(Utc::now() - chrono::Duration::seconds(1)))
                } else {
                    Ok(token.with_expiration(Utc::now() + chrono::Duration::hours(1)))
                }
            }
        }));
        let holder = Arc::new(AuthTokenHolder::new(provider, Logger::none()));

        assert_eq!(holder.get_fresh().await.unwrap(), AuthToken::bearer("t0"));
        assert!(holder.is_token_expired());
        assert_eq!(holder.get_fresh().await.unwrap(), AuthToken::bearer("t1"));
        assert!(!holder.is_token_expired());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_static_provider_and_mark_expired() {
        let holder = Arc::new(AuthTokenHolder::fixed(AuthToken::basic("neo4j", "pw"), Logger::none()));
        assert_eq!(holder.get(), None);
        assert_eq!(holder.get_fresh().await.unwrap(), AuthToken::basic("neo4j", "pw"));
        assert!(!holder.is_token_expired());

        holder.mark_expired();
        assert!(holder.is_token_expired());
        holder.get_fresh().await.unwrap();
        assert!(!holder.is_token_expired());
    }

    #[tokio::test]
    async fn test_panicking_provider_reports_error() {
        let provider = Arc::new(FnAuthTokenProvider::new(|| async {
            if true {
                panic!("boom");
            }
            Ok(RenewableAuthToken::new(AuthToken::none()))
        }));
        let holder = Arc::new(AuthTokenHolder::new(provider, Logger::none()));
        let err = holder.get_fresh().await.unwrap_err();
        assert!(err.to_string().contains("panicked"));
        assert!(!holder.is_refreshing());
    }
}
