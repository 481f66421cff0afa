//! Delegate Connection
//!
//! 호출자에게 빌려주는 연결입니다. 실제 [`BoltConnection`] 을 감싸고,
//! 응답 에러를 제공자의 에러 처리기에 통과시키며, 반납 방식 (풀 / 닫기)
//! 을 기억합니다.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{BoltConnection, Connection};
use crate::bolt::{BoltRequest, BoltVersion, PackStreamValue, SuccessMessage};
use crate::driver::auth::AuthToken;
use crate::driver::config::ServerAddress;
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::pool::ConnectionPool;
use crate::driver::response_handler::ResponseObserver;

/// 연결 에러 처리기
///
/// 처리기는 부수 효과 (라우팅 테이블 갱신, 토큰 갱신 예약 등) 를 수행하고
/// 호출자에게 보일 에러를 반환합니다.
pub trait ConnectionErrorHandler: Send + Sync {
    fn handle_error(&self, connection: &Arc<BoltConnection>, error: DriverError) -> DriverError;
}

/// 반납 방식
pub enum Release {
    /// 풀로 반납 (RESET 후 재사용)
    Pool(Arc<ConnectionPool>),
    /// 전용 (sticky) 연결: 반납 시 닫음
    Close,
}

impl std::fmt::Debug for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Release::Pool(_) => f.write_str("Release::Pool"),
            Release::Close => f.write_str("Release::Close"),
        }
    }
}

/// 위임 연결
pub struct DelegateConnection {
    inner: Arc<BoltConnection>,
    error_handler: Option<Arc<dyn ConnectionErrorHandler>>,
    release: Mutex<Option<Release>>,
}

impl DelegateConnection {
    pub fn new(
        inner: Arc<BoltConnection>,
        error_handler: Option<Arc<dyn ConnectionErrorHandler>>,
        release: Release,
    ) -> Self {
        Self {
            inner,
            error_handler,
            release: Mutex::new(Some(release)),
        }
    }

    pub fn inner(&self) -> &Arc<BoltConnection> {
        &self.inner
    }

    /// 전용 연결 여부
    pub fn is_sticky(&self) -> bool {
        matches!(*self.release.lock(), Some(Release::Close))
    }

    /// 연결 반납 (여러 번 호출해도 한 번만 수행)
    pub async fn release(&self) {
        let release = self.release.lock().take();
        match release {
            Some(Release::Pool(pool)) => pool.release(self.inner.clone()).await,
            Some(Release::Close) => self.inner.close().await,
            None => {}
        }
    }

    fn handle(&self, error: DriverError) -> DriverError {
        match &self.error_handler {
            Some(handler) => handler.handle_error(&self.inner, error),
            None => error,
        }
    }
}

/// 에러를 처리기에 통과시키는 옵저버
struct HandledObserver {
    observer: Box<dyn ResponseObserver>,
    connection: Arc<BoltConnection>,
    handler: Arc<dyn ConnectionErrorHandler>,
}

impl ResponseObserver for HandledObserver {
    fn on_record(&mut self, fields: Vec<PackStreamValue>) {
        self.observer.on_record(fields);
    }

    fn on_completed(&mut self, metadata: SuccessMessage) {
        self.observer.on_completed(metadata);
    }

    fn on_error(&mut self, error: DriverError) {
        let error = self.handler.handle_error(&self.connection, error);
        self.observer.on_error(error);
    }
}

#[async_trait]
impl Connection for DelegateConnection {
    fn id(&self) -> u64 {
        self.inner.id()
    }

    fn server_id(&self) -> Option<String> {
        self.inner.server_id()
    }

    fn address(&self) -> &ServerAddress {
        self.inner.address()
    }

    fn protocol_version(&self) -> BoltVersion {
        self.inner.protocol_version()
    }

    fn server_agent(&self) -> Option<String> {
        self.inner.server_agent()
    }

    fn auth_token(&self) -> Option<AuthToken> {
        self.inner.auth_token()
    }

    fn created_at(&self) -> Instant {
        self.inner.created_at()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn supports_reauth(&self) -> bool {
        self.inner.supports_reauth()
    }

    async fn connect(&self, user_agent: &str, token: &AuthToken) -> DriverResult<()> {
        self.inner
            .connect(user_agent, token)
            .await
            .map_err(|e| self.handle(e))
    }

    async fn write(
        &self,
        request: BoltRequest,
        observer: Box<dyn ResponseObserver>,
        flush: bool,
    ) -> DriverResult<()> {
        let observer: Box<dyn ResponseObserver> = match &self.error_handler {
            Some(handler) => Box::new(HandledObserver {
                observer,
                connection: self.inner.clone(),
                handler: handler.clone(),
            }),
            None => observer,
        };
        self.inner.write(request, observer, flush).await
    }

    async fn reset_and_flush(&self) -> DriverResult<()> {
        self.inner.reset_and_flush().await.map_err(|e| self.handle(e))
    }

    /// 실제 연결을 닫고 풀의 자리를 돌려줌
    async fn close(&self) {
        self.inner.close().await;
        self.release().await;
    }
}

impl Drop for DelegateConnection {
    fn drop(&mut self) {
        let Some(release) = self.release.get_mut().take() else {
            return;
        };
        let inner = self.inner.clone();
        // 런타임 밖에서 버려진 경우 연결은 그대로 버려짐
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                match release {
                    Release::Pool(pool) => pool.release(inner).await,
                    Release::Close => inner.close().await,
                }
            });
        }
    }
}

impl std::fmt::Debug for DelegateConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateConnection")
            .field("inner", &self.inner)
            .field("release", &*self.release.lock())
            .finish()
    }
}
