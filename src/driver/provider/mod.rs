//! Connection Providers
//!
//! 세션/트랜잭션 계층이 연결을 얻는 창구입니다.
//!
//! - [`DirectConnectionProvider`] - 고정 주소 하나 (`bolt://`)
//! - [`RoutingConnectionProvider`] - 라우팅 테이블 기반 (`neo4j://`)
//!
//! 두 제공자 모두 풀에서 연결을 빌려 [`DelegateConnection`] 으로 감싸고,
//! 연결에서 올라오는 에러를 자신의 에러 처리기에 통과시킵니다.

mod direct;
mod routing;

pub use direct::DirectConnectionProvider;
pub use routing::RoutingConnectionProvider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bolt::{AccessMode, BoltErrorCode, BoltVersion};
use crate::driver::auth::{AuthToken, AuthTokenHolder, AuthenticationProvider};
use crate::driver::channel::ChannelConnector;
use crate::driver::config::{DriverConfig, ServerAddress};
use crate::driver::connection::{
    BoltConnection, Connection, ConnectionErrorHandler, DelegateConnection, PooledConnectionFactory, Release,
    ServerInfo,
};
use crate::driver::error::{DriverError, DriverResult, ServerError};
use crate::driver::logging::Logger;
use crate::driver::pool::{ConnectionFactory, ConnectionPool, PoolConfig};

// ============================================================================
// AcquireContext - 연결 요청 정보
// ============================================================================

/// 연결 요청 정보
#[derive(Debug, Clone, Default)]
pub struct AcquireContext {
    pub access_mode: AccessMode,
    /// `None` 이면 홈 데이터베이스
    pub database: Option<String>,
    pub bookmarks: Vec<String>,
    pub impersonated_user: Option<String>,
    /// 세션 단위 인증 (드라이버 토큰 대신 사용)
    pub auth: Option<AuthToken>,
}

impl AcquireContext {
    pub fn new(access_mode: AccessMode) -> Self {
        Self {
            access_mode,
            ..Default::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    pub fn with_impersonated_user(mut self, user: impl Into<String>) -> Self {
        self.impersonated_user = Some(user.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthToken) -> Self {
        self.auth = Some(auth);
        self
    }
}

// ============================================================================
// ConnectionProvider - 제공자 인터페이스
// ============================================================================

/// 연결 제공자 인터페이스
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// 연결 획득; 사용 후 반드시 `release()` (또는 drop)
    async fn acquire_connection(&self, context: AcquireContext) -> DriverResult<DelegateConnection>;

    async fn supports_multi_db(&self) -> DriverResult<bool>;

    async fn supports_transaction_config(&self) -> DriverResult<bool>;

    async fn supports_user_impersonation(&self) -> DriverResult<bool>;

    /// 살아 있는 연결의 토큰 교체 (세션 인증) 지원 여부
    async fn supports_session_auth(&self) -> DriverResult<bool>;

    /// 연결 확인 후 서버 정보 반환
    async fn verify_connectivity_and_get_server_info(
        &self,
        database: Option<&str>,
        access_mode: AccessMode,
    ) -> DriverResult<ServerInfo>;

    /// 주어진 토큰으로 인증이 되는지 확인; 보안 에러면 `Ok(false)`
    async fn verify_authentication(
        &self,
        auth: Option<&AuthToken>,
        database: Option<&str>,
        access_mode: AccessMode,
    ) -> DriverResult<bool>;

    /// 풀과 캐시 정리
    async fn close(&self);
}

// ============================================================================
// ProviderCore - 공통 구현
// ============================================================================

/// 두 제공자가 공유하는 풀/인증/기능 확인
pub(crate) struct ProviderCore {
    pub(crate) pool: Arc<ConnectionPool>,
    pub(crate) factory: Arc<PooledConnectionFactory>,
    pub(crate) auth: Arc<AuthenticationProvider>,
    pub(crate) logger: Logger,
}

impl ProviderCore {
    pub(crate) fn new(
        connector: Arc<dyn ChannelConnector>,
        holder: Arc<AuthTokenHolder>,
        config: &DriverConfig,
        routing_context: Option<HashMap<String, String>>,
        logger: Logger,
    ) -> Self {
        let auth = Arc::new(AuthenticationProvider::new(holder, config.user_agent.clone(), logger.clone()));
        let mut factory = PooledConnectionFactory::new(connector, auth.clone(), config, logger.clone());
        if let Some(context) = routing_context {
            factory = factory.with_routing_context(context);
        }
        let factory = Arc::new(factory);
        let pool_factory: Arc<dyn ConnectionFactory> = factory.clone();
        let pool = Arc::new(ConnectionPool::new(PoolConfig::from(config), pool_factory, logger.clone()));
        Self {
            pool,
            factory,
            auth,
            logger,
        }
    }

    /// 풀에서 연결을 빌려 감쌈
    ///
    /// 세션 토큰이 있으면: 재인증을 지원하는 연결은 그 자리에서 LOGON 하고,
    /// 지원하지 않으면 풀 연결을 돌려주고 전용 연결을 새로 만듭니다.
    pub(crate) async fn acquire_from(
        &self,
        address: &ServerAddress,
        auth: Option<&AuthToken>,
        handler: Option<Arc<dyn ConnectionErrorHandler>>,
    ) -> DriverResult<DelegateConnection> {
        let connection = self.pool.acquire(address).await?;
        let Some(token) = auth else {
            return Ok(DelegateConnection::new(connection, handler, Release::Pool(self.pool.clone())));
        };

        if connection.supports_reauth() {
            if let Err(e) = self.auth.authenticate(connection.as_ref(), Some(token)).await {
                self.pool.release(connection).await;
                return Err(e);
            }
            return Ok(DelegateConnection::new(connection, handler, Release::Pool(self.pool.clone())));
        }

        self.logger.debug(format!(
            "Bolt {} at {} cannot re-authenticate, opening a sticky connection",
            connection.protocol_version(),
            address
        ));
        self.pool.release(connection).await;
        let sticky = self.factory.create(address, Some(token)).await?;
        Ok(DelegateConnection::new(sticky, handler, Release::Close))
    }

    /// 풀에 넣지 않는 임시 연결로 버전 확인
    pub(crate) async fn probe_version(&self, address: &ServerAddress) -> DriverResult<BoltVersion> {
        self.factory.probe_version(address).await
    }

    pub(crate) async fn server_info(&self, address: &ServerAddress) -> DriverResult<ServerInfo> {
        let connection = self.pool.acquire(address).await?;
        let info = ServerInfo::of(connection.as_ref());
        self.pool.release(connection).await;
        Ok(info)
    }

    pub(crate) async fn verify_authentication(
        &self,
        address: &ServerAddress,
        auth: Option<&AuthToken>,
    ) -> DriverResult<bool> {
        match self.acquire_from(address, auth, None).await {
            Ok(connection) => {
                connection.release().await;
                Ok(true)
            }
            Err(e) if is_security_error(&e) => {
                self.logger
                    .debug(format!("Authentication against {} failed: {}", address, e));
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn is_security_error(error: &DriverError) -> bool {
    error.as_server().map_or(false, ServerError::is_security_error)
}

/// 보안 에러 공통 처리
///
/// 인증 제공자에 알리고 (갱신을 예약했으면 재시도 가능 표시), 권한 만료면 그
/// 주소의 모든 풀 연결 토큰을 지우고, 문제 연결은 닫습니다.
pub(crate) fn handle_security_error(
    auth: &AuthenticationProvider,
    pool: &ConnectionPool,
    connection: &Arc<BoltConnection>,
    server: &ServerError,
) -> DriverError {
    let mut server = server.clone();
    if auth.handle_error(connection.as_ref(), &server.code) {
        server.retryable = true;
    }
    if server.code == BoltErrorCode::AUTHORIZATION_EXPIRED {
        pool.apply(connection.address(), |c| c.clear_auth_token());
    }

    let connection = connection.clone();
    tokio::spawn(async move { connection.close().await });
    DriverError::Server(server)
}

#[cfg(test)]
pub(crate) mod testing {
    //! 제공자 테스트용 스크립트 서버

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::bolt::message::tag;
    use crate::bolt::{BoltResponse, PackStreamValue, SuccessMessage};

    /// ROUTE 에 답하는 응답기
    pub(crate) fn route_responder(
        table: Vec<(&'static str, Vec<&'static str>)>,
        db: &'static str,
        ttl: i64,
        route_calls: Arc<AtomicUsize>,
    ) -> impl Fn(&crate::bolt::PackStreamStructure) -> Vec<BoltResponse> + Send + Sync + 'static {
        move |request| {
            if request.tag != tag::ROUTE {
                return vec![BoltResponse::Success(SuccessMessage::default())];
            }
            route_calls.fetch_add(1, Ordering::SeqCst);
            let servers = table
                .iter()
                .map(|(role, addresses)| {
                    let mut server = HashMap::new();
                    server.insert("role".to_string(), PackStreamValue::from(*role));
                    server.insert(
                        "addresses".to_string(),
                        PackStreamValue::from(addresses.iter().map(|a| a.to_string()).collect::<Vec<_>>()),
                    );
                    PackStreamValue::Map(server)
                })
                .collect();
            let mut rt = HashMap::new();
            rt.insert("ttl".to_string(), PackStreamValue::Integer(ttl));
            rt.insert("db".to_string(), PackStreamValue::from(db));
            rt.insert("servers".to_string(), PackStreamValue::List(servers));
            vec![BoltResponse::success([("rt", PackStreamValue::Map(rt))])]
        }
    }
}
