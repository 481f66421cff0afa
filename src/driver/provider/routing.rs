//! Routing Connection Provider
//!
//! 데이터베이스별 라우팅 테이블을 유지하며 읽기/쓰기 연결을 적절한 서버로
//! 보냅니다.
//!
//! - 테이블이 만료되었거나 필요한 역할의 서버가 없으면 라우터에 ROUTE 를 보내
//!   갱신합니다. 알려진 라우터가 모두 실패하면 초기 (seed) 라우터를 시도합니다.
//! - 데이터베이스를 지정하지 않은 요청은 홈 데이터베이스로 가며, 그 이름은
//!   [`HomeDatabaseCache`] 에 짧게 저장됩니다.
//! - 연결 에러로 서버가 사라진 것이 확인되면 테이블에서 빼고 풀을 비웁니다.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{handle_security_error, is_security_error, AcquireContext, ConnectionProvider, ProviderCore};
use crate::bolt::{AccessMode, BoltErrorCode, BoltVersion};
use crate::driver::auth::{AuthToken, AuthTokenHolder, AuthenticationProvider};
use crate::driver::channel::ChannelConnector;
use crate::driver::config::{DriverConfig, ServerAddress};
use crate::driver::connection::{
    BoltConnection, Connection, ConnectionErrorHandler, DelegateConnection, RouteRequest, ServerInfo,
};
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::home_db::HomeDatabaseCache;
use crate::driver::logging::Logger;
use crate::driver::pool::ConnectionPool;
use crate::driver::routing::{RoutingTable, ServerSelector};

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// 데이터베이스 이름 (`None` 은 이름을 알려주지 않는 서버의 기본 데이터베이스)
type TableKey = Option<String>;
type Tables = Arc<Mutex<HashMap<TableKey, RoutingTable>>>;

// ============================================================================
// RoutingErrorHandler - 라우팅 에러 처리
// ============================================================================

struct RoutingErrorHandler {
    tables: Tables,
    database: TableKey,
    pool: Arc<ConnectionPool>,
    auth: Arc<AuthenticationProvider>,
    logger: Logger,
}

impl RoutingErrorHandler {
    fn forget(&self, address: &ServerAddress) {
        if let Some(table) = self.tables.lock().get_mut(&self.database) {
            table.forget(address);
        }
        let pool = self.pool.clone();
        let address = address.clone();
        tokio::spawn(async move { pool.purge(&address).await });
    }

    fn forget_writer(&self, address: &ServerAddress) {
        if let Some(table) = self.tables.lock().get_mut(&self.database) {
            table.forget_writer(address);
        }
    }
}

impl ConnectionErrorHandler for RoutingErrorHandler {
    fn handle_error(&self, connection: &Arc<BoltConnection>, error: DriverError) -> DriverError {
        let address = connection.address();
        match &error {
            DriverError::ServiceUnavailable(_) | DriverError::SessionExpired(_) => {
                self.logger
                    .warn(format!("Server {} is no longer available: {}", address, error));
                self.forget(address);
                DriverError::session_expired(format!("Server at {} is no longer available", address))
            }
            DriverError::Server(server)
                if server.code == BoltErrorCode::NOT_A_LEADER
                    || server.code == BoltErrorCode::FORBIDDEN_ON_READ_ONLY_DATABASE =>
            {
                self.logger
                    .info(format!("Server {} no longer accepts writes ({})", address, server.code));
                self.forget_writer(address);
                DriverError::session_expired(format!(
                    "No longer possible to write to server at {}",
                    address
                ))
            }
            DriverError::Server(server) if server.is_security_error() => {
                handle_security_error(&self.auth, &self.pool, connection, server)
            }
            _ => error,
        }
    }
}

// ============================================================================
// RoutingConnectionProvider - 라우팅 연결 제공자
// ============================================================================

/// 라우팅 연결 제공자
pub struct RoutingConnectionProvider {
    id: u64,
    seed_router: ServerAddress,
    routing_context: HashMap<String, String>,
    core: ProviderCore,
    tables: Tables,
    /// 테이블 갱신 직렬화
    refresh_lock: tokio::sync::Mutex<()>,
    home_db: HomeDatabaseCache,
    selector: ServerSelector,
}

impl RoutingConnectionProvider {
    pub fn new(
        seed_router: ServerAddress,
        connector: Arc<dyn ChannelConnector>,
        holder: Arc<AuthTokenHolder>,
        config: &DriverConfig,
        logger: Logger,
    ) -> Self {
        let mut routing_context = config.routing_context.clone();
        routing_context
            .entry("address".to_string())
            .or_insert_with(|| seed_router.to_string());

        let core = ProviderCore::new(connector, holder, config, Some(routing_context.clone()), logger);
        let id = NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed);
        core.logger
            .info(format!("[RoutingConnectionProvider {}] created with seed router {}", id, seed_router));
        Self {
            id,
            seed_router,
            routing_context,
            core,
            tables: Arc::new(Mutex::new(HashMap::new())),
            refresh_lock: tokio::sync::Mutex::new(()),
            home_db: HomeDatabaseCache::new(config.max_home_database_delay, config.max_home_database_entries),
            selector: ServerSelector::new(config.load_balancing),
        }
    }

    fn prefix(&self) -> String {
        format!("[RoutingConnectionProvider {}]", self.id)
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.core.pool
    }

    pub fn home_database_cache(&self) -> &HomeDatabaseCache {
        &self.home_db
    }

    /// 현재 테이블 사본
    pub fn routing_table(&self, database: Option<&str>) -> Option<RoutingTable> {
        self.tables.lock().get(&database.map(String::from)).cloned()
    }

    /// 해당 모드로 쓸 수 있는 테이블 반환 (필요하면 갱신)
    pub async fn fresh_routing_table(&self, context: &AcquireContext) -> DriverResult<RoutingTable> {
        let database = match &context.database {
            Some(database) => Some(database.clone()),
            None => self.home_database(context),
        };

        let _guard = self.refresh_lock.lock().await;
        let current = self.tables.lock().get(&database).cloned();
        if let Some(table) = &current {
            if !table.is_stale_for(context.access_mode) {
                return Ok(table.clone());
            }
        }

        self.core.logger.debug(format!(
            "{} refreshing routing table for {}",
            self.prefix(),
            database.as_deref().unwrap_or("<home>")
        ));
        let table = self
            .refresh(database.as_deref(), current.as_ref(), context)
            .await?;

        if context.database.is_none() {
            if let (Some(home), Some(auth)) = (&table.database, self.cache_auth(context)) {
                self.home_db
                    .set(&auth, context.impersonated_user.as_deref(), home.clone());
            }
        }
        self.store(table.clone()).await;
        Ok(table)
    }

    fn home_database(&self, context: &AcquireContext) -> Option<String> {
        let auth = self.cache_auth(context)?;
        self.home_db.get(&auth, context.impersonated_user.as_deref())
    }

    /// 홈 데이터베이스 캐시 키에 쓰는 토큰 (세션 토큰 우선)
    ///
    /// 아직 받아온 토큰이 없으면 `None`; 이때는 캐시를 건너뜀
    fn cache_auth(&self, context: &AcquireContext) -> Option<AuthToken> {
        context.auth.clone().or_else(|| self.core.auth.holder().get())
    }

    async fn refresh(
        &self,
        database: Option<&str>,
        current: Option<&RoutingTable>,
        context: &AcquireContext,
    ) -> DriverResult<RoutingTable> {
        let mut routers: Vec<ServerAddress> = current.map(|t| t.routers.clone()).unwrap_or_default();
        if !routers.contains(&self.seed_router) {
            routers.push(self.seed_router.clone());
        }

        let mut last_error = None;
        for router in routers {
            match self.fetch_from(&router, database, context).await {
                Ok(table) => {
                    self.core.logger.debug(format!(
                        "{} updated routing table from {}: {:?}",
                        self.prefix(),
                        router,
                        table
                    ));
                    return Ok(table);
                }
                // 자격 증명이나 데이터베이스 문제는 다른 라우터에서도 같음
                Err(e) if e.as_server().map_or(false, |s| s.is_client_error()) => return Err(e),
                Err(e) => {
                    self.core
                        .logger
                        .warn(format!("{} routing table fetch from {} failed: {}", self.prefix(), router, e));
                    if let Some(table) = self.tables.lock().get_mut(&database.map(String::from)) {
                        table.forget_router(&router);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(DriverError::service_unavailable(format!(
            "Could not perform discovery. No routing servers available.{}",
            last_error.map(|e| format!(" Last error: {}", e)).unwrap_or_default()
        )))
    }

    async fn fetch_from(
        &self,
        router: &ServerAddress,
        database: Option<&str>,
        context: &AcquireContext,
    ) -> DriverResult<RoutingTable> {
        let connection = self
            .core
            .acquire_from(router, context.auth.as_ref(), None)
            .await?;
        let result = connection
            .inner()
            .fetch_routing_table(RouteRequest {
                routing_context: &self.routing_context,
                bookmarks: &context.bookmarks,
                database,
                impersonated_user: context.impersonated_user.as_deref(),
            })
            .await;
        connection.release().await;
        result
    }

    /// 테이블 저장 후 어떤 테이블에도 없는 주소의 풀 정리
    async fn store(&self, table: RoutingTable) {
        let keep: HashSet<ServerAddress> = {
            let mut tables = self.tables.lock();
            tables.insert(table.database.clone(), table);
            tables
                .values()
                .flat_map(|t| t.all_servers())
                .chain(std::iter::once(self.seed_router.clone()))
                .collect()
        };
        self.core.pool.keep_all(&keep).await;
    }

    fn select(&self, table: &RoutingTable, mode: AccessMode) -> Option<ServerAddress> {
        let pool = &self.core.pool;
        let in_use = |address: &ServerAddress| pool.active_count(address);
        match mode {
            AccessMode::Read => self.selector.select_reader(&table.readers, in_use),
            AccessMode::Write => self.selector.select_writer(&table.writers, in_use),
        }
    }

    fn handler(&self, database: TableKey) -> Arc<dyn ConnectionErrorHandler> {
        Arc::new(RoutingErrorHandler {
            tables: self.tables.clone(),
            database,
            pool: self.core.pool.clone(),
            auth: self.core.auth.clone(),
            logger: self.core.logger.clone(),
        })
    }

    async fn acquire_on(
        &self,
        table: &RoutingTable,
        context: &AcquireContext,
    ) -> DriverResult<DelegateConnection> {
        let address = self.select(table, context.access_mode).ok_or_else(|| {
            DriverError::session_expired(format!(
                "Failed to obtain connection towards {} server. Known routing table is: {:?}",
                match context.access_mode {
                    AccessMode::Read => "READ",
                    AccessMode::Write => "WRITE",
                },
                table
            ))
        })?;

        let handler = self.handler(table.database.clone());
        match self
            .core
            .acquire_from(&address, context.auth.as_ref(), Some(handler))
            .await
        {
            Ok(connection) => Ok(connection),
            Err(e @ DriverError::ServiceUnavailable(_)) => {
                self.core
                    .logger
                    .warn(format!("{} failed to connect to {}: {}", self.prefix(), address, e));
                if let Some(t) = self.tables.lock().get_mut(&table.database) {
                    t.forget(&address);
                }
                self.core.pool.purge(&address).await;
                Err(DriverError::session_expired(format!(
                    "Server at {} is no longer available",
                    address
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// 기능 확인용 버전: 알려진 서버부터 시도하고 마지막에 seed 라우터
    async fn version(&self) -> DriverResult<BoltVersion> {
        let mut candidates: Vec<ServerAddress> = self
            .tables
            .lock()
            .values()
            .flat_map(|t| t.all_servers())
            .collect();
        candidates.sort();
        candidates.dedup();
        candidates.retain(|a| a != &self.seed_router);
        candidates.push(self.seed_router.clone());

        let mut last_error = None;
        for address in candidates {
            match self.core.probe_version(&address).await {
                Ok(version) => return Ok(version),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| DriverError::service_unavailable("No servers to probe")))
    }
}

#[async_trait]
impl ConnectionProvider for RoutingConnectionProvider {
    async fn acquire_connection(&self, context: AcquireContext) -> DriverResult<DelegateConnection> {
        let table = self.fresh_routing_table(&context).await?;
        self.acquire_on(&table, &context).await
    }

    async fn supports_multi_db(&self) -> DriverResult<bool> {
        self.version().await.map(|_| true)
    }

    async fn supports_transaction_config(&self) -> DriverResult<bool> {
        self.version().await.map(|_| true)
    }

    async fn supports_user_impersonation(&self) -> DriverResult<bool> {
        Ok(self.version().await?.supports_impersonation())
    }

    async fn supports_session_auth(&self) -> DriverResult<bool> {
        Ok(self.version().await?.supports_logon())
    }

    async fn verify_connectivity_and_get_server_info(
        &self,
        database: Option<&str>,
        access_mode: AccessMode,
    ) -> DriverResult<ServerInfo> {
        let mut context = AcquireContext::new(access_mode);
        context.database = database.map(String::from);
        let table = self.fresh_routing_table(&context).await?;
        let servers = table.servers_for(access_mode);
        if servers.is_empty() {
            return Err(DriverError::session_expired(format!(
                "No servers available for {:?} in routing table {:?}",
                access_mode, table
            )));
        }

        let mut last_error = None;
        for address in servers {
            match self.core.server_info(address).await {
                Ok(info) => return Ok(info),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| DriverError::service_unavailable("No servers reachable")))
    }

    async fn verify_authentication(
        &self,
        auth: Option<&AuthToken>,
        database: Option<&str>,
        access_mode: AccessMode,
    ) -> DriverResult<bool> {
        let mut context = AcquireContext::new(access_mode);
        context.database = database.map(String::from);
        context.auth = auth.cloned();

        let table = match self.fresh_routing_table(&context).await {
            Ok(table) => table,
            Err(e) if is_security_error(&e) => return Ok(false),
            Err(e) => return Err(e),
        };
        let address = self.select(&table, access_mode).ok_or_else(|| {
            DriverError::session_expired(format!("No servers available for {:?}", access_mode))
        })?;
        self.core.verify_authentication(&address, auth).await
    }

    async fn close(&self) {
        self.core.logger.debug(format!("{} closing", self.prefix()));
        self.tables.lock().clear();
        self.home_db.clear_cache();
        self.core.pool.close().await;
    }
}

impl std::fmt::Debug for RoutingConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingConnectionProvider")
            .field("id", &self.id)
            .field("seed_router", &self.seed_router)
            .field("tables", &self.tables.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::{BoltError, BoltRequest, BoltResponse, RunMessage};
    use crate::driver::channel::testing::{ScriptedChannel, ScriptedConnector};
    use crate::driver::provider::testing::route_responder;
    use crate::driver::response_handler::ResponseCollector;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn seed() -> ServerAddress {
        ServerAddress::new("router", 7687)
    }

    fn cluster(version: BoltVersion, ttl: i64) -> (Arc<ScriptedConnector>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let connector = ScriptedConnector::new(version).with_setup(move |channel| {
            channel.set_responder(route_responder(
                vec![
                    ("ROUTE", vec!["router:7687"]),
                    ("WRITE", vec!["writer:7687"]),
                    ("READ", vec!["reader1:7687", "reader2:7687"]),
                ],
                "neo4j",
                ttl,
                counter.clone(),
            ));
        });
        (Arc::new(connector), calls)
    }

    fn provider(connector: Arc<ScriptedConnector>) -> RoutingConnectionProvider {
        let holder = Arc::new(AuthTokenHolder::fixed(AuthToken::basic("neo4j", "pw"), Logger::none()));
        let config = DriverConfig::builder()
            .with_routing_context("region", "eu")
            .build()
            .unwrap();
        RoutingConnectionProvider::new(seed(), connector, holder, &config, Logger::none())
    }

    fn channel_for(connector: &ScriptedConnector, address: &ServerAddress) -> Arc<ScriptedChannel> {
        connector
            .channels()
            .into_iter()
            .rev()
            .find(|c| crate::driver::channel::Channel::address(c.as_ref()) == address)
            .unwrap()
    }

    #[tokio::test]
    async fn test_read_and_write_go_to_their_roles() {
        let (connector, _calls) = cluster(BoltVersion::V5_1, 300);
        let provider = provider(connector);

        let reader = provider
            .acquire_connection(AcquireContext::new(AccessMode::Read))
            .await
            .unwrap();
        assert!(reader.address().host.starts_with("reader"));

        let writer = provider
            .acquire_connection(AcquireContext::new(AccessMode::Write))
            .await
            .unwrap();
        assert_eq!(writer.address(), &ServerAddress::new("writer", 7687));
    }

    #[tokio::test]
    async fn test_home_database_is_resolved_and_cached() {
        let (connector, calls) = cluster(BoltVersion::V5_1, 300);
        let provider = provider(connector);

        let connection = provider
            .acquire_connection(AcquireContext::new(AccessMode::Read))
            .await
            .unwrap();
        connection.release().await;

        let auth = AuthToken::basic("neo4j", "pw");
        assert_eq!(provider.home_database_cache().get(&auth, None), Some("neo4j".to_string()));
        assert!(provider.routing_table(Some("neo4j")).is_some());

        let again = provider
            .acquire_connection(AcquireContext::new(AccessMode::Read))
            .await
            .unwrap();
        again.release().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_home_database_lookup_waits_for_a_known_token() {
        let (connector, calls) = cluster(BoltVersion::V5_1, 300);
        let provider = provider(connector.clone());
        // 토큰을 받기 전에는 기본 토큰 키로 조회하지 않음
        provider
            .home_database_cache()
            .set(&AuthToken::default(), None, "stale");

        let connection = provider
            .acquire_connection(AcquireContext::new(AccessMode::Read))
            .await
            .unwrap();
        connection.release().await;

        let route = channel_for(&connector, &seed())
            .written()
            .into_iter()
            .find(|s| s.tag == crate::bolt::message::tag::ROUTE)
            .unwrap();
        assert!(route.fields[2].as_map().unwrap().get("db").is_none());
        assert!(provider.routing_table(Some("stale")).is_none());

        let auth = AuthToken::basic("neo4j", "pw");
        assert_eq!(provider.home_database_cache().get(&auth, None), Some("neo4j".to_string()));

        provider
            .acquire_connection(AcquireContext::new(AccessMode::Read))
            .await
            .unwrap()
            .release()
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_table_is_refreshed() {
        let (connector, calls) = cluster(BoltVersion::V5_1, 10);
        let provider = provider(connector);
        let context = AcquireContext::new(AccessMode::Write).with_database("neo4j");

        provider.acquire_connection(context.clone()).await.unwrap().release().await;
        provider.acquire_connection(context.clone()).await.unwrap().release().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        provider.acquire_connection(context).await.unwrap().release().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_route_request_carries_context() {
        let (connector, _calls) = cluster(BoltVersion::V4_4, 300);
        let provider = provider(connector.clone());
        let context = AcquireContext::new(AccessMode::Read)
            .with_database("movies")
            .with_bookmarks(vec!["bm:1".to_string()]);

        provider.acquire_connection(context).await.unwrap().release().await;

        let route = channel_for(&connector, &seed())
            .written()
            .into_iter()
            .find(|s| s.tag == crate::bolt::message::tag::ROUTE)
            .unwrap();
        let routing = route.fields[0].as_map().unwrap();
        assert_eq!(routing.get("region").and_then(|v| v.as_str()), Some("eu"));
        assert_eq!(routing.get("address").and_then(|v| v.as_str()), Some("router:7687"));
        assert_eq!(route.fields[1].string_list(), vec!["bm:1".to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_server_is_forgotten() {
        let (connector, _calls) = cluster(BoltVersion::V5_1, 300);
        let provider = provider(connector.clone());
        let context = AcquireContext::new(AccessMode::Read).with_database("neo4j");

        let reader = provider.acquire_connection(context).await.unwrap();
        let address = reader.address().clone();
        let channel = channel_for(&connector, &address);
        channel.hold_replies();

        let (observer, pending) = ResponseCollector::boxed();
        reader
            .write(BoltRequest::Run(RunMessage::new("RETURN 1")), observer, true)
            .await
            .unwrap();
        channel.fail(BoltError::ConnectionClosed);

        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, DriverError::SessionExpired(_)));
        let table = provider.routing_table(Some("neo4j")).unwrap();
        assert!(!table.readers.contains(&address));
        assert_eq!(table.readers.len(), 1);
    }

    #[tokio::test]
    async fn test_not_a_leader_forgets_writer() {
        let (connector, _calls) = cluster(BoltVersion::V5_1, 300);
        let provider = provider(connector.clone());
        let context = AcquireContext::new(AccessMode::Write).with_database("neo4j");

        let writer = provider.acquire_connection(context).await.unwrap();
        channel_for(&connector, writer.address())
            .reply_next(vec![BoltResponse::failure(BoltErrorCode::NOT_A_LEADER, "not a leader")]);

        let (observer, pending) = ResponseCollector::boxed();
        writer
            .write(BoltRequest::Run(RunMessage::new("CREATE ()")), observer, true)
            .await
            .unwrap();
        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, DriverError::SessionExpired(_)));
        assert!(provider.routing_table(Some("neo4j")).unwrap().writers.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_reader_is_forgotten_on_acquire() {
        let (connector, _calls) = cluster(BoltVersion::V5_1, 300);
        connector.set_unreachable(ServerAddress::new("reader1", 7687));
        connector.set_unreachable(ServerAddress::new("reader2", 7687));
        let provider = provider(connector);
        let context = AcquireContext::new(AccessMode::Read).with_database("neo4j");

        let err = provider.acquire_connection(context).await.unwrap_err();
        assert!(matches!(err, DriverError::SessionExpired(_)));
        assert_eq!(provider.routing_table(Some("neo4j")).unwrap().readers.len(), 1);
    }

    #[tokio::test]
    async fn test_no_routers_available() {
        let (connector, _calls) = cluster(BoltVersion::V5_1, 300);
        connector.set_unreachable(seed());
        let provider = provider(connector);

        let err = provider
            .acquire_connection(AcquireContext::new(AccessMode::Read))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_discovery_security_error_is_not_retried() {
        let connector = Arc::new(ScriptedConnector::new(BoltVersion::V4_4).with_setup(|channel| {
            channel.reply_next(vec![BoltResponse::failure(BoltErrorCode::UNAUTHORIZED, "bad credentials")]);
        }));
        let provider = provider(connector.clone());

        let err = provider
            .acquire_connection(AcquireContext::new(AccessMode::Read))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(BoltErrorCode::UNAUTHORIZED));
        assert_eq!(connector.opened(), 1);
        assert!(!provider
            .verify_authentication(None, None, AccessMode::Read)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_feature_detection_and_server_info() {
        let (connector, _calls) = cluster(BoltVersion::V4_3, 300);
        let provider = provider(connector);

        assert!(provider.supports_multi_db().await.unwrap());
        assert!(!provider.supports_user_impersonation().await.unwrap());
        assert!(!provider.supports_session_auth().await.unwrap());

        let info = provider
            .verify_connectivity_and_get_server_info(Some("neo4j"), AccessMode::Write)
            .await
            .unwrap();
        assert_eq!(info.address, ServerAddress::new("writer", 7687));
        assert_eq!(info.protocol_version, BoltVersion::V4_3);
    }

    #[tokio::test]
    async fn test_close_clears_state() {
        let (connector, _calls) = cluster(BoltVersion::V5_1, 300);
        let provider = provider(connector);
        provider
            .acquire_connection(AcquireContext::new(AccessMode::Read))
            .await
            .unwrap()
            .release()
            .await;

        provider.close().await;
        assert!(provider.routing_table(Some("neo4j")).is_none());
        assert!(provider.home_database_cache().is_empty());
        assert!(provider.pool().is_closed());
    }
}
