//! Direct Connection Provider
//!
//! 고정 주소 하나로 모든 연결을 보냅니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{handle_security_error, AcquireContext, ConnectionProvider, ProviderCore};
use crate::bolt::AccessMode;
use crate::driver::auth::{AuthToken, AuthTokenHolder, AuthenticationProvider};
use crate::driver::channel::ChannelConnector;
use crate::driver::config::{DriverConfig, ServerAddress};
use crate::driver::connection::{BoltConnection, ConnectionErrorHandler, DelegateConnection, ServerInfo};
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::logging::Logger;
use crate::driver::pool::ConnectionPool;

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// 단일 서버 에러 처리기
struct DirectErrorHandler {
    pool: Arc<ConnectionPool>,
    auth: Arc<AuthenticationProvider>,
}

impl ConnectionErrorHandler for DirectErrorHandler {
    fn handle_error(&self, connection: &Arc<BoltConnection>, error: DriverError) -> DriverError {
        match error.as_server() {
            Some(server) if server.is_security_error() => {
                handle_security_error(&self.auth, &self.pool, connection, server)
            }
            _ => error,
        }
    }
}

/// 단일 서버 연결 제공자
pub struct DirectConnectionProvider {
    id: u64,
    address: ServerAddress,
    core: ProviderCore,
    handler: Arc<DirectErrorHandler>,
}

impl DirectConnectionProvider {
    pub fn new(
        address: ServerAddress,
        connector: Arc<dyn ChannelConnector>,
        holder: Arc<AuthTokenHolder>,
        config: &DriverConfig,
        logger: Logger,
    ) -> Self {
        let core = ProviderCore::new(connector, holder, config, None, logger);
        let handler = Arc::new(DirectErrorHandler {
            pool: core.pool.clone(),
            auth: core.auth.clone(),
        });
        let id = NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed);
        core.logger
            .info(format!("[DirectConnectionProvider {}] created for {}", id, address));
        Self {
            id,
            address,
            core,
            handler,
        }
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.core.pool
    }

    pub fn auth(&self) -> &Arc<AuthenticationProvider> {
        &self.core.auth
    }

    async fn version(&self) -> DriverResult<crate::bolt::BoltVersion> {
        self.core.probe_version(&self.address).await
    }
}

#[async_trait]
impl ConnectionProvider for DirectConnectionProvider {
    async fn acquire_connection(&self, context: AcquireContext) -> DriverResult<DelegateConnection> {
        let handler: Arc<dyn ConnectionErrorHandler> = self.handler.clone();
        self.core
            .acquire_from(&self.address, context.auth.as_ref(), Some(handler))
            .await
    }

    async fn supports_multi_db(&self) -> DriverResult<bool> {
        // 4.0 미만은 협상하지 않음
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
        _database: Option<&str>,
        _access_mode: AccessMode,
    ) -> DriverResult<ServerInfo> {
        self.core.server_info(&self.address).await
    }

    async fn verify_authentication(
        &self,
        auth: Option<&AuthToken>,
        _database: Option<&str>,
        _access_mode: AccessMode,
    ) -> DriverResult<bool> {
        self.core.verify_authentication(&self.address, auth).await
    }

    async fn close(&self) {
        self.core
            .logger
            .debug(format!("[DirectConnectionProvider {}] closing", self.id));
        self.core.pool.close().await;
    }
}

impl std::fmt::Debug for DirectConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectConnectionProvider")
            .field("id", &self.id)
            .field("address", &self.address)
            .finish()
    }
}
