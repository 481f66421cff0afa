//! Pooled Connection Factory
//!
//! 채널 열기와 인증을 `connection_timeout` 하나로 묶어 실행합니다.
//! 타임아웃 이후에 늦게 열린 연결은 정리 훅이 닫습니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{BoltConnection, Connection};
use crate::bolt::BoltVersion;
use crate::driver::auth::{AuthToken, AuthenticationProvider};
use crate::driver::channel::ChannelConnector;
use crate::driver::config::{DriverConfig, ServerAddress};
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::job::{run_with_timeout, CancelationToken, Job, JobChain, TimeoutConfig};
use crate::driver::logging::Logger;
use crate::driver::pool::ConnectionFactory;

/// 풀용 연결 팩토리
pub struct PooledConnectionFactory {
    connector: Arc<dyn ChannelConnector>,
    auth: Arc<AuthenticationProvider>,
    connection_timeout: Duration,
    routing_context: Option<HashMap<String, String>>,
    next_id: AtomicU64,
    logger: Logger,
}

impl PooledConnectionFactory {
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        auth: Arc<AuthenticationProvider>,
        config: &DriverConfig,
        logger: Logger,
    ) -> Self {
        Self {
            connector,
            auth,
            connection_timeout: config.connection_timeout,
            routing_context: None,
            next_id: AtomicU64::new(1),
            logger,
        }
    }

    /// HELLO 에 라우팅 컨텍스트 포함 (클러스터 멤버 연결)
    pub fn with_routing_context(mut self, context: HashMap<String, String>) -> Self {
        self.routing_context = Some(context);
        self
    }

    pub fn auth(&self) -> &Arc<AuthenticationProvider> {
        &self.auth
    }

    fn timeout_config(&self, address: &ServerAddress) -> TimeoutConfig {
        let address = address.clone();
        let millis = self.connection_timeout.as_millis();
        TimeoutConfig::new(Some(self.connection_timeout)).with_reason(move || {
            DriverError::service_unavailable(format!(
                "Failed to establish connection to {} in {}ms",
                address, millis
            ))
        })
    }

    fn open_job(&self) -> Job<ServerAddress, Arc<BoltConnection>> {
        let connector = self.connector.clone();
        let routing_context = self.routing_context.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let logger = self.logger.clone();
        Job::new(move |address: ServerAddress, token: CancelationToken| async move {
            token.throw_if_cancelation_requested(None)?;
            let opened = connector.open(&address).await?;
            Ok(BoltConnection::new(id, opened, routing_context, logger))
        })
        .with_on_timeout(|connection: Arc<BoltConnection>| async move { connection.close().await })
    }

    /// 인증 없이 채널만 열어 협상된 버전을 확인하고 닫음
    pub async fn probe_version(&self, address: &ServerAddress) -> DriverResult<BoltVersion> {
        let connection = run_with_timeout(
            self.timeout_config(address),
            JobChain::new(self.open_job()),
            address.clone(),
        )
        .await?;
        let version = connection.protocol_version();
        connection.close().await;
        Ok(version)
    }
}

#[async_trait]
impl ConnectionFactory for PooledConnectionFactory {
    async fn create(&self, address: &ServerAddress, auth: Option<&AuthToken>) -> DriverResult<Arc<BoltConnection>> {
        let provider = self.auth.clone();
        let auth = auth.cloned();
        let authenticate = Job::new(move |connection: Arc<BoltConnection>, token: CancelationToken| async move {
            if let Err(e) = token.throw_if_cancelation_requested(None) {
                connection.close().await;
                return Err(e);
            }
            match provider.authenticate(connection.as_ref(), auth.as_ref()).await {
                Ok(()) => Ok(connection),
                Err(e) => {
                    connection.close().await;
                    Err(e)
                }
            }
        })
        .with_on_timeout(|connection: Arc<BoltConnection>| async move { connection.close().await });

        let chain = JobChain::new(self.open_job()).then(authenticate);
        let result = run_with_timeout(self.timeout_config(address), chain, address.clone()).await;
        if let Err(e) = &result {
            self.logger.warn(format!("Failed to create connection to {}: {}", address, e));
        }
        result
    }

    async fn validate_on_acquire(&self, connection: &Arc<BoltConnection>) -> bool {
        match self.auth.authenticate(connection.as_ref(), None).await {
            Ok(()) => true,
            Err(e) => {
                self.logger.debug(format!(
                    "Connection {} could not be brought to the current auth token: {}",
                    connection.id(),
                    e
                ));
                false
            }
        }
    }

    async fn validate_on_release(&self, connection: &Arc<BoltConnection>) -> bool {
        connection.is_open()
    }
}

impl std::fmt::Debug for PooledConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnectionFactory")
            .field("connection_timeout", &self.connection_timeout)
            .field("routing_context", &self.routing_context)
            .finish()
    }
}
