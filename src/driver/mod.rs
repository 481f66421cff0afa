//! Driver Module
//!
//! Bolt 클라이언트 연결 계층
//!
//! # Layers
//!
//! - channel: 바이트 전송, 프레이밍, 수신 타임아웃 (TCP / TLS)
//! - connection: HELLO/LOGON, 요청 파이프라이닝, 재인증, 라우팅 테이블 조회
//! - response_handler: 요청 순서대로 응답을 옵저버에 분배
//! - job: 취소 가능한 작업 체인과 타임아웃
//! - auth: 만료되는 토큰의 단일 갱신 캐시와 연결 인증
//! - pool: 주소별 연결 풀
//! - provider: 직접 연결 (`bolt://`) / 라우팅 연결 (`neo4j://`)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zeta4g_driver_core::driver::{
//!     AcquireContext, AuthToken, AuthTokenHolder, ConnectionProvider, DirectConnectionProvider,
//!     DriverConfig, LogLevel, Logger, ServerAddress, TcpConnector,
//! };
//! use zeta4g_driver_core::bolt::AccessMode;
//!
//! let config = DriverConfig::default();
//! let logger = Logger::tracing(LogLevel::Info);
//! let holder = Arc::new(AuthTokenHolder::fixed(AuthToken::basic("neo4j", "password"), logger.clone()));
//! let connector = Arc::new(TcpConnector::new(&config, logger.clone()));
//!
//! let provider = DirectConnectionProvider::new(
//!     ServerAddress::new("localhost", 7687),
//!     connector,
//!     holder,
//!     &config,
//!     logger,
//! );
//! let connection = provider.acquire_connection(AcquireContext::new(AccessMode::Read)).await?;
//! // ...
//! connection.release().await;
//! provider.close().await;
//! ```

pub mod auth;
pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod home_db;
pub mod job;
pub mod logging;
pub mod pool;
pub mod provider;
pub mod response_handler;
pub mod routing;

// Re-exports
pub use auth::{
    AuthToken, AuthTokenHolder, AuthTokenProvider, AuthenticationProvider, FnAuthTokenProvider,
    RenewableAuthToken, StaticAuthTokenProvider,
};
pub use channel::{Channel, ChannelConnector, OpenedChannel, TcpConnector};
pub use config::{DriverConfig, DriverConfigBuilder, ServerAddress, TrustStrategy};
pub use connection::{BoltConnection, Connection, DelegateConnection, ServerInfo};
pub use error::{DriverError, DriverResult, ServerError};
pub use home_db::HomeDatabaseCache;
pub use job::{run_with_timeout, CancelationToken, Job, JobChain, TimeoutConfig};
pub use logging::{LogLevel, Logger};
pub use pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolConfigBuilder, PoolMetrics};
pub use provider::{AcquireContext, ConnectionProvider, DirectConnectionProvider, RoutingConnectionProvider};
pub use response_handler::{ResponseCollector, ResponseHandler, ResponseObserver};
pub use routing::{RoutingPolicy, RoutingTable};
