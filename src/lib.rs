//! # Zeta4G Driver Core
//!
//! The connection layer underneath the Zeta4G driver: everything between a
//! session asking for "a connection that can write to database X" and bytes
//! on a socket.
//!
//! ## Features
//!
//! - **Bolt Protocol 4.0 - 5.4** - PackStream codec, chunked framing, version negotiation
//! - **Pipelining** - Requests are written back to back; responses are dispatched in order
//! - **Connection Pooling** - Per-address pools with acquisition timeouts and liveness checks
//! - **Auth Refresh** - Expiring tokens are renewed once, shared by every waiting caller
//! - **Cluster Routing** - Routing tables per database with home database resolution
//!
//! ## Providers
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zeta4g_driver_core::bolt::AccessMode;
//! use zeta4g_driver_core::{
//!     AcquireContext, AuthToken, AuthTokenHolder, ConnectionProvider, DriverConfig, Logger,
//!     RoutingConnectionProvider, ServerAddress, TcpConnector,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DriverConfig::builder()
//!     .with_routing_context("region", "eu-west")
//!     .build()?;
//! let logger = Logger::none();
//! let holder = Arc::new(AuthTokenHolder::fixed(AuthToken::basic("neo4j", "password"), logger.clone()));
//!
//! let provider = RoutingConnectionProvider::new(
//!     ServerAddress::parse("neo4j://cluster.local:7687")?,
//!     Arc::new(TcpConnector::new(&config, logger.clone())),
//!     holder,
//!     &config,
//!     logger,
//! );
//!
//! let connection = provider
//!     .acquire_connection(AcquireContext::new(AccessMode::Write).with_database("movies"))
//!     .await?;
//! connection.release().await;
//! provider.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Authentication
//!
//! ```rust
//! use zeta4g_driver_core::AuthToken;
//!
//! let auth = AuthToken::basic("username", "password");
//! let auth = AuthToken::bearer("my-token");
//! let auth = AuthToken::none();
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Connections, pooling, authentication and providers
//! - [`bolt`] - Low-level Bolt protocol implementation
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    AcquireContext, AuthToken, AuthTokenHolder, Connection, ConnectionProvider, DelegateConnection,
    DirectConnectionProvider, DriverConfig, DriverConfigBuilder, DriverError, DriverResult, Logger,
    RoutingConnectionProvider, ServerAddress, ServerInfo, TcpConnector, TrustStrategy,
};

pub use bolt::{BoltError, BoltVersion, PackStreamValue};

/// Config alias for convenience
pub type Config = DriverConfig;
