//! Connection
//!
//! 협상된 Bolt 세션 하나를 나타냅니다.
//!
//! - [`BoltConnection`] - 채널 위의 실제 연결 (초기화, 요청/응답 상관, 종료)
//! - [`DelegateConnection`] - 호출자에게 빌려주는 래퍼; 에러 처리기와 반납 방식을 가짐
//! - [`PooledConnectionFactory`] - 풀이 새 연결을 만들 때 쓰는 팩토리
//!
//! 모든 변형은 [`Connection`] 트레이트를 구현합니다.

mod bolt;
mod delegate;
mod factory;
mod protocol;

pub use self::bolt::BoltConnection;
pub use delegate::{ConnectionErrorHandler, DelegateConnection, Release};
pub use factory::PooledConnectionFactory;
pub use protocol::{protocol_for, BoltProtocol, BoltProtocolV4, BoltProtocolV5, RouteRequest};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::bolt::{BoltRequest, BoltVersion};

use super::auth::AuthToken;
use super::config::ServerAddress;
use super::error::DriverResult;
use super::response_handler::ResponseObserver;

// ============================================================================
// Connection - 연결 인터페이스
// ============================================================================

/// 연결 인터페이스
#[async_trait]
pub trait Connection: Send + Sync {
    /// 드라이버가 붙인 연결 번호
    fn id(&self) -> u64;

    /// 서버가 알려준 연결 ID (`bolt-123`)
    fn server_id(&self) -> Option<String>;

    fn address(&self) -> &ServerAddress;

    /// 협상된 프로토콜 버전 (연결 수명 동안 불변)
    fn protocol_version(&self) -> BoltVersion;

    /// 서버 에이전트 (`Neo4j/5.13.0`)
    fn server_agent(&self) -> Option<String>;

    /// 현재 연결에 적용된 토큰
    fn auth_token(&self) -> Option<AuthToken>;

    fn created_at(&self) -> Instant;

    fn is_open(&self) -> bool;

    /// 살아 있는 연결에서 토큰 교체 가능 여부
    fn supports_reauth(&self) -> bool;

    /// 초기화 (첫 호출) 또는 재인증 (이후 호출)
    async fn connect(&self, user_agent: &str, token: &AuthToken) -> DriverResult<()>;

    /// 요청을 인코딩해 쓰고 옵저버를 응답 큐에 등록
    async fn write(
        &self,
        request: BoltRequest,
        observer: Box<dyn ResponseObserver>,
        flush: bool,
    ) -> DriverResult<()>;

    /// RESET 을 보내고 SUCCESS 를 기다림
    async fn reset_and_flush(&self) -> DriverResult<()>;

    /// 연결 종료 (여러 번 호출해도 안전)
    async fn close(&self);
}

/// 서버 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub address: ServerAddress,
    pub agent: Option<String>,
    pub protocol_version: BoltVersion,
}

impl ServerInfo {
    pub fn of(connection: &dyn Connection) -> Self {
        Self {
            address: connection.address().clone(),
            agent: connection.server_agent(),
            protocol_version: connection.protocol_version(),
        }
    }
}
