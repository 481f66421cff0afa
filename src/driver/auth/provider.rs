//! Authentication Provider
//!
//! 연결이 원하는 토큰으로 인증되어 있는지 확인하고, 서버가 토큰을 거부하면
//! 갱신을 예약합니다.

use std::sync::Arc;

use super::{AuthToken, AuthTokenHolder};
use crate::bolt::BoltErrorCode;
use crate::driver::connection::Connection;
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::logging::Logger;

/// 인증 제공자
#[derive(Debug)]
pub struct AuthenticationProvider {
    holder: Arc<AuthTokenHolder>,
    user_agent: String,
    logger: Logger,
}

impl AuthenticationProvider {
    pub fn new(holder: Arc<AuthTokenHolder>, user_agent: impl Into<String>, logger: Logger) -> Self {
        Self {
            holder,
            user_agent: user_agent.into(),
            logger,
        }
    }

    pub fn holder(&self) -> &Arc<AuthTokenHolder> {
        &self.holder
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// 연결이 원하는 토큰을 쓰도록 보장
    ///
    /// `auth` 가 없으면 홀더의 토큰 (만료 시 갱신 후) 을 씁니다.
    /// 이미 같은 토큰이면 아무것도 하지 않습니다.
    pub async fn authenticate(&self, connection: &dyn Connection, auth: Option<&AuthToken>) -> DriverResult<()> {
        let desired = match auth {
            Some(token) => token.clone(),
            None => self.holder.get_fresh().await?,
        };

        let current = connection.auth_token();
        if current.as_ref() == Some(&desired) {
            return Ok(());
        }
        if current.is_some() && !connection.supports_reauth() {
            return Err(DriverError::unsupported(format!(
                "Connection {} on Bolt {} cannot switch credentials",
                connection.id(),
                connection.protocol_version()
            )));
        }

        self.logger.debug(format!(
            "Authenticating connection {} as {} ({})",
            connection.id(),
            desired.principal(),
            desired.scheme()
        ));
        connection.connect(&self.user_agent, &desired).await
    }

    /// 보안 에러 처리
    ///
    /// 연결이 홀더의 현재 토큰을 쓰고 있고 코드가 Unauthorized / TokenExpired
    /// 이면 토큰을 만료로 표시하고 갱신을 예약합니다. 예약했으면 `true`.
    pub fn handle_error(&self, connection: &dyn Connection, code: &str) -> bool {
        if code != BoltErrorCode::UNAUTHORIZED && code != BoltErrorCode::TOKEN_EXPIRED {
            return false;
        }
        if !self.holder.is_renewable() {
            return false;
        }
        let current = self.holder.get();
        if current.is_none() || connection.auth_token() != current {
            return false;
        }

        self.logger.info(format!(
            "Connection {} rejected the current auth token ({}), scheduling refresh",
            connection.id(),
            code
        ));
        self.holder.mark_expired();
        // 결과는 다음 authenticate 가 get_fresh 로 받음
        drop(self.holder.schedule_refresh());
        true
    }
}
