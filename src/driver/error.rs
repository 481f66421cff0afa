//! Driver Error Types
//!
//! 드라이버 에러 정의
//!
//! 전송 실패는 `ServiceUnavailable`, 잘못된 응답은 `Protocol`, 서버가 보낸
//! FAILURE 는 `Server` 로 분류됩니다. 하나의 결과를 여러 구독자에게 전달해야
//! 하므로 (토큰 갱신, 끊어진 연결의 대기 중 옵저버) `DriverError` 는 `Clone` 입니다.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::bolt::{BoltError, BoltErrorCode, FailureMessage};

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    /// 서버에 연결할 수 없음 (전송 실패)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 라우팅 대상이 더 이상 유효하지 않음
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// 프로토콜 에러 (핸드셰이크, 순서 위반, 디코딩 실패)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 서버 에러
    #[error("{0}")]
    Server(ServerError),

    /// 인증 에러
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// 타임아웃 에러
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 작업 취소
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// 풀 에러
    #[error("Pool error: {0}")]
    Pool(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 협상된 프로토콜 버전이 지원하지 않는 기능
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// 내부 에러
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DriverError {
    /// 서비스 불가 에러 생성
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// 세션 만료 에러 생성
    pub fn session_expired(msg: impl Into<String>) -> Self {
        Self::SessionExpired(msg.into())
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 서버 에러 생성 (재분류 적용)
    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Server(ServerError::new(code, message).reclassify())
    }

    /// 인증 에러 생성
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 취소 에러 생성
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// 풀 에러 생성
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 미지원 기능 에러 생성
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFeature(msg.into())
    }

    /// 내부 에러 생성
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 서버 에러 코드 (서버 에러인 경우)
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Server(e) => Some(&e.code),
            _ => None,
        }
    }

    /// 서버 에러 참조
    pub fn as_server(&self) -> Option<&ServerError> {
        match self {
            Self::Server(e) => Some(e),
            _ => None,
        }
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) | Self::SessionExpired(_) => true,
            Self::Server(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 연결을 더 이상 쓸 수 없게 만드는 에러인지
    pub fn is_fatal_for_connection(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_) | Self::Protocol(_))
    }
}

// ============================================================================
// ServerError - 서버 에러
// ============================================================================

/// 서버가 FAILURE 로 보고한 에러
///
/// 코드는 `Neo.<Classification>.<Category>.<Title>` 형식입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// 에러 코드
    pub code: String,
    /// 에러 메시지
    pub message: String,
    /// 드라이버가 재시도 가능하다고 판단했는지 (예: 인증 토큰 갱신 예약됨)
    pub retryable: bool,
}

impl ServerError {
    /// 새 서버 에러 생성
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// 분류 (`ClientError`, `TransientError`, `DatabaseError`)
    pub fn classification(&self) -> &str {
        self.code.split('.').nth(1).unwrap_or_default()
    }

    /// 카테고리 (`Security`, `Transaction`, ...)
    pub fn category(&self) -> &str {
        self.code.split('.').nth(2).unwrap_or_default()
    }

    /// 트랜지언트 에러 여부
    pub fn is_transient(&self) -> bool {
        self.classification() == "TransientError"
    }

    /// 클라이언트 에러 여부
    pub fn is_client_error(&self) -> bool {
        self.classification() == "ClientError"
    }

    /// 보안 에러 여부 (`Neo.ClientError.Security.*`)
    pub fn is_security_error(&self) -> bool {
        self.is_client_error() && self.category() == "Security"
    }

    /// 재분류
    ///
    /// 재시도하면 안 되는 트랜지언트 코드를 `ClientError` 로 바꿉니다.
    /// 메시지는 그대로 유지됩니다.
    pub fn reclassify(mut self) -> Self {
        let rewritten = match self.code.as_str() {
            BoltErrorCode::TRANSIENT_TERMINATED => Some(BoltErrorCode::TERMINATED),
            BoltErrorCode::TRANSIENT_LOCK_CLIENT_STOPPED => Some(BoltErrorCode::LOCK_CLIENT_STOPPED),
            _ => None,
        };
        if let Some(code) = rewritten {
            self.code = code.to_string();
        }
        self
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        self.retryable
            || self.is_transient()
            || self.code == BoltErrorCode::NOT_A_LEADER
            || self.code == BoltErrorCode::FORBIDDEN_ON_READ_ONLY_DATABASE
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<FailureMessage> for ServerError {
    fn from(failure: FailureMessage) -> Self {
        ServerError::new(failure.code, failure.message).reclassify()
    }
}

impl From<ServerError> for DriverError {
    fn from(err: ServerError) -> Self {
        DriverError::Server(err)
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<BoltError> for DriverError {
    fn from(err: BoltError) -> Self {
        if err.is_transport() {
            DriverError::ServiceUnavailable(err.to_string())
        } else {
            DriverError::Protocol(err.to_string())
        }
    }
}

impl From<io::Error> for DriverError {
    fn from(err: io::Error) -> Self {
        DriverError::ServiceUnavailable(err.to_string())
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::HandshakeError;

    #[test]
    fn test_reclassify_terminated() {
        let err = ServerError::new("Neo.TransientError.Transaction.Terminated", "killed by admin").reclassify();
        assert_eq!(err.code, "Neo.ClientError.Transaction.Terminated");
        assert_eq!(err.message, "killed by admin");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_reclassify_lock_client_stopped() {
        let err = ServerError::new("Neo.TransientError.Transaction.LockClientStopped", "stopped").reclassify();
        assert_eq!(err.code, "Neo.ClientError.Transaction.LockClientStopped");
        assert_eq!(err.message, "stopped");
    }

    #[test]
    fn test_reclassify_passes_other_codes() {
        let err = ServerError::new("Neo.TransientError.Security.NotYourBusiness", "nope").reclassify();
        assert_eq!(err.code, "Neo.TransientError.Security.NotYourBusiness");
        assert!(err.is_retryable());

        let err = ServerError::new("Neo.ClientError.Transaction.Terminated", "already client").reclassify();
        assert_eq!(err.code, "Neo.ClientError.Transaction.Terminated");
    }

    #[test]
    fn test_failure_message_conversion() {
        let failure = FailureMessage {
            code: BoltErrorCode::TRANSIENT_TERMINATED.to_string(),
            message: "terminated".to_string(),
        };
        let err = DriverError::from(ServerError::from(failure));
        assert_eq!(err.code(), Some(BoltErrorCode::TERMINATED));
        assert_eq!(err.to_string(), "Neo.ClientError.Transaction.Terminated: terminated");
    }

    #[test]
    fn test_classification() {
        let err = ServerError::new(BoltErrorCode::TOKEN_EXPIRED, "expired");
        assert_eq!(err.classification(), "ClientError");
        assert_eq!(err.category(), "Security");
        assert!(err.is_security_error());
        assert!(!err.is_transient());

        let malformed = ServerError::new("garbage", "");
        assert_eq!(malformed.classification(), "");
        assert!(!malformed.is_security_error());
    }

    #[test]
    fn test_retryable() {
        assert!(DriverError::service_unavailable("down").is_retryable());
        assert!(DriverError::session_expired("gone").is_retryable());
        assert!(DriverError::server(BoltErrorCode::NOT_A_LEADER, "").is_retryable());
        assert!(!DriverError::server("Neo.ClientError.Statement.SyntaxError", "").is_retryable());
        assert!(!DriverError::protocol("bad").is_retryable());

        let mut flagged = ServerError::new(BoltErrorCode::TOKEN_EXPIRED, "expired");
        flagged.retryable = true;
        assert!(DriverError::Server(flagged).is_retryable());
    }

    #[test]
    fn test_from_bolt_error() {
        let err: DriverError = BoltError::ConnectionClosed.into();
        assert!(matches!(err, DriverError::ServiceUnavailable(_)));

        let err: DriverError = BoltError::Handshake(HandshakeError::HttpEndpoint).into();
        assert!(matches!(err, DriverError::Protocol(_)));
        assert!(err.is_fatal_for_connection());

        let err: DriverError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, DriverError::ServiceUnavailable(_)));
    }
}
