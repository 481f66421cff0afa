//! Driver Configuration
//!
//! 드라이버 설정, 서버 주소, TLS 신뢰 전략

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::error::{DriverError, DriverResult};
use super::logging::LogLevel;
use super::routing::RoutingPolicy;

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

// ============================================================================
// TrustStrategy - TLS 신뢰 전략
// ============================================================================

/// TLS 신뢰 전략
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustStrategy {
    /// 시스템 인증서 사용
    #[default]
    TrustSystemCas,
    /// 모든 인증서 신뢰 (개발용)
    TrustAllCertificates,
    /// 지정한 PEM 파일의 CA 만 신뢰
    TrustCustomCas(Vec<PathBuf>),
}

// ============================================================================
// UriScheme - URI 스킴
// ============================================================================

/// URI 스킴
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriScheme {
    /// `bolt://` 단일 서버
    Direct,
    /// `neo4j://` 클러스터 라우팅
    Routing,
}

/// URI 파싱 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
    /// 스킴
    pub scheme: UriScheme,
    /// 서버 주소
    pub address: ServerAddress,
    /// `+s` / `+ssc` 로 지정된 TLS 설정
    pub tls: Option<TrustStrategy>,
}

impl ParsedUri {
    /// URI 파싱
    pub fn parse(uri: &str) -> DriverResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| DriverError::configuration(format!("Missing scheme in URI: {}", uri)))?;

        let (kind, tls) = match scheme {
            "bolt" => (UriScheme::Direct, None),
            "bolt+s" => (UriScheme::Direct, Some(TrustStrategy::TrustSystemCas)),
            "bolt+ssc" => (UriScheme::Direct, Some(TrustStrategy::TrustAllCertificates)),
            "neo4j" => (UriScheme::Routing, None),
            "neo4j+s" => (UriScheme::Routing, Some(TrustStrategy::TrustSystemCas)),
            "neo4j+ssc" => (UriScheme::Routing, Some(TrustStrategy::TrustAllCertificates)),
            other => {
                return Err(DriverError::configuration(format!("Unsupported URI scheme: {}", other)));
            }
        };

        // 경로, 쿼리는 무시
        let authority = rest.split(['/', '?']).next().unwrap_or_default();

        Ok(Self {
            scheme: kind,
            address: ServerAddress::parse(authority)?,
            tls,
        })
    }
}

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host[:port]` 파싱. `bolt://` 같은 스킴이 붙어 있으면 떼어 냅니다.
    pub fn parse(input: &str) -> DriverResult<Self> {
        let input = input.split_once("://").map(|(_, rest)| rest).unwrap_or(input);
        let input = input.trim_end_matches('/');
        if input.is_empty() {
            return Err(DriverError::configuration("Empty server address"));
        }

        // [::1]:7687
        if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| DriverError::configuration(format!("Invalid server address: {}", input)))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port)?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => {
                    return Err(DriverError::configuration(format!("Invalid server address: {}", input)));
                }
            };
            return Ok(Self::new(host, port));
        }

        match input.split_once(':') {
            None => Ok(Self::new(input, DEFAULT_PORT)),
            Some((host, port)) if !port.contains(':') && !host.is_empty() => {
                Ok(Self::new(host, parse_port(port)?))
            }
            Some(_) => Err(DriverError::configuration(format!("Invalid server address: {}", input))),
        }
    }

    /// `TcpStream::connect` 에 넘길 형태
    pub fn as_socket_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

fn parse_port(port: &str) -> DriverResult<u16> {
    port.parse()
        .map_err(|_| DriverError::configuration(format!("Invalid port: {}", port)))
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
///
/// | 필드 | 기본값 |
/// |------|--------|
/// | `user_agent` | `zeta4g-driver-core/<버전>` |
/// | `encrypted` | false |
/// | `max_connection_pool_size` | 100 |
/// | `connection_acquisition_timeout` | 60초 |
/// | `connection_timeout` | 30초 |
/// | `connection_liveness_check_timeout` | 없음 (검사 안 함) |
/// | `max_connection_lifetime` | 1시간 |
/// | `max_home_database_delay` | 5초 |
/// | `max_home_database_entries` | 10000 |
/// | `load_balancing` | `LeastConnections` |
/// | `log_level` | `Info` |
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// User Agent
    pub user_agent: String,
    /// TLS 암호화
    pub encrypted: bool,
    /// TLS 신뢰 전략
    pub trust_strategy: TrustStrategy,
    /// 주소별 연결 풀 최대 크기
    pub max_connection_pool_size: usize,
    /// 연결 획득 타임아웃
    pub connection_acquisition_timeout: Duration,
    /// 연결 (TCP + 핸드셰이크 + HELLO) 타임아웃
    pub connection_timeout: Duration,
    /// 이 시간보다 오래 유휴 상태였던 연결은 획득 시 RESET 으로 확인
    pub connection_liveness_check_timeout: Option<Duration>,
    /// 연결 최대 수명
    pub max_connection_lifetime: Duration,
    /// 홈 데이터베이스 캐시 유효 시간
    pub max_home_database_delay: Duration,
    /// 홈 데이터베이스 캐시 최대 항목 수
    pub max_home_database_entries: usize,
    /// HELLO 에 실리는 라우팅 컨텍스트
    pub routing_context: HashMap<String, String>,
    /// 서버 선택 정책
    pub load_balancing: RoutingPolicy,
    /// 로그 레벨
    pub log_level: LogLevel,
}

impl DriverConfig {
    /// 기본 설정
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 시작
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder {
            config: Self::default(),
        }
    }

    /// URI 의 `+s` / `+ssc` 를 반영한 설정
    pub fn for_uri(uri: &ParsedUri) -> Self {
        let mut config = Self::default();
        if let Some(trust) = &uri.tls {
            config.encrypted = true;
            config.trust_strategy = trust.clone();
        }
        config
    }

    /// 설정 검증
    pub fn validate(&self) -> DriverResult<()> {
        if self.max_connection_pool_size == 0 {
            return Err(DriverError::configuration(
                "max_connection_pool_size must be greater than zero",
            ));
        }
        if self.connection_acquisition_timeout.is_zero() {
            return Err(DriverError::configuration(
                "connection_acquisition_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("zeta4g-driver-core/{}", env!("CARGO_PKG_VERSION")),
            encrypted: false,
            trust_strategy: TrustStrategy::default(),
            max_connection_pool_size: 100,
            connection_acquisition_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
            connection_liveness_check_timeout: None,
            max_connection_lifetime: Duration::from_secs(3600),
            max_home_database_delay: Duration::from_secs(5),
            max_home_database_entries: 10_000,
            routing_context: HashMap::new(),
            load_balancing: RoutingPolicy::LeastConnections,
            log_level: LogLevel::Info,
        }
    }
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
#[derive(Debug, Clone)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// TLS 암호화 설정
    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.config.encrypted = encrypted;
        self
    }

    /// TLS 신뢰 전략 설정
    pub fn with_trust_strategy(mut self, strategy: TrustStrategy) -> Self {
        self.config.trust_strategy = strategy;
        self
    }

    /// 연결 풀 크기 설정
    pub fn with_max_connection_pool_size(mut self, size: usize) -> Self {
        self.config.max_connection_pool_size = size;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_acquisition_timeout = timeout;
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// 유휴 연결 확인 기준 설정
    pub fn with_connection_liveness_check_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_liveness_check_timeout = Some(timeout);
        self
    }

    /// 연결 최대 수명 설정
    pub fn with_max_connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_connection_lifetime = lifetime;
        self
    }

    /// 홈 데이터베이스 캐시 유효 시간 설정
    pub fn with_max_home_database_delay(mut self, delay: Duration) -> Self {
        self.config.max_home_database_delay = delay;
        self
    }

    /// 홈 데이터베이스 캐시 크기 설정
    pub fn with_max_home_database_entries(mut self, entries: usize) -> Self {
        self.config.max_home_database_entries = entries;
        self
    }

    /// 라우팅 컨텍스트 항목 추가
    pub fn with_routing_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.routing_context.insert(key.into(), value.into());
        self
    }

    /// 서버 선택 정책 설정
    pub fn with_load_balancing(mut self, policy: RoutingPolicy) -> Self {
        self.config.load_balancing = policy;
        self
    }

    /// 로그 레벨 설정
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    /// 빌드 (검증 포함)
    pub fn build(self) -> DriverResult<DriverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ============================================================================
// Tests
// ============================================================================
