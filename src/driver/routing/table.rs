//! 라우팅 테이블
//!
//! 클러스터의 서버 역할별 목록을 관리합니다.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::time::Instant;

use crate::bolt::{AccessMode, PackStreamValue};
use crate::driver::config::ServerAddress;
use crate::driver::error::{DriverError, DriverResult};

/// 최소 라우터 수; 이보다 적으면 테이블을 갱신해야 함
const MIN_ROUTERS: usize = 1;

/// 서버 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    /// 라우팅 테이블 제공자
    Route,
    /// 쓰기 트랜잭션 처리 (리더)
    Write,
    /// 읽기 트랜잭션 처리 (팔로워)
    Read,
}

impl ServerRole {
    /// 문자열에서 역할 파싱
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ROUTE" => Some(Self::Route),
            "WRITE" => Some(Self::Write),
            "READ" => Some(Self::Read),
            _ => None,
        }
    }

    /// 역할을 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Route => "ROUTE",
            Self::Write => "WRITE",
            Self::Read => "READ",
        }
    }
}

/// 라우팅 테이블
#[derive(Debug, Clone)]
pub struct RoutingTable {
    /// 데이터베이스 이름 (`None` 이면 홈 데이터베이스)
    pub database: Option<String>,
    /// 라우터 목록 (라우팅 테이블 조회용)
    pub routers: Vec<ServerAddress>,
    /// 라이터 목록 (쓰기 트랜잭션용)
    pub writers: Vec<ServerAddress>,
    /// 리더 목록 (읽기 트랜잭션용)
    pub readers: Vec<ServerAddress>,
    /// 서버가 알려준 TTL
    pub ttl: Duration,
    /// 생성/갱신 시간
    pub updated_at: Instant,
}

impl RoutingTable {
    /// 초기 라우터로 테이블 생성 (즉시 갱신 필요)
    pub fn with_initial_routers(database: Option<String>, routers: Vec<ServerAddress>) -> Self {
        Self {
            database,
            routers,
            writers: Vec::new(),
            readers: Vec::new(),
            ttl: Duration::ZERO,
            updated_at: Instant::now(),
        }
    }

    /// ROUTE 응답의 `rt` 맵 또는 프로시저 결과에서 생성
    ///
    /// `{ ttl, db?, servers: [{ addresses: [..], role }] }`
    pub fn from_metadata(
        rt: &HashMap<String, PackStreamValue>,
        requested_database: Option<&str>,
    ) -> DriverResult<Self> {
        let ttl = rt
            .get("ttl")
            .and_then(PackStreamValue::as_whole_number)
            .ok_or_else(|| DriverError::protocol("Routing table has no valid ttl"))?;
        let servers = rt
            .get("servers")
            .and_then(PackStreamValue::as_list)
            .ok_or_else(|| DriverError::protocol("Routing table has no server list"))?;

        let database = rt
            .get("db")
            .and_then(PackStreamValue::as_str)
            .map(String::from)
            .or_else(|| requested_database.map(String::from));

        let mut table = Self {
            database,
            routers: Vec::new(),
            writers: Vec::new(),
            readers: Vec::new(),
            ttl: Duration::from_secs(ttl.max(0) as u64),
            updated_at: Instant::now(),
        };

        for server in servers {
            let Some(server) = server.as_map() else {
                return Err(DriverError::protocol("Routing table entry is not a map"));
            };
            let role = server
                .get("role")
                .and_then(PackStreamValue::as_str)
                .and_then(ServerRole::parse);
            let addresses = server.get("addresses").map(PackStreamValue::string_list).unwrap_or_default();
            let Some(role) = role else {
                // 알 수 없는 역할은 건너뜀
                continue;
            };
            for address in addresses {
                table.add_server(role, ServerAddress::parse(&address)?);
            }
        }

        if table.routers.is_empty() {
            return Err(DriverError::protocol("Routing table has no routers"));
        }
        Ok(table)
    }

    /// 역할별 서버 추가
    pub fn add_server(&mut self, role: ServerRole, address: ServerAddress) {
        let list = match role {
            ServerRole::Route => &mut self.routers,
            ServerRole::Write => &mut self.writers,
            ServerRole::Read => &mut self.readers,
        };
        if !list.contains(&address) {
            list.push(address);
        }
    }

    pub fn is_expired(&self) -> bool {
        self.updated_at.elapsed() >= self.ttl
    }

    /// 해당 모드로 쓰기에 부족하거나 만료된 테이블인지
    pub fn is_stale_for(&self, mode: AccessMode) -> bool {
        self.is_expired()
            || self.routers.len() < MIN_ROUTERS
            || match mode {
                AccessMode::Read => self.readers.is_empty(),
                AccessMode::Write => self.writers.is_empty(),
            }
    }

    /// 모드별 서버 목록
    pub fn servers_for(&self, mode: AccessMode) -> &[ServerAddress] {
        match mode {
            AccessMode::Read => &self.readers,
            AccessMode::Write => &self.writers,
        }
    }

    /// 읽기/쓰기 목록에서 제거 (라우터는 유지)
    pub fn forget(&mut self, address: &ServerAddress) {
        self.readers.retain(|a| a != address);
        self.writers.retain(|a| a != address);
    }

    pub fn forget_router(&mut self, address: &ServerAddress) {
        self.routers.retain(|a| a != address);
    }

    pub fn forget_writer(&mut self, address: &ServerAddress) {
        self.writers.retain(|a| a != address);
    }

    /// 테이블에 등장하는 모든 주소
    pub fn all_servers(&self) -> BTreeSet<ServerAddress> {
        self.routers
            .iter()
            .chain(&self.writers)
            .chain(&self.readers)
            .cloned()
            .collect()
    }
}
