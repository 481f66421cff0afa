//! Connection Pool
//!
//! 주소별 연결 풀
//!
//! - 유휴 연결은 획득 시 수명, 활성 여부, 유휴 시간 (liveness), 인증 상태를
//!   확인한 뒤 재사용합니다. 검증에 실패한 연결은 닫고 버립니다.
//! - 주소별 최대 크기에 도달하면 획득자는 반납을 기다립니다
//!   (`connection_acquisition_timeout` 까지).
//! - 반납 시 RESET 으로 상태를 초기화하며, 실패하면 풀에 넣지 않습니다.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::auth::AuthToken;
use super::config::{DriverConfig, ServerAddress};
use super::connection::{BoltConnection, Connection};
use super::error::{DriverError, DriverResult};
use super::logging::Logger;

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_size` | 100 | 주소별 최대 연결 수 |
/// | `acquisition_timeout` | 60초 | 획득 대기 한도 |
/// | `max_lifetime` | 1시간 | 연결 최대 수명 (0 이면 무제한) |
/// | `liveness_check_timeout` | 없음 | 이보다 오래 유휴였던 연결은 RESET 으로 확인 |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: usize,
    pub acquisition_timeout: Duration,
    pub max_lifetime: Duration,
    pub liveness_check_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            acquisition_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(3600),
            liveness_check_timeout: None,
        }
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

impl From<&DriverConfig> for PoolConfig {
    fn from(config: &DriverConfig) -> Self {
        Self {
            max_size: config.max_connection_pool_size,
            acquisition_timeout: config.connection_acquisition_timeout,
            max_lifetime: config.max_connection_lifetime,
            liveness_check_timeout: config.connection_liveness_check_timeout,
        }
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquisition_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_lifetime = lifetime;
        self
    }

    pub fn liveness_check_timeout(mut self, timeout: Duration) -> Self {
        self.config.liveness_check_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> PoolConfig {
        self.config
    }
}

// ============================================================================
// ConnectionFactory - 연결 생성/검증
// ============================================================================

/// 풀이 연결을 만들고 검증할 때 쓰는 인터페이스
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// 열고, 초기화하고, 인증된 연결 생성 (`auth` 가 없으면 드라이버 토큰)
    async fn create(&self, address: &ServerAddress, auth: Option<&AuthToken>) -> DriverResult<Arc<BoltConnection>>;

    /// 유휴 연결을 빌려주기 전 검증
    async fn validate_on_acquire(&self, connection: &Arc<BoltConnection>) -> bool;

    /// 반납된 연결을 유휴로 돌리기 전 검증
    async fn validate_on_release(&self, connection: &Arc<BoltConnection>) -> bool;
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// 유휴 연결 수
    pub idle: usize,
    /// 사용 중인 연결 수
    pub in_use: usize,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 닫힌 연결 수
    pub total_closed: u64,
    /// 총 타임아웃 횟수
    pub total_timeouts: u64,
}

#[derive(Default)]
struct Counters {
    acquisitions: AtomicU64,
    created: AtomicU64,
    closed: AtomicU64,
    timeouts: AtomicU64,
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

#[derive(Default)]
struct PoolEntry {
    /// purge 후 다시 만들어진 항목과 구분
    generation: u64,
    idle: VecDeque<Arc<BoltConnection>>,
    active: HashMap<u64, Arc<BoltConnection>>,
    /// 생성 중인 연결 수 (최대 크기 계산에 포함)
    pending: usize,
    notify: Arc<Notify>,
}

impl PoolEntry {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            ..Default::default()
        }
    }

    fn total(&self) -> usize {
        self.idle.len() + self.active.len() + self.pending
    }
}

enum Slot {
    /// 생성 중 예약
    Pending,
    /// 검증 중인 유휴 연결
    Checkout(Arc<BoltConnection>),
}

/// 획득 도중 잡고 있는 자리
///
/// 획득 future 가 생성이나 검증 도중 버려지면 drop 에서 자리를 돌려주고
/// 대기자를 깨웁니다.
struct Reservation<'a> {
    pool: &'a ConnectionPool,
    address: &'a ServerAddress,
    generation: u64,
    slot: Option<Slot>,
}

impl Reservation<'_> {
    /// 자리를 돌려줌; 검증 중이던 연결은 닫아야 하므로 반환
    fn give_back(&mut self) -> Option<Arc<BoltConnection>> {
        let slot = self.slot.take()?;
        let mut entries = self.pool.entries.lock();
        let entry = entries
            .get_mut(self.address)
            .filter(|e| e.generation == self.generation);
        match slot {
            Slot::Pending => {
                if let Some(entry) = entry {
                    entry.pending = entry.pending.saturating_sub(1);
                    entry.notify.notify_one();
                }
                None
            }
            Slot::Checkout(connection) => {
                if let Some(entry) = entry {
                    entry.active.remove(&connection.id());
                    entry.notify.notify_one();
                }
                Some(connection)
            }
        }
    }

    /// 획득 성공; 자리는 호출자에게 넘어감
    fn keep(mut self) {
        self.slot = None;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let Some(connection) = self.give_back() else {
            return;
        };
        self.pool.counters.closed.fetch_add(1, Ordering::Relaxed);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { connection.close().await });
        }
    }
}

enum Next {
    Idle(Arc<BoltConnection>, u64),
    Create(u64),
    Wait(Arc<Notify>, u64),
}

/// 연결 풀
pub struct ConnectionPool {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    entries: Mutex<HashMap<ServerAddress, PoolEntry>>,
    closed: AtomicBool,
    next_generation: AtomicU64,
    counters: Counters,
    logger: Logger,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig, factory: Arc<dyn ConnectionFactory>, logger: Logger) -> Self {
        Self {
            config,
            factory,
            entries: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            next_generation: AtomicU64::new(1),
            counters: Counters::default(),
            logger,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn factory(&self) -> &Arc<dyn ConnectionFactory> {
        &self.factory
    }

    /// 연결 획득
    pub async fn acquire(&self, address: &ServerAddress) -> DriverResult<Arc<BoltConnection>> {
        let deadline = Instant::now() + self.config.acquisition_timeout;
        loop {
            if self.is_closed() {
                return Err(DriverError::pool("Pool is closed"));
            }

            let next = {
                let mut entries = self.entries.lock();
                let entry = entries
                    .entry(address.clone())
                    .or_insert_with(|| PoolEntry::new(self.next_generation.fetch_add(1, Ordering::Relaxed)));
                if let Some(connection) = entry.idle.pop_front() {
                    entry.active.insert(connection.id(), connection.clone());
                    Next::Idle(connection, entry.generation)
                } else if entry.total() < self.config.max_size {
                    entry.pending += 1;
                    Next::Create(entry.generation)
                } else {
                    Next::Wait(entry.notify.clone(), entry.generation)
                }
            };

            match next {
                Next::Idle(connection, generation) => {
                    let mut reservation = self.reserve(address, generation, Slot::Checkout(connection.clone()));
                    if self.is_reusable(&connection).await {
                        reservation.keep();
                        self.counters.acquisitions.fetch_add(1, Ordering::Relaxed);
                        return Ok(connection);
                    }
                    if let Some(connection) = reservation.give_back() {
                        self.counters.closed.fetch_add(1, Ordering::Relaxed);
                        connection.close().await;
                    }
                }
                Next::Create(generation) => {
                    let reservation = self.reserve(address, generation, Slot::Pending);
                    return self.create(address, reservation).await;
                }
                Next::Wait(notify, generation) => {
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    // 등록 후 다시 확인; 그 사이의 purge/반납 알림을 놓치지 않음
                    notified.as_mut().enable();
                    if self.can_proceed(address, generation) {
                        continue;
                    }
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                        return Err(DriverError::pool(format!(
                            "Connection acquisition timed out in {}ms for {}",
                            self.config.acquisition_timeout.as_millis(),
                            address
                        )));
                    }
                }
            }
        }
    }

    fn reserve<'a>(&'a self, address: &'a ServerAddress, generation: u64, slot: Slot) -> Reservation<'a> {
        Reservation {
            pool: self,
            address,
            generation,
            slot: Some(slot),
        }
    }

    /// 대기하던 자리가 풀렸거나 항목이 바뀌었는지
    fn can_proceed(&self, address: &ServerAddress, generation: u64) -> bool {
        if self.is_closed() {
            return true;
        }
        match self.entries.lock().get(address) {
            Some(entry) if entry.generation == generation => {
                !entry.idle.is_empty() || entry.total() < self.config.max_size
            }
            _ => true,
        }
    }

    async fn create(&self, address: &ServerAddress, mut reservation: Reservation<'_>) -> DriverResult<Arc<BoltConnection>> {
        let result = self.factory.create(address, None).await;

        let accepted = {
            let mut entries = self.entries.lock();
            reservation.slot = None;
            let entry = entries
                .get_mut(address)
                .filter(|e| e.generation == reservation.generation);
            match (entry, &result) {
                (Some(entry), Ok(connection)) if !self.is_closed() => {
                    entry.pending = entry.pending.saturating_sub(1);
                    entry.active.insert(connection.id(), connection.clone());
                    true
                }
                (Some(entry), _) => {
                    entry.pending = entry.pending.saturating_sub(1);
                    entry.notify.notify_one();
                    false
                }
                // 생성 중에 purge 됨: 추적하지 않는 연결로 넘기고 반납 시 닫음
                (None, Ok(_)) => !self.is_closed(),
                (None, Err(_)) => false,
            }
        };

        let connection = result?;
        if !accepted {
            connection.close().await;
            return Err(DriverError::pool("Pool is closed"));
        }
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        self.counters.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.logger.debug(format!("Pool created connection {} to {}", connection.id(), address));
        Ok(connection)
    }

    async fn is_reusable(&self, connection: &Arc<BoltConnection>) -> bool {
        if !connection.is_open() || self.is_too_old(connection) {
            return false;
        }
        if let Some(timeout) = self.config.liveness_check_timeout {
            if connection.idle_time() > timeout && connection.reset_and_flush().await.is_err() {
                self.logger.debug(format!("Connection {} failed the liveness check", connection.id()));
                return false;
            }
        }
        self.factory.validate_on_acquire(connection).await
    }

    fn is_too_old(&self, connection: &BoltConnection) -> bool {
        !self.config.max_lifetime.is_zero() && connection.age() > self.config.max_lifetime
    }

    /// 연결 반납
    ///
    /// RESET 에 성공한 열린 연결만 유휴 목록으로 돌아갑니다.
    pub async fn release(&self, connection: Arc<BoltConnection>) {
        let healthy = connection.is_open()
            && !self.is_too_old(&connection)
            && connection.reset_and_flush().await.is_ok()
            && self.factory.validate_on_release(&connection).await;

        let pooled = {
            let mut entries = self.entries.lock();
            match entries.get_mut(connection.address()) {
                Some(entry) => {
                    if entry.active.remove(&connection.id()).is_some() {
                        let pooled = healthy && !self.is_closed();
                        if pooled {
                            connection.mark_idle();
                            entry.idle.push_back(connection.clone());
                        }
                        entry.notify.notify_one();
                        pooled
                    } else {
                        // purge 후 다시 만들어진 항목: 이전 세대의 연결
                        false
                    }
                }
                // purge 된 주소의 연결
                None => false,
            }
        };

        if !pooled {
            self.counters.closed.fetch_add(1, Ordering::Relaxed);
            connection.close().await;
        }
    }

    /// 주소의 모든 연결 (유휴 + 사용 중) 에 함수 적용
    pub fn apply(&self, address: &ServerAddress, f: impl Fn(&Arc<BoltConnection>)) {
        let entries = self.entries.lock();
        if let Some(entry) = entries.get(address) {
            entry.idle.iter().chain(entry.active.values()).for_each(|c| f(c));
        }
    }

    /// 주소의 풀 제거; 유휴 연결은 닫고, 사용 중인 연결은 반납 시 닫힘
    pub async fn purge(&self, address: &ServerAddress) {
        let removed = self.entries.lock().remove(address);
        if let Some(entry) = removed {
            self.logger.debug(format!("Purging pool for {}", address));
            entry.notify.notify_waiters();
            self.close_all(entry.idle).await;
        }
    }

    /// 주어진 주소 외의 풀 제거
    pub async fn keep_all(&self, addresses: &HashSet<ServerAddress>) {
        let stale: Vec<ServerAddress> = self
            .entries
            .lock()
            .keys()
            .filter(|a| !addresses.contains(*a))
            .cloned()
            .collect();
        for address in stale {
            self.purge(&address).await;
        }
    }

    pub fn has(&self, address: &ServerAddress) -> bool {
        self.entries.lock().contains_key(address)
    }

    pub fn active_count(&self, address: &ServerAddress) -> usize {
        self.entries.lock().get(address).map_or(0, |e| e.active.len())
    }

    pub fn idle_count(&self, address: &ServerAddress) -> usize {
        self.entries.lock().get(address).map_or(0, |e| e.idle.len())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> PoolMetrics {
        let entries = self.entries.lock();
        PoolMetrics {
            idle: entries.values().map(|e| e.idle.len()).sum(),
            in_use: entries.values().map(|e| e.active.len()).sum(),
            total_acquisitions: self.counters.acquisitions.load(Ordering::Relaxed),
            total_created: self.counters.created.load(Ordering::Relaxed),
            total_closed: self.counters.closed.load(Ordering::Relaxed),
            total_timeouts: self.counters.timeouts.load(Ordering::Relaxed),
        }
    }

    /// 풀 닫기; 이후 획득은 실패하고 반납된 연결은 닫힘
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let idle: Vec<Arc<BoltConnection>> = {
            let mut entries = self.entries.lock();
            entries
                .values_mut()
                .flat_map(|entry| {
                    entry.notify.notify_waiters();
                    entry.idle.drain(..).collect::<Vec<_>>()
                })
                .collect()
        };
        self.close_all(idle).await;
    }

    async fn close_all(&self, connections: impl IntoIterator<Item = Arc<BoltConnection>>) {
        for connection in connections {
            self.counters.closed.fetch_add(1, Ordering::Relaxed);
            connection.close().await;
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .field("metrics", &self.metrics())
            .finish()
    }
}
