//! 라우팅 정책
//!
//! 서버 선택 전략을 정의합니다.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::driver::config::ServerAddress;

/// 라우팅 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingPolicy {
    /// 최소 연결 (기본값)
    #[default]
    LeastConnections,
    /// 라운드 로빈
    RoundRobin,
    /// 랜덤
    Random,
}

/// 서버 선택기
///
/// 리더와 라이터는 라운드 로빈 인덱스를 따로 가집니다.
#[derive(Debug)]
pub struct ServerSelector {
    policy: RoutingPolicy,
    reader_index: AtomicUsize,
    writer_index: AtomicUsize,
}

impl ServerSelector {
    /// 새 선택기 생성
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            policy,
            reader_index: AtomicUsize::new(0),
            writer_index: AtomicUsize::new(0),
        }
    }

    /// 리더 선택; `in_use` 는 주소별 사용 중인 연결 수
    pub fn select_reader(
        &self,
        readers: &[ServerAddress],
        in_use: impl Fn(&ServerAddress) -> usize,
    ) -> Option<ServerAddress> {
        self.select(readers, &self.reader_index, in_use)
    }

    /// 라이터 선택
    pub fn select_writer(
        &self,
        writers: &[ServerAddress],
        in_use: impl Fn(&ServerAddress) -> usize,
    ) -> Option<ServerAddress> {
        self.select(writers, &self.writer_index, in_use)
    }

    fn select(
        &self,
        servers: &[ServerAddress],
        index: &AtomicUsize,
        in_use: impl Fn(&ServerAddress) -> usize,
    ) -> Option<ServerAddress> {
        if servers.is_empty() {
            return None;
        }

        match self.policy {
            RoutingPolicy::RoundRobin => {
                let start = index.fetch_add(1, Ordering::Relaxed);
                Some(servers[start % servers.len()].clone())
            }
            RoutingPolicy::Random => {
                let pick = rand::thread_rng().gen_range(0..servers.len());
                Some(servers[pick].clone())
            }
            RoutingPolicy::LeastConnections => {
                // 라운드 로빈 시작점부터 돌며 최소 연결 서버 선택 (동률이면 먼저 본 서버)
                let start = index.fetch_add(1, Ordering::Relaxed) % servers.len();
                let mut best: Option<(&ServerAddress, usize)> = None;
                for offset in 0..servers.len() {
                    let server = &servers[(start + offset) % servers.len()];
                    let count = in_use(server);
                    if best.map_or(true, |(_, least)| count < least) {
                        best = Some((server, count));
                    }
                }
                best.map(|(server, _)| server.clone())
            }
        }
    }

    /// 현재 정책 조회
    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }
}

impl Default for ServerSelector {
    fn default() -> Self {
        Self::new(RoutingPolicy::default())
    }
}
