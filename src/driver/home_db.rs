//! Home Database Cache
//!
//! (자격 증명, 대리 사용자) 조합별로 마지막에 확인한 홈 데이터베이스 이름을
//! 짧게 기억합니다. 만료는 조회 시점에 판단하며 (백그라운드 정리 없음),
//! 최대 개수를 넘으면 가장 오래된 항목부터 버립니다.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::auth::AuthToken;

/// 캐시 키: 자격 증명 + 대리 사용자
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    auth: AuthToken,
    impersonated_user: Option<String>,
}

impl CacheKey {
    fn new(auth: &AuthToken, impersonated_user: Option<&str>) -> Self {
        Self {
            auth: auth.clone(),
            impersonated_user: impersonated_user.map(String::from),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    database: String,
    set_at: Instant,
}

/// 홈 데이터베이스 캐시
#[derive(Debug)]
pub struct HomeDatabaseCache {
    max_delay: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl HomeDatabaseCache {
    pub fn new(max_delay: Duration, max_entries: usize) -> Self {
        Self {
            max_delay,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 홈 데이터베이스 기록
    pub fn set(&self, auth: &AuthToken, impersonated_user: Option<&str>, database: impl Into<String>) {
        let mut entries = self.entries.lock();
        entries.insert(
            CacheKey::new(auth, impersonated_user),
            CacheEntry {
                database: database.into(),
                set_at: Instant::now(),
            },
        );
        if entries.len() > self.max_entries {
            Self::prune(&mut entries, self.max_entries);
        }
    }

    /// 만료되지 않은 항목만 반환
    pub fn get(&self, auth: &AuthToken, impersonated_user: Option<&str>) -> Option<String> {
        let entries = self.entries.lock();
        let entry = entries.get(&CacheKey::new(auth, impersonated_user))?;
        if entry.set_at.elapsed() > self.max_delay {
            return None;
        }
        Some(entry.database.clone())
    }

    pub fn clear_cache(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// 가장 오래된 항목부터 `max` 개가 남을 때까지 제거
    fn prune(entries: &mut HashMap<CacheKey, CacheEntry>, max: usize) {
        let mut by_age: Vec<_> = entries.iter().map(|(k, v)| (v.set_at, k.clone())).collect();
        by_age.sort_by_key(|(set_at, _)| *set_at);
        let excess = entries.len().saturating_sub(max);
        for (_, key) in by_age.into_iter().take(excess) {
            entries.remove(&key);
        }
    }
}
