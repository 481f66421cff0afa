//! 라우팅 모듈
//!
//! 클러스터 라우팅에 필요한 데이터입니다. 테이블 갱신과 서버 선택의 흐름은
//! [`crate::driver::provider::RoutingConnectionProvider`] 가 담당합니다.
//!
//! - [`RoutingTable`] - 데이터베이스별 라우터/라이터/리더 목록과 TTL
//! - [`ServerSelector`] - 부하 분산 정책에 따른 서버 선택

mod policy;
mod table;

pub use policy::{RoutingPolicy, ServerSelector};
pub use table::{RoutingTable, ServerRole};
