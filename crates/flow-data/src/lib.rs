//! 수급 패턴 신호 엔진의 데이터 계층.
//!
//! - `Database`: PostgreSQL 커넥션 풀과 마이그레이션
//! - `storage`: 저장소 포트의 PostgreSQL 구현
//! - `memory`: 테스트/드라이런용 인메모리 구현
//! - `window`: 프로그램 매매 링버퍼와 종목별 창 캐시

pub mod database;
pub mod error;
pub mod memory;
pub mod storage;
pub mod window;

pub use database::{Database, DatabaseConfig};
pub use error::{DataError, Result};
pub use memory::{InMemoryEodFlowStore, InMemoryPatternSignalStore, InMemoryProgramTickStore};
pub use storage::{PgEodFlowStore, PgPatternSignalStore, PgProgramTickStore};
pub use window::{
    ProgramWindowCache, ProgramWindowReader, RingBuffer, DEFAULT_RING_CAPACITY, MAX_RING_CAPACITY,
    MIN_RING_CAPACITY,
};
