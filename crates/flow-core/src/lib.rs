//! 수급 패턴 신호 엔진의 도메인 타입과 저장소 추상화.
//!
//! 이 crate는 다음을 제공합니다:
//! - 일별 투자자별 수급 레코드 (`EodFlowRecord`)
//! - 프로그램 매매 틱 (`ProgramFlowTick`)
//! - 패턴 신호 (`PatternSignal`)와 트리거 상세 (`TriggerDetail`)
//! - 판정 임계값 설정 (`PatternThresholds`)
//! - 저장소 포트 (`EodFlowStore`, `DurableAppend`, `FastRead`, `PatternSignalStore`)
//! - KRX 세션 헬퍼 (`session`)

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod session;

pub use config::{ConfigError, PatternThresholds};
pub use domain::{
    composite, EodFlowRecord, EodRefreshStatus, InstitutionalDetail, PatternSignal,
    PatternSignalRecord, ProgramDetail, ProgramFlowTick, ProgramSide, TriggerDetail,
    TriggerStatus, WindowSource,
};
pub use error::{StorageError, StorageResult};
pub use ports::{DurableAppend, EodFlowStore, FastRead, PatternSignalStore, WindowSnapshot};
