//! 수급 데이터 제공자 어댑터.
//!
//! - `EodFlowProvider`: 일별 투자자별 순매수 조회
//! - `ProgramTradeFeed`: 실시간 프로그램 매매 피드
//! - `connector::kis`: 한국투자증권 REST/WebSocket 구현
//! - `provider::mock`: 테스트용 스크립트 제공자
//! - `retry`: 일시적 오류 재시도 유틸리티

pub mod connector;
pub mod error;
pub mod provider;
pub mod retry;
pub mod traits;

pub use connector::kis::{KisConfig, KisEnvironment, KisFlowClient, KisOAuth, KisProgramFeed};
pub use error::ExchangeError;
pub use retry::{with_retry, RetryConfig};
pub use traits::{EodFlowProvider, ProgramTradeFeed};
