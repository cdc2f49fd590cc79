//! 수급 패턴 수집 데몬.
//!
//! - EOD 투자자별 수급 수집 및 백필
//! - 실시간 프로그램 매매 수집 (링버퍼 + 영구 저장)
//! - 장 마감 후/장중 패턴 평가 스케줄링

pub mod config;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use stats::{CollectionStats, IngestStats};
