//! 수집/평가 작업 모듈.

pub mod eod_collect;
pub mod pattern_eval;
pub mod program_ingest;
pub mod scheduler;

pub use eod_collect::{CollectionError, EodCollector};
pub use pattern_eval::run_evaluation;
pub use program_ingest::{IngestSettings, ProgramStreamIngester};
pub use scheduler::{MarketStatus, Scheduler};
