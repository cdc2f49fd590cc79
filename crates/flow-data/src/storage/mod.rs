//! 저장소 포트의 PostgreSQL 구현.

mod eod_flow;
mod pattern_signal;
mod program_tick;

pub use eod_flow::{EodFlowRow, PgEodFlowStore};
pub use pattern_signal::{PatternSignalRow, PgPatternSignalStore};
pub use program_tick::{PgProgramTickStore, ProgramTickRow};
