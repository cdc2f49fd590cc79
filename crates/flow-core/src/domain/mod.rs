//! 수급 도메인 타입.

mod eod_flow;
mod pattern_signal;
mod program_flow;

pub use eod_flow::EodFlowRecord;
pub use pattern_signal::{
    composite, EodRefreshStatus, InstitutionalDetail, PatternSignal, PatternSignalRecord,
    ProgramDetail, TriggerDetail, TriggerStatus, WindowSource,
};
pub use program_flow::{ProgramFlowTick, ProgramSide};
