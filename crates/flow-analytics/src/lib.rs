//! 수급 패턴 분석.
//!
//! - `stats`: 평균, 선형 보간 백분위
//! - `institutional`: 일별 기관 연속 순매수 트리거
//! - `program`: 실시간 프로그램 순매수 급증 트리거
//! - `evaluator`: 두 트리거와 복합 신호를 묶는 `PatternEvaluator`
//! - `similar`: 과거 복합 신호 조회

pub mod evaluator;
pub mod institutional;
pub mod program;
pub mod similar;
pub mod stats;

pub use evaluator::{
    BatchEvaluation, EodRefresher, EvaluationError, EvaluationOutcome, EvaluationStats,
    PatternEvaluator,
};
pub use institutional::{evaluate_institutional, InstitutionalOutcome};
pub use program::{evaluate_program, session_volume, ProgramOutcome, SessionVolume};
pub use similar::SimilarCaseSearcher;
