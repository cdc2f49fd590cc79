//! 핸들러 공유 상태.

use std::sync::Arc;

use flow_analytics::PatternEvaluator;
use flow_core::PatternSignalStore;

/// API 공유 상태.
///
/// API 프로세스에는 링버퍼가 없으므로 평가기는 항상 저장소에서 읽습니다.
pub struct AppState {
    pub evaluator: Arc<PatternEvaluator>,
    pub signals: Arc<dyn PatternSignalStore>,
}

impl AppState {
    pub fn new(evaluator: Arc<PatternEvaluator>, signals: Arc<dyn PatternSignalStore>) -> Self {
        Self { evaluator, signals }
    }
}
