//! 스케줄 패턴 평가 모듈.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use flow_analytics::{EvaluationStats, PatternEvaluator};
use tracing::info;

/// 추적 종목 전체를 기준 시각으로 평가하고 요약을 남깁니다.
///
/// 종목별 실패는 통계에만 반영되며 나머지 종목 평가를 막지 않습니다.
pub async fn run_evaluation(
    evaluator: &Arc<PatternEvaluator>,
    tickers: &[String],
    reference_time: DateTime<Utc>,
    concurrency: usize,
    operation: &str,
) -> EvaluationStats {
    info!(
        operation,
        tickers = tickers.len(),
        reference_time = %reference_time,
        "패턴 평가 시작"
    );

    let batch = evaluator
        .evaluate_many(tickers, reference_time, concurrency)
        .await;

    for (ticker, result) in &batch.outcomes {
        if let Ok(outcome) = result {
            if outcome.signal.composite_strong() {
                info!(
                    ticker = %ticker,
                    institutional_buy_days = outcome.signal.institutional_buy_day_count,
                    program_volume = outcome.signal.program_volume_snapshot,
                    similar_cases = outcome.similar_cases.len(),
                    "복합 신호 발생"
                );
            }
        }
    }

    batch.stats.log_summary(operation);
    batch.stats
}
