//! 과거 유사 사례 조회.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use flow_core::session::{day_start, session_date};
use flow_core::{PatternSignal, PatternSignalStore, StorageResult};
use tracing::debug;

/// 같은 종목의 과거 복합 신호 조회기.
pub struct SimilarCaseSearcher {
    store: Arc<dyn PatternSignalStore>,
    limit: usize,
}

impl SimilarCaseSearcher {
    pub fn new(store: Arc<dyn PatternSignalStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// `[reference_time − lookback_days, reference_time)` 구간의 복합 신호 (최신순).
    ///
    /// 기준 시각과 같은 KST 세션 일자의 신호는 제외합니다. 같은 날 재평가로
    /// 쌓인 행이 유사 사례로 잡히지 않도록 조회 상한을 그 날 00:00 KST로 당깁니다.
    pub async fn find_similar(
        &self,
        ticker: &str,
        reference_time: DateTime<Utc>,
        lookback_days: i64,
    ) -> StorageResult<Vec<PatternSignal>> {
        if lookback_days <= 0 || self.limit == 0 {
            return Ok(Vec::new());
        }

        let reference_date = session_date(reference_time);
        let from = reference_time - Duration::days(lookback_days);
        let to = day_start(reference_date).min(reference_time);

        let mut found = self.store.find_composite(ticker, from, to, self.limit).await?;
        found.retain(|s| {
            s.ticker == ticker
                && s.composite_strong()
                && s.reference_time >= from
                && s.reference_time < reference_time
                && session_date(s.reference_time) != reference_date
        });
        found.sort_by(|a, b| b.reference_time.cmp(&a.reference_time));
        found.truncate(self.limit);

        debug!(ticker, lookback_days, count = found.len(), "유사 사례 조회");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use flow_core::{
        EodRefreshStatus, InstitutionalDetail, ProgramDetail, TriggerDetail, TriggerStatus,
    };
    use uuid::Uuid;

    /// 조회 조건을 무시하고 모든 행을 돌려주는 저장소 (2차 필터 검증용).
    struct LeakyStore(Vec<PatternSignal>);

    #[async_trait]
    impl PatternSignalStore for LeakyStore {
        async fn insert(&self, _signal: &PatternSignal) -> StorageResult<()> {
            Ok(())
        }

        async fn find_composite(
            &self,
            _ticker: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
            _limit: usize,
        ) -> StorageResult<Vec<PatternSignal>> {
            Ok(self.0.clone())
        }

        async fn recent(&self, _ticker: &str, _limit: usize) -> StorageResult<Vec<PatternSignal>> {
            Ok(self.0.clone())
        }
    }

    fn signal(ticker: &str, at: DateTime<Utc>, composite: bool) -> PatternSignal {
        PatternSignal {
            id: Uuid::new_v4(),
            reference_time: at,
            ticker: ticker.to_string(),
            daily_institutional_strong: true,
            realtime_program_strong: composite,
            institutional_buy_day_count: 3,
            program_volume_snapshot: 0,
            program_ratio_snapshot: None,
            trigger_detail: TriggerDetail {
                session_date: session_date(at),
                eod_refresh: EodRefreshStatus::Skipped,
                institutional: InstitutionalDetail {
                    status: TriggerStatus::Evaluated,
                    window_days: 5,
                    available_days: 5,
                    positive_days: 3,
                    latest_positive: true,
                    latest_trade_date: NaiveDate::from_ymd_opt(2026, 3, 5),
                    min_positive_days: 3,
                },
                program: ProgramDetail {
                    status: TriggerStatus::Evaluated,
                    source: None,
                    tick_count: 0,
                    current_volume: 0,
                    history_days: 30,
                    average_volume: None,
                    threshold_volume: None,
                    percentile_volume: None,
                    percentile: 0.9,
                    volume_multiplier: 2.5,
                },
            },
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_second_guard_filters_leaky_rows() {
        // 2026-03-05 15:00 KST
        let reference = Utc.with_ymd_and_hms(2026, 3, 5, 6, 0, 0).unwrap();
        let same_day_earlier = Utc.with_ymd_and_hms(2026, 3, 5, 1, 0, 0).unwrap();
        let last_week = Utc.with_ymd_and_hms(2026, 2, 26, 6, 0, 0).unwrap();
        let too_old = Utc.with_ymd_and_hms(2025, 1, 2, 6, 0, 0).unwrap();

        let store = LeakyStore(vec![
            signal("005930", last_week, true),
            signal("005930", last_week, false),
            signal("005930", same_day_earlier, true),
            signal("005930", too_old, true),
            signal("000660", last_week, true),
        ]);
        let searcher = SimilarCaseSearcher::new(Arc::new(store), 5);

        let found = searcher.find_similar("005930", reference, 365).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].composite_strong());
        assert_eq!(found[0].reference_time, last_week);
    }

    #[tokio::test]
    async fn test_non_positive_lookback_is_empty() {
        let reference = Utc.with_ymd_and_hms(2026, 3, 5, 6, 0, 0).unwrap();
        let store = LeakyStore(vec![signal("005930", reference, true)]);
        let searcher = SimilarCaseSearcher::new(Arc::new(store), 5);

        assert!(searcher.find_similar("005930", reference, 0).await.unwrap().is_empty());
    }
}
