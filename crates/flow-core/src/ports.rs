//! 저장소 포트.
//!
//! 평가기와 수집기는 이 트레이트에만 의존하며, PostgreSQL 구현과
//! 인메모리 구현은 `flow-data`가 제공합니다.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{EodFlowRecord, PatternSignal, ProgramFlowTick};
use crate::error::StorageResult;

/// 일별 투자자별 수급 저장소.
#[async_trait]
pub trait EodFlowStore: Send + Sync {
    /// (trade_date, ticker) 기준 upsert. 같은 키로 다시 쓰면 마지막 값이 남습니다.
    async fn upsert(&self, record: &EodFlowRecord) -> StorageResult<()>;

    /// 단건 조회.
    async fn get(&self, ticker: &str, trade_date: NaiveDate) -> StorageResult<Option<EodFlowRecord>>;

    /// `trade_date <= on_or_before`인 최근 레코드 (날짜 내림차순, 최대 `limit`건).
    async fn recent_on_or_before(
        &self,
        ticker: &str,
        on_or_before: NaiveDate,
        limit: usize,
    ) -> StorageResult<Vec<EodFlowRecord>>;

    /// `trade_date < before`인 최근 거래일 (날짜 내림차순, 최대 `limit`건).
    async fn trading_dates_before(
        &self,
        ticker: &str,
        before: NaiveDate,
        limit: usize,
    ) -> StorageResult<Vec<NaiveDate>>;
}

/// 프로그램 매매 틱 영구 저장소 (append-only).
#[async_trait]
pub trait DurableAppend: Send + Sync {
    /// 틱 추가.
    async fn append(&self, tick: &ProgramFlowTick) -> StorageResult<()>;

    /// `[from, to]` 구간 틱 (시간 오름차순).
    async fn ticks_between(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<ProgramFlowTick>>;

    /// 최근 `limit`건 (시간 오름차순). 링버퍼 재구성에 사용합니다.
    async fn recent_ticks(&self, ticker: &str, limit: usize) -> StorageResult<Vec<ProgramFlowTick>>;

    /// 주어진 KST 일자별 정규장 `[09:00, 15:30]` 프로그램 순매수 수량 합계.
    ///
    /// 장전/장후 틱은 제외합니다. 구간 내 틱이 없는 날짜는 결과에 포함되지 않습니다.
    async fn daily_net_volumes(
        &self,
        ticker: &str,
        dates: &[NaiveDate],
    ) -> StorageResult<Vec<(NaiveDate, i64)>>;
}

/// 링버퍼 읽기 결과 (복사본).
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    /// 시간 오름차순 틱
    pub ticks: Vec<ProgramFlowTick>,
    /// 링버퍼 용량
    pub capacity: usize,
}

impl WindowSnapshot {
    /// 링버퍼가 가득 차서 과거 틱이 밀려났을 수 있는지 여부.
    pub fn is_full(&self) -> bool {
        self.ticks.len() >= self.capacity
    }

    /// `since` 이후 전체 틱을 담고 있는지 여부.
    ///
    /// 가득 차지 않았다면 밀려난 틱이 없으므로 항상 참입니다.
    pub fn covers_since(&self, since: DateTime<Utc>) -> bool {
        if !self.is_full() {
            return true;
        }
        self.ticks.first().is_some_and(|t| t.timestamp <= since)
    }
}

/// 수집기 메모리 창 읽기 (빠른 경로).
///
/// 쓰기는 수집 태스크만 하며, 읽는 쪽은 항상 복사본을 받습니다.
pub trait FastRead: Send + Sync {
    /// 종목의 현재 창 스냅샷. 추적하지 않는 종목이면 `None`.
    fn snapshot(&self, ticker: &str) -> Option<WindowSnapshot>;
}

/// 패턴 신호 저장소 (append-only).
#[async_trait]
pub trait PatternSignalStore: Send + Sync {
    /// 신호 추가. 기존 행은 수정하지 않습니다.
    async fn insert(&self, signal: &PatternSignal) -> StorageResult<()>;

    /// `composite_strong`이고 `reference_time ∈ [from, to)`인 신호 (최신순, 최대 `limit`건).
    async fn find_composite(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<PatternSignal>>;

    /// 종목의 최근 신호 이력 (최신순).
    async fn recent(&self, ticker: &str, limit: usize) -> StorageResult<Vec<PatternSignal>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn tick(minute: u32) -> ProgramFlowTick {
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 0, minute, 0).unwrap();
        ProgramFlowTick::new(ts, "005930", 10, 700_000, dec!(70000), minute as i64)
    }

    #[test]
    fn test_snapshot_coverage() {
        let open = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();

        let partial = WindowSnapshot { ticks: vec![tick(5), tick(6)], capacity: 3 };
        assert!(partial.covers_since(open));

        let full_late = WindowSnapshot { ticks: vec![tick(5), tick(6), tick(7)], capacity: 3 };
        assert!(!full_late.covers_since(open));

        let full_early = WindowSnapshot { ticks: vec![tick(0), tick(6), tick(7)], capacity: 3 };
        assert!(full_early.covers_since(open));
    }
}
