//! 인메모리 저장소 구현.
//!
//! 단위/통합 테스트에서 PostgreSQL 없이 같은 포트를 제공합니다.
//! 의미는 PostgreSQL 구현과 같습니다: EOD는 (trade_date, ticker) upsert,
//! 틱과 신호는 append-only.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use flow_core::session::{session_close, session_date, session_open};
use flow_core::{
    DurableAppend, EodFlowRecord, EodFlowStore, PatternSignal, PatternSignalStore,
    ProgramFlowTick, StorageError, StorageResult,
};
use tokio::sync::RwLock;

// ==================== EOD ====================

/// 인메모리 EOD 수급 저장소.
#[derive(Default)]
pub struct InMemoryEodFlowStore {
    rows: RwLock<BTreeMap<(String, NaiveDate), EodFlowRecord>>,
    fail_reads: AtomicBool,
}

impl InMemoryEodFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 행 수.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// 이후 조회를 실패시킴 (장애 주입).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Query("injected read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EodFlowStore for InMemoryEodFlowStore {
    async fn upsert(&self, record: &EodFlowRecord) -> StorageResult<()> {
        self.rows
            .write()
            .await
            .insert((record.ticker.clone(), record.trade_date), record.clone());
        Ok(())
    }

    async fn get(&self, ticker: &str, trade_date: NaiveDate) -> StorageResult<Option<EodFlowRecord>> {
        self.check_reads()?;
        Ok(self
            .rows
            .read()
            .await
            .get(&(ticker.to_string(), trade_date))
            .cloned())
    }

    async fn recent_on_or_before(
        &self,
        ticker: &str,
        on_or_before: NaiveDate,
        limit: usize,
    ) -> StorageResult<Vec<EodFlowRecord>> {
        self.check_reads()?;
        let rows = self.rows.read().await;
        Ok(rows
            .range((ticker.to_string(), NaiveDate::MIN)..=(ticker.to_string(), on_or_before))
            .rev()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn trading_dates_before(
        &self,
        ticker: &str,
        before: NaiveDate,
        limit: usize,
    ) -> StorageResult<Vec<NaiveDate>> {
        self.check_reads()?;
        let rows = self.rows.read().await;
        Ok(rows
            .range((ticker.to_string(), NaiveDate::MIN)..(ticker.to_string(), before))
            .rev()
            .take(limit)
            .map(|((_, d), _)| *d)
            .collect())
    }
}

// ==================== 프로그램 틱 ====================

/// 인메모리 프로그램 틱 저장소.
#[derive(Default)]
pub struct InMemoryProgramTickStore {
    ticks: RwLock<Vec<ProgramFlowTick>>,
    fail_appends: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryProgramTickStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 전체 틱 복사본 (입력 순서).
    pub async fn all(&self) -> Vec<ProgramFlowTick> {
        self.ticks.read().await.clone()
    }

    /// 이후 append를 실패시킴 (장애 주입).
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// 이후 조회를 실패시킴 (장애 주입).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Query("injected tick read failure".to_string()));
        }
        Ok(())
    }

    async fn for_ticker(&self, ticker: &str) -> Vec<ProgramFlowTick> {
        let mut ticks: Vec<ProgramFlowTick> = self
            .ticks
            .read()
            .await
            .iter()
            .filter(|t| t.ticker == ticker)
            .cloned()
            .collect();
        // 안정 정렬: 같은 시각은 입력 순서 유지
        ticks.sort_by_key(|t| t.timestamp);
        ticks
    }
}

#[async_trait]
impl DurableAppend for InMemoryProgramTickStore {
    async fn append(&self, tick: &ProgramFlowTick) -> StorageResult<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StorageError::Insert("injected append failure".to_string()));
        }
        self.ticks.write().await.push(tick.clone());
        Ok(())
    }

    async fn ticks_between(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<ProgramFlowTick>> {
        self.check_reads()?;
        Ok(self
            .for_ticker(ticker)
            .await
            .into_iter()
            .filter(|t| t.timestamp >= from && t.timestamp <= to)
            .collect())
    }

    async fn recent_ticks(&self, ticker: &str, limit: usize) -> StorageResult<Vec<ProgramFlowTick>> {
        self.check_reads()?;
        let ticks = self.for_ticker(ticker).await;
        let skip = ticks.len().saturating_sub(limit);
        Ok(ticks.into_iter().skip(skip).collect())
    }

    async fn daily_net_volumes(
        &self,
        ticker: &str,
        dates: &[NaiveDate],
    ) -> StorageResult<Vec<(NaiveDate, i64)>> {
        self.check_reads()?;
        let wanted: HashSet<NaiveDate> = dates.iter().copied().collect();
        let mut totals: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for tick in self.ticks.read().await.iter().filter(|t| t.ticker == ticker) {
            let date = session_date(tick.timestamp);
            let in_session =
                tick.timestamp >= session_open(date) && tick.timestamp <= session_close(date);
            if in_session && wanted.contains(&date) {
                *totals.entry(date).or_insert(0) += tick.net_volume;
            }
        }
        Ok(totals.into_iter().rev().collect())
    }
}

// ==================== 패턴 신호 ====================

/// 인메모리 패턴 신호 저장소.
#[derive(Default)]
pub struct InMemoryPatternSignalStore {
    signals: RwLock<Vec<PatternSignal>>,
    fail_inserts: AtomicBool,
}

impl InMemoryPatternSignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 전체 신호 복사본 (입력 순서).
    pub async fn all(&self) -> Vec<PatternSignal> {
        self.signals.read().await.clone()
    }

    /// 이후 insert를 실패시킴 (장애 주입).
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PatternSignalStore for InMemoryPatternSignalStore {
    async fn insert(&self, signal: &PatternSignal) -> StorageResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Insert("injected insert failure".to_string()));
        }
        let mut signals = self.signals.write().await;
        if signals.iter().any(|s| s.id == signal.id) {
            return Err(StorageError::Insert(format!("중복 신호 id: {}", signal.id)));
        }
        signals.push(signal.clone());
        Ok(())
    }

    async fn find_composite(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<PatternSignal>> {
        let mut found: Vec<PatternSignal> = self
            .signals
            .read()
            .await
            .iter()
            .filter(|s| {
                s.ticker == ticker
                    && s.composite_strong()
                    && s.reference_time >= from
                    && s.reference_time < to
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.reference_time.cmp(&a.reference_time));
        found.truncate(limit);
        Ok(found)
    }

    async fn recent(&self, ticker: &str, limit: usize) -> StorageResult<Vec<PatternSignal>> {
        let mut found: Vec<PatternSignal> = self
            .signals
            .read()
            .await
            .iter()
            .filter(|s| s.ticker == ticker)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.reference_time.cmp(&a.reference_time));
        found.truncate(limit);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};
    use rust_decimal_macros::dec;

    fn eod(day: u32, institutional_net: i64) -> EodFlowRecord {
        EodFlowRecord {
            trade_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            ticker: "005930".to_string(),
            institutional_net,
            foreign_net: 0,
            individual_net: -institutional_net,
            total_value: 1_000_000,
            close_price: dec!(70000),
            volume: 100,
        }
    }

    #[tokio::test]
    async fn test_eod_upsert_is_idempotent() {
        let store = InMemoryEodFlowStore::new();
        store.upsert(&eod(4, 10)).await.unwrap();
        store.upsert(&eod(4, 25)).await.unwrap();

        assert_eq!(store.len().await, 1);
        let stored = store
            .get("005930", NaiveDate::from_ymd_opt(2026, 3, 4).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.institutional_net, 25);
    }

    #[tokio::test]
    async fn test_eod_recent_window_order() {
        let store = InMemoryEodFlowStore::new();
        for day in 2..=6 {
            store.upsert(&eod(day, day as i64)).await.unwrap();
        }
        let cutoff = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();

        let recent = store.recent_on_or_before("005930", cutoff, 3).await.unwrap();
        let days: Vec<u32> = recent.iter().map(|r| r.trade_date.day0() + 1).collect();
        assert_eq!(days, vec![5, 4, 3]);

        let before = store.trading_dates_before("005930", cutoff, 10).await.unwrap();
        assert_eq!(before.len(), 3);
        assert!(before.iter().all(|d| *d < cutoff));

        assert!(store.recent_on_or_before("000660", cutoff, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_daily_net_volume_regular_session_only() {
        let store = InMemoryProgramTickStore::new();
        let times = [
            // 3월 4일 10:00, 11:00 KST
            Utc.with_ymd_and_hms(2026, 3, 4, 1, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 4, 2, 0, 0).unwrap(),
            // 3월 4일 15:40 KST (장후)
            Utc.with_ymd_and_hms(2026, 3, 4, 6, 40, 0).unwrap(),
            // 3월 5일 08:30 KST (장전)
            Utc.with_ymd_and_hms(2026, 3, 4, 23, 30, 0).unwrap(),
            // 3월 5일 15:30 KST (종료 시각 포함)
            Utc.with_ymd_and_hms(2026, 3, 5, 6, 30, 0).unwrap(),
        ];
        for (i, ts) in times.iter().enumerate() {
            let tick = ProgramFlowTick::new(*ts, "005930", 100, 7_000_000, dec!(70000), (i as i64 + 1) * 100);
            store.append(&tick).await.unwrap();
        }

        let d4 = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        let d5 = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let d6 = NaiveDate::from_ymd_opt(2026, 3, 6).unwrap();
        let totals = store.daily_net_volumes("005930", &[d4, d5, d6]).await.unwrap();
        assert_eq!(totals, vec![(d5, 100), (d4, 200)]);

        let recent = store.recent_ticks("005930", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].timestamp, times[4]);
    }

    #[tokio::test]
    async fn test_tick_read_failure_injection() {
        let store = InMemoryProgramTickStore::new();
        store.set_fail_reads(true);
        let d4 = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();

        assert!(matches!(
            store.daily_net_volumes("005930", &[d4]).await,
            Err(StorageError::Query(_))
        ));
        assert!(store.recent_ticks("005930", 10).await.is_err());

        store.set_fail_reads(false);
        assert!(store.recent_ticks("005930", 10).await.unwrap().is_empty());
    }
}
