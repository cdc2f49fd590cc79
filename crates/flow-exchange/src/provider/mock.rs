//! 테스트/드라이런용 스크립트 제공자.
//!
//! - `MockEodProvider`: 미리 넣어 둔 EOD 레코드를 돌려주거나 지정한 에러로 실패
//! - `ScriptedProgramFeed`: 세션마다 정해진 틱을 흘리고 연결 끊김을 재현

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use flow_core::{EodFlowRecord, ProgramFlowTick};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::traits::{EodFlowProvider, ProgramTradeFeed};
use crate::ExchangeError;

/// 이력 조회 시 최대 반환 일수 (KIS 투자자 API와 동일).
const MOCK_HISTORY_DAYS: usize = 30;

// ==================== EOD ====================

/// 스크립트 EOD 제공자.
#[derive(Default)]
pub struct MockEodProvider {
    records: RwLock<HashMap<(String, NaiveDate), EodFlowRecord>>,
    failure: RwLock<Option<ExchangeError>>,
    calls: AtomicU32,
}

impl MockEodProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = EodFlowRecord>) -> Self {
        let provider = Self::new();
        for record in records {
            provider.insert(record);
        }
        provider
    }

    pub fn insert(&self, record: EodFlowRecord) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert((record.ticker.clone(), record.trade_date), record);
    }

    /// 이후 모든 호출을 `error`로 실패시킴. `None`이면 정상 응답으로 복귀.
    pub fn fail_with(&self, error: Option<ExchangeError>) {
        *self.failure.write().unwrap_or_else(|e| e.into_inner()) = error;
    }

    /// 지금까지의 호출 수.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EodFlowProvider for MockEodProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_daily(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<EodFlowRecord, ExchangeError> {
        self.check_failure()?;
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .get(&(ticker.to_string(), date))
            .cloned()
            .ok_or_else(|| ExchangeError::NoData(format!("{} {}", ticker, date)))
    }

    async fn fetch_history(
        &self,
        ticker: &str,
        end_date: NaiveDate,
    ) -> Result<Vec<EodFlowRecord>, ExchangeError> {
        self.check_failure()?;
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut history: Vec<EodFlowRecord> = records
            .values()
            .filter(|r| r.ticker == ticker && r.trade_date <= end_date)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.trade_date.cmp(&a.trade_date));
        history.truncate(MOCK_HISTORY_DAYS);
        Ok(history)
    }
}

// ==================== 프로그램 매매 피드 ====================

/// 세션 한 번의 동작.
#[derive(Debug, Clone)]
pub enum FeedScript {
    /// 틱을 모두 보낸 뒤 연결 끊김
    DeliverThenDisconnect(Vec<ProgramFlowTick>),
    /// 틱을 모두 보낸 뒤 취소될 때까지 유지
    DeliverThenHold(Vec<ProgramFlowTick>),
    /// 연결 실패
    FailConnect(ExchangeError),
}

/// 스크립트 프로그램 매매 피드.
///
/// 스크립트를 모두 소비한 뒤의 세션은 취소될 때까지 아무것도 보내지 않습니다.
#[derive(Default)]
pub struct ScriptedProgramFeed {
    scripts: Mutex<VecDeque<FeedScript>>,
    sessions: AtomicU32,
}

impl ScriptedProgramFeed {
    pub fn new(scripts: impl IntoIterator<Item = FeedScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            sessions: AtomicU32::new(0),
        }
    }

    /// 시작된 세션 수.
    pub fn session_count(&self) -> u32 {
        self.sessions.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Option<FeedScript> {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }
}

async fn deliver(
    ticks: Vec<ProgramFlowTick>,
    tx: &mpsc::Sender<ProgramFlowTick>,
    cancel: &CancellationToken,
) -> bool {
    for tick in ticks {
        if cancel.is_cancelled() || tx.send(tick).await.is_err() {
            return false;
        }
    }
    true
}

#[async_trait]
impl ProgramTradeFeed for ScriptedProgramFeed {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run_session(
        &self,
        _tickers: &[String],
        tx: mpsc::Sender<ProgramFlowTick>,
        cancel: CancellationToken,
    ) -> Result<(), ExchangeError> {
        let session = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(session, "스크립트 피드 세션 시작");

        match self.next_script() {
            Some(FeedScript::DeliverThenDisconnect(ticks)) => {
                if !deliver(ticks, &tx, &cancel).await {
                    return Ok(());
                }
                Err(ExchangeError::Disconnected("스크립트 연결 끊김".to_string()))
            }
            Some(FeedScript::DeliverThenHold(ticks)) => {
                if deliver(ticks, &tx, &cancel).await {
                    cancel.cancelled().await;
                }
                Ok(())
            }
            Some(FeedScript::FailConnect(err)) => Err(err),
            None => {
                cancel.cancelled().await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(day: u32) -> EodFlowRecord {
        EodFlowRecord {
            trade_date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            ticker: "005930".to_string(),
            institutional_net: 1,
            foreign_net: 0,
            individual_net: -1,
            total_value: 0,
            close_price: dec!(70000),
            volume: 0,
        }
    }

    #[tokio::test]
    async fn test_mock_eod_provider() {
        let provider = MockEodProvider::with_records([record(3), record(4), record(5)]);
        let end = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();

        let history = provider.fetch_history("005930", end).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].trade_date, end);

        let missing = provider
            .fetch_daily("005930", NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
            .await;
        assert!(matches!(missing, Err(ExchangeError::NoData(_))));

        provider.fail_with(Some(ExchangeError::Timeout("느림".into())));
        assert!(provider.fetch_daily("005930", end).await.is_err());
        assert_eq!(provider.call_count(), 3);
    }
}
