//! 일별 투자자별 수급(EOD) 수집 모듈.
//!
//! 제공자에서 (종목, 거래일) 단위로 조회해 `EodFlowStore`에 upsert합니다.
//! 같은 날을 다시 수집하면 마지막 값이 남으므로 재실행해도 안전합니다.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use flow_analytics::EodRefresher;
use flow_core::{EodFlowRecord, EodFlowStore, EodRefreshStatus, StorageError};
use flow_exchange::{with_retry, EodFlowProvider, ExchangeError, RetryConfig};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::CollectionStats;

/// 단건 수집 실패.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// 휴장일 등 제공자에 해당 일자 데이터 없음
    #[error("데이터 없음: {ticker} {date}")]
    DataUnavailable { ticker: String, date: NaiveDate },

    /// 재시도 소진 또는 재시도 불가 제공자 오류
    #[error("제공자 오류: {0}")]
    Provider(ExchangeError),

    /// 저장 실패
    #[error("저장소 오류: {0}")]
    Storage(#[from] StorageError),
}

/// EOD 수집기.
pub struct EodCollector {
    provider: Arc<dyn EodFlowProvider>,
    store: Arc<dyn EodFlowStore>,
    retry: RetryConfig,
    request_delay: Duration,
}

impl EodCollector {
    pub fn new(provider: Arc<dyn EodFlowProvider>, store: Arc<dyn EodFlowStore>) -> Self {
        Self {
            provider,
            store,
            retry: RetryConfig::default(),
            request_delay: Duration::ZERO,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 종목 간 요청 딜레이 (호출 한도 회피)
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// 단일 (종목, 거래일) 수집 후 upsert.
    pub async fn collect(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<EodFlowRecord, CollectionError> {
        let record = with_retry(&self.retry, || self.provider.fetch_daily(ticker, date))
            .await
            .map_err(|e| match e {
                ExchangeError::NoData(_) => CollectionError::DataUnavailable {
                    ticker: ticker.to_string(),
                    date,
                },
                other => CollectionError::Provider(other),
            })?;

        self.store.upsert(&record).await?;
        debug!(
            ticker,
            %date,
            institutional_net = record.institutional_net,
            "EOD 수급 저장"
        );
        Ok(record)
    }

    /// 여러 종목의 같은 거래일 수집.
    ///
    /// 한 종목 실패가 나머지를 막지 않습니다. 치명적 오류(인증 등)만 즉시 중단합니다.
    pub async fn collect_all(&self, tickers: &[String], date: NaiveDate) -> CollectionStats {
        let start = Instant::now();
        let mut stats = CollectionStats::new();

        info!(
            provider = self.provider.name(),
            tickers = tickers.len(),
            %date,
            "EOD 수급 수집 시작"
        );

        for (i, ticker) in tickers.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            stats.total += 1;

            match self.collect(ticker, date).await {
                Ok(_) => {
                    stats.success += 1;
                    stats.total_records += 1;
                }
                Err(CollectionError::DataUnavailable { .. }) => {
                    debug!(ticker = %ticker, %date, "EOD 데이터 없음 (휴장 추정)");
                    stats.empty += 1;
                }
                Err(CollectionError::Provider(e)) if e.is_fatal() => {
                    warn!(ticker = %ticker, error = %e, "치명적 제공자 오류, 수집 중단");
                    stats.errors += 1;
                    break;
                }
                Err(e) => {
                    warn!(ticker = %ticker, %date, error = %e, "EOD 수집 실패");
                    stats.errors += 1;
                }
            }
        }

        stats.elapsed = start.elapsed();
        stats
    }

    /// `end_date` 이하 최근 `days` 거래일 이력 적재.
    ///
    /// 제공자가 돌려주는 범위까지만 채워지며, 저장한 레코드 수를 반환합니다.
    pub async fn backfill(
        &self,
        ticker: &str,
        end_date: NaiveDate,
        days: usize,
    ) -> Result<usize, CollectionError> {
        let mut history = with_retry(&self.retry, || {
            self.provider.fetch_history(ticker, end_date)
        })
        .await
        .map_err(|e| match e {
            ExchangeError::NoData(_) => CollectionError::DataUnavailable {
                ticker: ticker.to_string(),
                date: end_date,
            },
            other => CollectionError::Provider(other),
        })?;

        history.sort_by(|a, b| b.trade_date.cmp(&a.trade_date));
        history.truncate(days);

        for record in &history {
            self.store.upsert(record).await?;
        }

        if history.len() < days {
            warn!(
                ticker,
                requested = days,
                stored = history.len(),
                "제공자 이력이 요청 일수보다 짧음"
            );
        }
        info!(ticker, %end_date, stored = history.len(), "EOD 이력 백필 완료");
        Ok(history.len())
    }
}

#[async_trait]
impl EodRefresher for EodCollector {
    async fn refresh(&self, ticker: &str, date: NaiveDate) -> EodRefreshStatus {
        match self.collect(ticker, date).await {
            Ok(_) => EodRefreshStatus::Refreshed,
            Err(CollectionError::DataUnavailable { .. }) => EodRefreshStatus::DataUnavailable,
            Err(e) => EodRefreshStatus::Failed {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_data::InMemoryEodFlowStore;
    use flow_exchange::provider::MockEodProvider;
    use rust_decimal_macros::dec;

    fn record(ticker: &str, date: NaiveDate, institutional_net: i64) -> EodFlowRecord {
        EodFlowRecord {
            trade_date: date,
            ticker: ticker.to_string(),
            institutional_net,
            foreign_net: -institutional_net / 2,
            individual_net: -institutional_net / 2,
            total_value: 1_000_000_000,
            close_price: dec!(71200),
            volume: 12_000_000,
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    fn collector(
        provider: Arc<MockEodProvider>,
        store: Arc<InMemoryEodFlowStore>,
    ) -> EodCollector {
        EodCollector::new(provider, store).with_retry(fast_retry())
    }

    #[tokio::test]
    async fn test_collect_twice_keeps_single_record() {
        let provider = Arc::new(MockEodProvider::with_records([record("005930", date(5), 100)]));
        let store = Arc::new(InMemoryEodFlowStore::new());
        let collector = collector(provider.clone(), store.clone());

        collector.collect("005930", date(5)).await.unwrap();
        provider.insert(record("005930", date(5), 250));
        collector.collect("005930", date(5)).await.unwrap();

        assert_eq!(store.len().await, 1);
        let stored = store.get("005930", date(5)).await.unwrap().unwrap();
        assert_eq!(stored.institutional_net, 250);
    }

    #[tokio::test]
    async fn test_holiday_maps_to_data_unavailable() {
        let provider = Arc::new(MockEodProvider::new());
        let store = Arc::new(InMemoryEodFlowStore::new());
        let collector = collector(provider.clone(), store.clone());

        let err = collector.collect("005930", date(1)).await.unwrap_err();
        assert!(matches!(err, CollectionError::DataUnavailable { .. }));
        // NoData는 재시도하지 않음
        assert_eq!(provider.call_count(), 1);
        assert_eq!(
            collector.refresh("005930", date(1)).await,
            EodRefreshStatus::DataUnavailable
        );
    }

    #[tokio::test]
    async fn test_transient_error_exhausts_retries() {
        let provider = Arc::new(MockEodProvider::with_records([record("005930", date(5), 100)]));
        provider.fail_with(Some(ExchangeError::NetworkError("reset".to_string())));
        let store = Arc::new(InMemoryEodFlowStore::new());
        let collector = collector(provider.clone(), store.clone());

        let status = collector.refresh("005930", date(5)).await;
        assert!(matches!(status, EodRefreshStatus::Failed { .. }));
        assert_eq!(provider.call_count(), 3);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_collect_all_counts_outcomes() {
        let provider = Arc::new(MockEodProvider::with_records([
            record("005930", date(5), 100),
            record("000660", date(5), -40),
        ]));
        let store = Arc::new(InMemoryEodFlowStore::new());
        let collector = collector(provider, store.clone());

        let tickers = vec!["005930".to_string(), "000660".to_string(), "035720".to_string()];
        let stats = collector.collect_all(&tickers, date(5)).await;

        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.empty, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_collect_all_stops_on_fatal_error() {
        let provider = Arc::new(MockEodProvider::new());
        provider.fail_with(Some(ExchangeError::Unauthorized("appkey".to_string())));
        let store = Arc::new(InMemoryEodFlowStore::new());
        let collector = collector(provider.clone(), store);

        let tickers = vec!["005930".to_string(), "000660".to_string()];
        let stats = collector.collect_all(&tickers, date(5)).await;

        assert_eq!(stats.total, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_backfill_limits_days() {
        let provider = Arc::new(MockEodProvider::with_records(
            (2..=13).map(|d| record("005930", date(d), d as i64)),
        ));
        let store = Arc::new(InMemoryEodFlowStore::new());
        let collector = collector(provider, store.clone());

        let stored = collector.backfill("005930", date(13), 5).await.unwrap();
        assert_eq!(stored, 5);

        let recent = store.recent_on_or_before("005930", date(13), 10).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].trade_date, date(13));
        assert_eq!(recent[4].trade_date, date(9));
    }
}
