//! 일별 투자자별 수급 저장소 (`eod_investor_flow`).

use async_trait::async_trait;
use chrono::NaiveDate;
use flow_core::{EodFlowRecord, EodFlowStore, StorageError, StorageResult};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::{debug, instrument};

/// `eod_investor_flow` 행.
#[derive(Debug, Clone, FromRow)]
pub struct EodFlowRow {
    pub trade_date: NaiveDate,
    pub ticker: String,
    pub institutional_net: i64,
    pub foreign_net: i64,
    pub individual_net: i64,
    pub total_value: i64,
    pub close_price: Decimal,
    pub volume: i64,
}

impl From<EodFlowRow> for EodFlowRecord {
    fn from(row: EodFlowRow) -> Self {
        Self {
            trade_date: row.trade_date,
            ticker: row.ticker,
            institutional_net: row.institutional_net,
            foreign_net: row.foreign_net,
            individual_net: row.individual_net,
            total_value: row.total_value,
            close_price: row.close_price,
            volume: row.volume,
        }
    }
}

/// PostgreSQL 기반 EOD 수급 저장소.
#[derive(Clone)]
pub struct PgEodFlowStore {
    pool: PgPool,
}

impl PgEodFlowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EodFlowStore for PgEodFlowStore {
    #[instrument(skip(self, record), fields(ticker = %record.ticker, trade_date = %record.trade_date))]
    async fn upsert(&self, record: &EodFlowRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO eod_investor_flow
                (trade_date, ticker, institutional_net, foreign_net, individual_net,
                 total_value, close_price, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (trade_date, ticker) DO UPDATE SET
                institutional_net = EXCLUDED.institutional_net,
                foreign_net = EXCLUDED.foreign_net,
                individual_net = EXCLUDED.individual_net,
                total_value = EXCLUDED.total_value,
                close_price = EXCLUDED.close_price,
                volume = EXCLUDED.volume,
                collected_at = NOW()
            "#,
        )
        .bind(record.trade_date)
        .bind(&record.ticker)
        .bind(record.institutional_net)
        .bind(record.foreign_net)
        .bind(record.individual_net)
        .bind(record.total_value)
        .bind(record.close_price)
        .bind(record.volume)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Insert(e.to_string()))?;

        debug!("EOD 수급 저장");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, ticker: &str, trade_date: NaiveDate) -> StorageResult<Option<EodFlowRecord>> {
        let row: Option<EodFlowRow> = sqlx::query_as(
            r#"
            SELECT trade_date, ticker, institutional_net, foreign_net, individual_net,
                   total_value, close_price, volume
            FROM eod_investor_flow
            WHERE ticker = $1 AND trade_date = $2
            "#,
        )
        .bind(ticker)
        .bind(trade_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(row.map(EodFlowRecord::from))
    }

    #[instrument(skip(self))]
    async fn recent_on_or_before(
        &self,
        ticker: &str,
        on_or_before: NaiveDate,
        limit: usize,
    ) -> StorageResult<Vec<EodFlowRecord>> {
        let rows: Vec<EodFlowRow> = sqlx::query_as(
            r#"
            SELECT trade_date, ticker, institutional_net, foreign_net, individual_net,
                   total_value, close_price, volume
            FROM eod_investor_flow
            WHERE ticker = $1 AND trade_date <= $2
            ORDER BY trade_date DESC
            LIMIT $3
            "#,
        )
        .bind(ticker)
        .bind(on_or_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(rows.into_iter().map(EodFlowRecord::from).collect())
    }

    #[instrument(skip(self))]
    async fn trading_dates_before(
        &self,
        ticker: &str,
        before: NaiveDate,
        limit: usize,
    ) -> StorageResult<Vec<NaiveDate>> {
        let dates: Vec<(NaiveDate,)> = sqlx::query_as(
            r#"
            SELECT trade_date
            FROM eod_investor_flow
            WHERE ticker = $1 AND trade_date < $2
            ORDER BY trade_date DESC
            LIMIT $3
            "#,
        )
        .bind(ticker)
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(dates.into_iter().map(|(d,)| d).collect())
    }
}
