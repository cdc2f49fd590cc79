//! 프로그램 매매 틱 저장소 (`program_flow_tick`).
//!
//! 쓰기량이 많은 append-only 테이블입니다. 같은 초에 들어온 체결도
//! 모두 보존하도록 대리키(`id BIGSERIAL`)를 사용합니다.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use flow_core::session::{session_close, session_open, SESSION_CLOSE, SESSION_OPEN};
use flow_core::{DurableAppend, ProgramFlowTick, ProgramSide, StorageError, StorageResult};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::instrument;

/// `program_flow_tick` 행.
#[derive(Debug, Clone, FromRow)]
pub struct ProgramTickRow {
    pub ts: DateTime<Utc>,
    pub ticker: String,
    pub net_volume: i64,
    pub net_value: i64,
    pub side: String,
    pub price: Decimal,
    pub total_volume_to_date: i64,
}

impl TryFrom<ProgramTickRow> for ProgramFlowTick {
    type Error = StorageError;

    fn try_from(row: ProgramTickRow) -> Result<Self, Self::Error> {
        let stored: ProgramSide = row.side.parse().map_err(StorageError::Decode)?;
        let tick = ProgramFlowTick::new(
            row.ts,
            row.ticker,
            row.net_volume,
            row.net_value,
            row.price,
            row.total_volume_to_date,
        );
        if tick.side() != stored {
            return Err(StorageError::Decode(format!(
                "side {} does not match net_volume {}",
                stored, tick.net_volume
            )));
        }
        Ok(tick)
    }
}

fn into_ticks(rows: Vec<ProgramTickRow>) -> StorageResult<Vec<ProgramFlowTick>> {
    rows.into_iter().map(ProgramFlowTick::try_from).collect()
}

/// PostgreSQL 기반 프로그램 틱 저장소.
#[derive(Clone)]
pub struct PgProgramTickStore {
    pool: PgPool,
}

impl PgProgramTickStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DurableAppend for PgProgramTickStore {
    async fn append(&self, tick: &ProgramFlowTick) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO program_flow_tick
                (ts, ticker, net_volume, net_value, side, price, total_volume_to_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tick.timestamp)
        .bind(&tick.ticker)
        .bind(tick.net_volume)
        .bind(tick.net_value)
        .bind(tick.side().as_str())
        .bind(tick.price)
        .bind(tick.total_volume_to_date)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Insert(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn ticks_between(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<ProgramFlowTick>> {
        let rows: Vec<ProgramTickRow> = sqlx::query_as(
            r#"
            SELECT ts, ticker, net_volume, net_value, side, price, total_volume_to_date
            FROM program_flow_tick
            WHERE ticker = $1 AND ts >= $2 AND ts <= $3
            ORDER BY ts ASC, id ASC
            "#,
        )
        .bind(ticker)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        into_ticks(rows)
    }

    #[instrument(skip(self))]
    async fn recent_ticks(&self, ticker: &str, limit: usize) -> StorageResult<Vec<ProgramFlowTick>> {
        let rows: Vec<ProgramTickRow> = sqlx::query_as(
            r#"
            SELECT ts, ticker, net_volume, net_value, side, price, total_volume_to_date
            FROM (
                SELECT id, ts, ticker, net_volume, net_value, side, price, total_volume_to_date
                FROM program_flow_tick
                WHERE ticker = $1
                ORDER BY ts DESC, id DESC
                LIMIT $2
            ) recent
            ORDER BY ts ASC, id ASC
            "#,
        )
        .bind(ticker)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        into_ticks(rows)
    }

    #[instrument(skip(self, dates), fields(days = dates.len()))]
    async fn daily_net_volumes(
        &self,
        ticker: &str,
        dates: &[NaiveDate],
    ) -> StorageResult<Vec<(NaiveDate, i64)>> {
        let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
            return Ok(Vec::new());
        };

        // 시간 범위로 먼저 좁힌 뒤 KST 일자별 정규장 구간만 집계
        let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
            r#"
            SELECT (ts AT TIME ZONE 'Asia/Seoul')::date AS trade_date,
                   SUM(net_volume)::BIGINT AS net_volume
            FROM program_flow_tick
            WHERE ticker = $1
              AND ts >= $2 AND ts <= $3
              AND (ts AT TIME ZONE 'Asia/Seoul')::date = ANY($4)
              AND (ts AT TIME ZONE 'Asia/Seoul')::time BETWEEN $5 AND $6
            GROUP BY 1
            ORDER BY 1 DESC
            "#,
        )
        .bind(ticker)
        .bind(session_open(*first))
        .bind(session_close(*last))
        .bind(dates.to_vec())
        .bind(SESSION_OPEN)
        .bind(SESSION_CLOSE)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(rows)
    }
}
