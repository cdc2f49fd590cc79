//! 패턴 신호 저장소 (`pattern_signal`).
//!
//! `composite_strong`은 DB 생성 컬럼이므로 INSERT에 포함하지 않습니다.
//! 읽을 때는 저장된 값과 입력값을 다시 대조합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flow_core::{
    PatternSignal, PatternSignalRecord, PatternSignalStore, StorageError, StorageResult,
    TriggerDetail,
};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{debug, instrument};
use uuid::Uuid;

/// `pattern_signal` 행.
#[derive(Debug, Clone, FromRow)]
pub struct PatternSignalRow {
    pub id: Uuid,
    pub reference_time: DateTime<Utc>,
    pub ticker: String,
    pub daily_institutional_strong: bool,
    pub realtime_program_strong: bool,
    pub composite_strong: bool,
    pub institutional_buy_day_count: i16,
    pub program_volume_snapshot: i64,
    pub program_ratio_snapshot: Option<f64>,
    pub trigger_detail: Json<TriggerDetail>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PatternSignalRow> for PatternSignal {
    type Error = StorageError;

    fn try_from(row: PatternSignalRow) -> Result<Self, Self::Error> {
        let institutional_buy_day_count = u8::try_from(row.institutional_buy_day_count)
            .map_err(|e| StorageError::Decode(format!("institutional_buy_day_count: {}", e)))?;

        PatternSignal::try_from(PatternSignalRecord {
            id: row.id,
            reference_time: row.reference_time,
            ticker: row.ticker,
            daily_institutional_strong: row.daily_institutional_strong,
            realtime_program_strong: row.realtime_program_strong,
            composite_strong: row.composite_strong,
            institutional_buy_day_count,
            program_volume_snapshot: row.program_volume_snapshot,
            program_ratio_snapshot: row.program_ratio_snapshot,
            trigger_detail: row.trigger_detail.0,
            created_at: row.created_at,
        })
        .map_err(StorageError::Decode)
    }
}

fn into_signals(rows: Vec<PatternSignalRow>) -> StorageResult<Vec<PatternSignal>> {
    rows.into_iter().map(PatternSignal::try_from).collect()
}

/// PostgreSQL 기반 패턴 신호 저장소.
#[derive(Clone)]
pub struct PgPatternSignalStore {
    pool: PgPool,
}

impl PgPatternSignalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PatternSignalStore for PgPatternSignalStore {
    #[instrument(skip(self, signal), fields(ticker = %signal.ticker, id = %signal.id))]
    async fn insert(&self, signal: &PatternSignal) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pattern_signal
                (id, reference_time, ticker, daily_institutional_strong, realtime_program_strong,
                 institutional_buy_day_count, program_volume_snapshot, program_ratio_snapshot,
                 trigger_detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(signal.id)
        .bind(signal.reference_time)
        .bind(&signal.ticker)
        .bind(signal.daily_institutional_strong)
        .bind(signal.realtime_program_strong)
        .bind(i16::from(signal.institutional_buy_day_count))
        .bind(signal.program_volume_snapshot)
        .bind(signal.program_ratio_snapshot)
        .bind(Json(&signal.trigger_detail))
        .bind(signal.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Insert(e.to_string()))?;

        debug!(composite = signal.composite_strong(), "패턴 신호 저장");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_composite(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<PatternSignal>> {
        let rows: Vec<PatternSignalRow> = sqlx::query_as(
            r#"
            SELECT id, reference_time, ticker, daily_institutional_strong, realtime_program_strong,
                   composite_strong, institutional_buy_day_count, program_volume_snapshot,
                   program_ratio_snapshot, trigger_detail, created_at
            FROM pattern_signal
            WHERE ticker = $1
              AND composite_strong
              AND reference_time >= $2 AND reference_time < $3
            ORDER BY reference_time DESC
            LIMIT $4
            "#,
        )
        .bind(ticker)
        .bind(from)
        .bind(to)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        into_signals(rows)
    }

    #[instrument(skip(self))]
    async fn recent(&self, ticker: &str, limit: usize) -> StorageResult<Vec<PatternSignal>> {
        let rows: Vec<PatternSignalRow> = sqlx::query_as(
            r#"
            SELECT id, reference_time, ticker, daily_institutional_strong, realtime_program_strong,
                   composite_strong, institutional_buy_day_count, program_volume_snapshot,
                   program_ratio_snapshot, trigger_detail, created_at
            FROM pattern_signal
            WHERE ticker = $1
            ORDER BY reference_time DESC
            LIMIT $2
            "#,
        )
        .bind(ticker)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        into_signals(rows)
    }
}
