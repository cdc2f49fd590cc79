//! PatternEvaluator 통합 테스트 (인메모리 저장소).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use flow_analytics::{EodRefresher, EvaluationError, PatternEvaluator};
use flow_core::session::kst_to_utc;
use flow_core::{
    DurableAppend, EodFlowRecord, EodFlowStore, EodRefreshStatus, PatternSignal,
    PatternSignalStore, PatternThresholds, ProgramFlowTick, TriggerStatus, WindowSource,
};
use flow_data::{
    InMemoryEodFlowStore, InMemoryPatternSignalStore, InMemoryProgramTickStore,
    ProgramWindowCache,
};
use flow_notification::{
    AlertDispatcher, Notification, NotificationError, NotificationResult, NotificationSender,
};
use proptest::prelude::*;
use rust_decimal_macros::dec;

const TICKER: &str = "005930";

fn session_day() -> NaiveDate {
    // 금요일
    NaiveDate::from_ymd_opt(2026, 3, 13).unwrap()
}

/// 15:00 KST
fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 13, 6, 0, 0).unwrap()
}

fn kst(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    kst_to_utc(date, chrono::NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
}

/// `end`를 포함해 과거 방향으로 평일 `count`개 (최신순).
fn weekdays_back(end: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut day = end;
    while dates.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day -= Duration::days(1);
    }
    dates
}

fn eod(date: NaiveDate, institutional_net: i64) -> EodFlowRecord {
    EodFlowRecord {
        trade_date: date,
        ticker: TICKER.to_string(),
        institutional_net,
        foreign_net: -institutional_net / 2,
        individual_net: -institutional_net / 2,
        total_value: 900_000_000_000,
        close_price: dec!(71000),
        volume: 12_000_000,
    }
}

fn tick(at: DateTime<Utc>, net_volume: i64, total: i64) -> ProgramFlowTick {
    ProgramFlowTick::new(at, TICKER, net_volume, net_volume * 71_000, dec!(71000), total)
}

/// 20 × 70k, 6 × 80k, 4 × 280k → 평균 100k, P90 280k
fn baseline_volumes() -> Vec<i64> {
    let mut volumes = vec![70_000; 20];
    volumes.extend(vec![80_000; 6]);
    volumes.extend(vec![280_000; 4]);
    volumes
}

struct Fixture {
    eod: Arc<InMemoryEodFlowStore>,
    ticks: Arc<InMemoryProgramTickStore>,
    signals: Arc<InMemoryPatternSignalStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            eod: Arc::new(InMemoryEodFlowStore::new()),
            ticks: Arc::new(InMemoryProgramTickStore::new()),
            signals: Arc::new(InMemoryPatternSignalStore::new()),
        }
    }

    /// 최근 5일 기관 순매수 (최신순)와 그 이전 `history_days`일 기준 데이터 적재.
    async fn seed_eod(&self, latest_five: &[i64], history_days: usize) {
        let days = weekdays_back(session_day(), 5 + history_days);
        for (i, date) in days.iter().enumerate() {
            let net = latest_five.get(i).copied().unwrap_or(-1_000);
            self.eod.upsert(&eod(*date, net)).await.unwrap();
        }
    }

    /// 세션 이전 거래일마다 기준 프로그램 순매수 1건씩.
    async fn seed_program_history(&self, volumes: &[i64]) {
        let prior_days = weekdays_back(session_day() - Duration::days(1), volumes.len());
        for (date, volume) in prior_days.iter().zip(volumes) {
            self.ticks
                .append(&tick(kst(*date, 10, 0), *volume, volume.abs()))
                .await
                .unwrap();
        }
    }

    /// 현재 세션 틱 두 건으로 `total` 순매수.
    async fn seed_session(&self, total: i64) {
        let first = total / 2;
        self.ticks
            .append(&tick(kst(session_day(), 9, 30), first, first.abs()))
            .await
            .unwrap();
        self.ticks
            .append(&tick(kst(session_day(), 13, 0), total - first, total.abs() + 1))
            .await
            .unwrap();
    }

    async fn standard(current: i64) -> Self {
        let fixture = Self::new();
        fixture.seed_eod(&[100, -50, 30, 10, -5], 30).await;
        fixture.seed_program_history(&baseline_volumes()).await;
        fixture.seed_session(current).await;
        fixture
    }

    fn evaluator(&self) -> PatternEvaluator {
        PatternEvaluator::new(
            PatternThresholds::default(),
            self.eod.clone(),
            self.ticks.clone(),
            self.signals.clone(),
        )
    }
}

struct FixedRefresher(EodRefreshStatus);

#[async_trait]
impl EodRefresher for FixedRefresher {
    async fn refresh(&self, _ticker: &str, _date: NaiveDate) -> EodRefreshStatus {
        self.0.clone()
    }
}

struct BrokenChannel;

#[async_trait]
impl NotificationSender for BrokenChannel {
    async fn send(&self, _notification: &Notification) -> NotificationResult<()> {
        Err(NotificationError::NetworkError("connection reset".to_string()))
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "broken"
    }
}

fn composite_signal_on(date: NaiveDate) -> PatternSignal {
    serde_json::from_value::<PatternSignal>(serde_json::json!({
        "id": uuid::Uuid::new_v4(),
        "reference_time": kst(date, 15, 0),
        "ticker": TICKER,
        "daily_institutional_strong": true,
        "realtime_program_strong": true,
        "composite_strong": true,
        "institutional_buy_day_count": 4,
        "program_volume_snapshot": 500_000,
        "program_ratio_snapshot": 5.0,
        "trigger_detail": {
            "session_date": date,
            "eod_refresh": { "kind": "skipped" },
            "institutional": {
                "status": { "kind": "evaluated" },
                "window_days": 5,
                "available_days": 5,
                "positive_days": 4,
                "latest_positive": true,
                "latest_trade_date": date,
                "min_positive_days": 3
            },
            "program": {
                "status": { "kind": "evaluated" },
                "source": "storage",
                "tick_count": 3,
                "current_volume": 500_000,
                "history_days": 30,
                "average_volume": 100_000.0,
                "threshold_volume": 250_000.0,
                "percentile_volume": 280_000.0,
                "percentile": 0.9,
                "volume_multiplier": 2.5
            }
        },
        "created_at": kst(date, 15, 0),
    }))
    .unwrap()
}

#[tokio::test]
async fn test_composite_signal_persisted_once() {
    let fixture = Fixture::standard(300_000).await;

    let outcome = fixture.evaluator().evaluate(TICKER, reference_time()).await.unwrap();
    let signal = &outcome.signal;

    assert!(signal.daily_institutional_strong);
    assert!(signal.realtime_program_strong);
    assert!(signal.composite_strong());
    assert_eq!(signal.institutional_buy_day_count, 3);
    assert_eq!(signal.program_volume_snapshot, 300_000);
    assert_eq!(signal.program_ratio_snapshot, Some(3.0));
    assert_eq!(signal.session_date(), session_day());
    assert_eq!(signal.trigger_detail.eod_refresh, EodRefreshStatus::Skipped);
    assert_eq!(signal.trigger_detail.program.source, Some(WindowSource::Storage));
    assert_eq!(signal.trigger_detail.program.tick_count, 2);
    assert_eq!(signal.trigger_detail.program.percentile_volume, Some(280_000.0));

    let stored = fixture.signals.all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(&stored[0], signal);
    assert!(outcome.dispatch.is_none());
}

#[tokio::test]
async fn test_below_percentile_is_not_program_strong() {
    let fixture = Fixture::standard(260_000).await;

    let outcome = fixture.evaluator().evaluate(TICKER, reference_time()).await.unwrap();

    assert!(outcome.signal.daily_institutional_strong);
    assert!(!outcome.signal.realtime_program_strong);
    assert!(!outcome.signal.composite_strong());
    assert!(outcome.similar_cases.is_empty());
    assert_eq!(fixture.signals.all().await.len(), 1);
}

#[tokio::test]
async fn test_negative_latest_day_is_not_institutional_strong() {
    let fixture = Fixture::new();
    fixture.seed_eod(&[-5, -50, 30, 10, 100], 30).await;
    fixture.seed_program_history(&baseline_volumes()).await;
    fixture.seed_session(300_000).await;

    let outcome = fixture.evaluator().evaluate(TICKER, reference_time()).await.unwrap();

    assert!(!outcome.signal.daily_institutional_strong);
    assert_eq!(outcome.signal.institutional_buy_day_count, 3);
    assert!(outcome.signal.realtime_program_strong);
    assert!(!outcome.signal.composite_strong());
}

#[tokio::test]
async fn test_fewer_than_five_eod_records_is_false() {
    let fixture = Fixture::new();
    for date in weekdays_back(session_day(), 4) {
        fixture.eod.upsert(&eod(date, 1_000)).await.unwrap();
    }

    let outcome = fixture.evaluator().evaluate(TICKER, reference_time()).await.unwrap();
    let detail = &outcome.signal.trigger_detail;

    assert!(!outcome.signal.daily_institutional_strong);
    assert_eq!(outcome.signal.institutional_buy_day_count, 4);
    assert_eq!(detail.institutional.status, TriggerStatus::InsufficientHistory);
    assert_eq!(detail.program.status, TriggerStatus::InsufficientHistory);
    assert_eq!(fixture.signals.all().await.len(), 1);
}

#[tokio::test]
async fn test_short_eod_history_is_not_program_strong() {
    let fixture = Fixture::new();
    // 세션 포함 25일 → 세션 이전 24일
    fixture.seed_eod(&[100, 100, 100, 100, 100], 20).await;
    fixture.seed_program_history(&baseline_volumes()).await;
    fixture.seed_session(5_000_000).await;

    let outcome = fixture.evaluator().evaluate(TICKER, reference_time()).await.unwrap();

    assert!(outcome.signal.daily_institutional_strong);
    assert!(!outcome.signal.realtime_program_strong);
    assert_eq!(
        outcome.signal.trigger_detail.program.status,
        TriggerStatus::InsufficientHistory
    );
    assert_eq!(outcome.signal.program_ratio_snapshot, None);
}

#[tokio::test]
async fn test_missing_program_days_is_not_program_strong() {
    let fixture = Fixture::new();
    fixture.seed_eod(&[100, 100, 100, 100, 100], 30).await;
    fixture
        .seed_program_history(&baseline_volumes()[..28])
        .await;
    fixture.seed_session(5_000_000).await;

    let outcome = fixture.evaluator().evaluate(TICKER, reference_time()).await.unwrap();

    assert!(!outcome.signal.realtime_program_strong);
    assert_eq!(outcome.signal.trigger_detail.program.history_days, 28);
}

#[tokio::test]
async fn test_eod_refresh_failure_still_evaluates_program() {
    let fixture = Fixture::standard(300_000).await;
    let evaluator = fixture.evaluator().with_refresher(Arc::new(FixedRefresher(
        EodRefreshStatus::Failed {
            reason: "재시도 소진: 네트워크 오류".to_string(),
        },
    )));

    let outcome = evaluator.evaluate(TICKER, reference_time()).await.unwrap();
    let detail = &outcome.signal.trigger_detail;

    assert!(!outcome.signal.daily_institutional_strong);
    assert!(outcome.signal.realtime_program_strong);
    assert!(!outcome.signal.composite_strong());
    assert!(matches!(detail.institutional.status, TriggerStatus::Unavailable { .. }));
    assert!(matches!(detail.eod_refresh, EodRefreshStatus::Failed { .. }));
    assert_eq!(fixture.signals.all().await.len(), 1);
}

#[tokio::test]
async fn test_eod_data_unavailable_uses_stored_records() {
    let fixture = Fixture::standard(300_000).await;
    let evaluator = fixture
        .evaluator()
        .with_refresher(Arc::new(FixedRefresher(EodRefreshStatus::DataUnavailable)));

    let outcome = evaluator.evaluate(TICKER, reference_time()).await.unwrap();

    assert!(outcome.signal.daily_institutional_strong);
    assert!(outcome.signal.composite_strong());
    assert_eq!(
        outcome.signal.trigger_detail.eod_refresh,
        EodRefreshStatus::DataUnavailable
    );
}

#[tokio::test]
async fn test_storage_read_failure_writes_nothing() {
    let fixture = Fixture::standard(300_000).await;
    fixture.eod.set_fail_reads(true);

    let result = fixture.evaluator().evaluate(TICKER, reference_time()).await;

    assert!(matches!(result, Err(EvaluationError::Storage(_))));
    assert!(fixture.signals.all().await.is_empty());
}

#[tokio::test]
async fn test_tick_read_failure_writes_nothing() {
    let fixture = Fixture::standard(300_000).await;
    fixture.ticks.set_fail_reads(true);

    let result = fixture.evaluator().evaluate(TICKER, reference_time()).await;

    assert!(matches!(result, Err(EvaluationError::Storage(_))));
    assert!(fixture.signals.all().await.is_empty());
}

#[tokio::test]
async fn test_off_session_ticks_excluded_from_current_and_baseline() {
    let fixture = Fixture::standard(300_000).await;
    let prior_days = weekdays_back(session_day() - Duration::days(1), 30);
    for date in prior_days.iter().chain([session_day()].iter()) {
        // 장전 08:35, 장후 15:45 체결
        fixture
            .ticks
            .append(&tick(kst(*date, 8, 35), 500_000, 500_000))
            .await
            .unwrap();
        fixture
            .ticks
            .append(&tick(kst(*date, 15, 45), 400_000, 2_000_000))
            .await
            .unwrap();
    }

    // 16:00 KST 평가
    let after_close = kst(session_day(), 16, 0);
    let outcome = fixture.evaluator().evaluate(TICKER, after_close).await.unwrap();
    let program = &outcome.signal.trigger_detail.program;

    assert_eq!(outcome.signal.program_volume_snapshot, 300_000);
    assert_eq!(program.tick_count, 2);
    assert_eq!(program.average_volume, Some(100_000.0));
    assert_eq!(program.percentile_volume, Some(280_000.0));
    assert_eq!(outcome.signal.program_ratio_snapshot, Some(3.0));
    assert!(outcome.signal.realtime_program_strong);
}

#[tokio::test]
async fn test_insert_failure_aborts() {
    let fixture = Fixture::standard(300_000).await;
    fixture.signals.set_fail_inserts(true);

    let result = fixture.evaluator().evaluate(TICKER, reference_time()).await;
    assert!(matches!(result, Err(EvaluationError::Storage(_))));
}

#[tokio::test]
async fn test_invalid_ticker_rejected() {
    let fixture = Fixture::standard(300_000).await;

    let result = fixture.evaluator().evaluate("SAMSUNG", reference_time()).await;

    assert!(matches!(result, Err(EvaluationError::InvalidTicker(_))));
    assert!(fixture.signals.all().await.is_empty());
}

#[tokio::test]
async fn test_similar_cases_exclude_same_session_and_non_composite() {
    let fixture = Fixture::standard(300_000).await;

    let older = NaiveDate::from_ymd_opt(2025, 11, 4).unwrap();
    let newer = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
    let too_old = NaiveDate::from_ymd_opt(2024, 12, 2).unwrap();
    for date in [older, newer, too_old] {
        fixture.signals.insert(&composite_signal_on(date)).await.unwrap();
    }
    let mut same_day = composite_signal_on(session_day());
    same_day.reference_time = kst(session_day(), 10, 0);
    fixture.signals.insert(&same_day).await.unwrap();

    let mut non_composite = composite_signal_on(NaiveDate::from_ymd_opt(2026, 1, 6).unwrap());
    non_composite.realtime_program_strong = false;
    fixture.signals.insert(&non_composite).await.unwrap();

    let outcome = fixture.evaluator().evaluate(TICKER, reference_time()).await.unwrap();

    assert!(outcome.signal.composite_strong());
    let dates: Vec<NaiveDate> = outcome.similar_cases.iter().map(|s| s.session_date()).collect();
    assert_eq!(dates, vec![newer, older]);
    assert!(outcome.similar_cases.iter().all(|s| s.composite_strong()));
}

#[tokio::test]
async fn test_similar_case_limit_applied() {
    let fixture = Fixture::standard(300_000).await;
    for month in 1..=12 {
        let date = NaiveDate::from_ymd_opt(2025, month, 15).unwrap();
        fixture.signals.insert(&composite_signal_on(date)).await.unwrap();
    }

    let outcome = fixture.evaluator().evaluate(TICKER, reference_time()).await.unwrap();

    assert_eq!(outcome.similar_cases.len(), PatternThresholds::default().similar_limit);
    assert_eq!(
        outcome.similar_cases[0].session_date(),
        NaiveDate::from_ymd_opt(2025, 12, 15).unwrap()
    );
}

#[tokio::test]
async fn test_dispatch_failure_keeps_signal() {
    let fixture = Fixture::standard(300_000).await;
    let dispatcher = AlertDispatcher::new(vec![Arc::new(BrokenChannel)], 5);
    let evaluator = fixture.evaluator().with_dispatcher(Arc::new(dispatcher));

    let outcome = evaluator.evaluate(TICKER, reference_time()).await.unwrap();

    let dispatch = outcome.dispatch.expect("composite signal is dispatched");
    assert_eq!(dispatch.errors.len(), 1);
    assert_eq!(dispatch.errors[0].channel, "broken");

    let stored = fixture.signals.all().await;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].composite_strong());
    assert_eq!(stored[0].id, outcome.signal.id);
}

#[tokio::test]
async fn test_ring_buffer_used_when_it_covers_the_session() {
    let fixture = Fixture::new();
    fixture.seed_eod(&[100, -50, 30, 10, -5], 30).await;
    fixture.seed_program_history(&baseline_volumes()).await;
    // 저장소에는 세션 틱이 없고 링버퍼에만 있음
    let mut cache = ProgramWindowCache::new(300);
    cache.track(TICKER);
    cache.push(tick(kst(session_day() - Duration::days(1), 15, 0), 999_999, 1));
    cache.push(tick(kst(session_day(), 9, 1), 200_000, 200_000));
    cache.push(tick(kst(session_day(), 14, 0), 100_000, 300_000));
    cache.push(tick(kst(session_day(), 15, 20), 777_777, 1_000_000));

    let evaluator = fixture.evaluator().with_fast_read(Arc::new(cache.reader()));
    let outcome = evaluator.evaluate(TICKER, reference_time()).await.unwrap();
    let program = &outcome.signal.trigger_detail.program;

    assert_eq!(program.source, Some(WindowSource::RingBuffer));
    assert_eq!(program.tick_count, 2);
    assert_eq!(outcome.signal.program_volume_snapshot, 300_000);
    assert!(outcome.signal.composite_strong());
}

#[tokio::test]
async fn test_full_ring_buffer_falls_back_to_storage() {
    let fixture = Fixture::standard(300_000).await;

    let mut cache = ProgramWindowCache::new(100);
    for i in 0..100 {
        cache.push(tick(kst(session_day(), 14, 0) + Duration::seconds(i), 1, i + 10));
    }

    let evaluator = fixture.evaluator().with_fast_read(Arc::new(cache.reader()));
    let outcome = evaluator.evaluate(TICKER, reference_time()).await.unwrap();

    assert_eq!(
        outcome.signal.trigger_detail.program.source,
        Some(WindowSource::Storage)
    );
    assert_eq!(outcome.signal.program_volume_snapshot, 300_000);
}

#[tokio::test]
async fn test_evaluate_many_counts_outcomes() {
    let fixture = Fixture::standard(300_000).await;
    let evaluator = Arc::new(fixture.evaluator());
    let tickers = vec![TICKER.to_string(), "000660".to_string(), "BAD".to_string()];

    let batch = evaluator.evaluate_many(&tickers, reference_time(), 2).await;

    assert_eq!(batch.outcomes.len(), 3);
    assert_eq!(batch.stats.total, 3);
    assert_eq!(batch.stats.evaluated, 2);
    assert_eq!(batch.stats.errors, 1);
    assert_eq!(batch.stats.composite, 1);
    assert_eq!(batch.stats.insufficient_history, 1);
    assert_eq!(fixture.signals.all().await.len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_persisted_composite_matches_triggers(
        nets in prop::collection::vec(-200i64..200, 5),
        current in 0i64..600_000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let fixture = Fixture::new();
            fixture.seed_eod(&nets, 30).await;
            fixture.seed_program_history(&baseline_volumes()).await;
            fixture.seed_session(current).await;

            fixture.evaluator().evaluate(TICKER, reference_time()).await.unwrap();

            for row in fixture.signals.all().await {
                assert_eq!(
                    row.composite_strong(),
                    row.daily_institutional_strong && row.realtime_program_strong
                );
                let json = serde_json::to_value(&row).unwrap();
                assert_eq!(json["composite_strong"], row.composite_strong());
            }
        });
    }
}
