//! 수급 패턴 평가기.
//!
//! 한 번의 `evaluate`는 다음 순서로 진행됩니다.
//!
//! 1. 기준 시각을 KST 세션 일자로 변환 (정규장 시작 09:00)
//! 2. (선택) 세션 일자 EOD 재수집
//! 3. 기관 연속 순매수 트리거
//! 4. 프로그램 순매수 급증 트리거
//! 5. 복합 신호 계산 후 신호 1건 저장
//! 6. 복합 신호면 유사 사례 조회와 알림 전송
//!
//! 3~5단계의 저장소 에러는 평가를 중단시키며 아무것도 저장하지 않습니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use flow_core::session::{is_kr_stock_code, session_close, session_date, session_open};
use flow_core::{
    DurableAppend, EodFlowStore, EodRefreshStatus, FastRead, PatternSignal, PatternSignalStore,
    PatternThresholds, StorageError, TriggerDetail, TriggerStatus, WindowSource,
};
use flow_notification::{AlertDispatcher, DispatchResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::institutional::{self, evaluate_institutional, InstitutionalOutcome};
use crate::program::{evaluate_program, session_volume, SessionVolume};
use crate::similar::SimilarCaseSearcher;

/// 평가 직전 EOD 재수집 훅.
///
/// 수집기의 `EodCollector`가 구현하며, 재시도는 구현체 안에서 끝냅니다.
#[async_trait]
pub trait EodRefresher: Send + Sync {
    async fn refresh(&self, ticker: &str, date: NaiveDate) -> EodRefreshStatus;
}

/// 평가 중단 에러.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// 저장소 읽기/쓰기 실패
    #[error("저장소 오류: {0}")]
    Storage(#[from] StorageError),

    /// KRX 종목코드 형식이 아님
    #[error("유효하지 않은 종목코드: {0}")]
    InvalidTicker(String),

    /// 일괄 평가 태스크 실패
    #[error("평가 태스크 실패: {0}")]
    Task(String),
}

/// 평가 1회 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub signal: PatternSignal,
    /// 복합 신호일 때만 채워집니다
    pub similar_cases: Vec<PatternSignal>,
    /// 디스패처가 설정되어 있고 복합 신호일 때만 `Some`
    pub dispatch: Option<DispatchResult>,
}

/// 일괄 평가 통계.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationStats {
    pub total: usize,
    pub evaluated: usize,
    pub errors: usize,
    pub institutional_strong: usize,
    pub program_strong: usize,
    pub composite: usize,
    /// 어느 한쪽이라도 표본 부족이었던 종목 수
    pub insufficient_history: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl EvaluationStats {
    fn record(&mut self, outcome: &EvaluationOutcome) {
        let signal = &outcome.signal;
        self.evaluated += 1;
        if signal.daily_institutional_strong {
            self.institutional_strong += 1;
        }
        if signal.realtime_program_strong {
            self.program_strong += 1;
        }
        if signal.composite_strong() {
            self.composite += 1;
        }
        let detail = &signal.trigger_detail;
        if detail.institutional.status == TriggerStatus::InsufficientHistory
            || detail.program.status == TriggerStatus::InsufficientHistory
        {
            self.insufficient_history += 1;
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        info!(
            operation = operation,
            total = self.total,
            evaluated = self.evaluated,
            errors = self.errors,
            institutional_strong = self.institutional_strong,
            program_strong = self.program_strong,
            composite = self.composite,
            insufficient_history = self.insufficient_history,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "평가 완료"
        );
    }
}

/// 일괄 평가 결과.
#[derive(Debug)]
pub struct BatchEvaluation {
    /// 종목별 결과 (완료 순서)
    pub outcomes: Vec<(String, Result<EvaluationOutcome, EvaluationError>)>,
    pub stats: EvaluationStats,
}

/// 수급 패턴 평가기.
pub struct PatternEvaluator {
    thresholds: PatternThresholds,
    eod: Arc<dyn EodFlowStore>,
    ticks: Arc<dyn DurableAppend>,
    signals: Arc<dyn PatternSignalStore>,
    searcher: SimilarCaseSearcher,
    fast_read: Option<Arc<dyn FastRead>>,
    refresher: Option<Arc<dyn EodRefresher>>,
    dispatcher: Option<Arc<AlertDispatcher>>,
}

impl PatternEvaluator {
    pub fn new(
        thresholds: PatternThresholds,
        eod: Arc<dyn EodFlowStore>,
        ticks: Arc<dyn DurableAppend>,
        signals: Arc<dyn PatternSignalStore>,
    ) -> Self {
        let searcher = SimilarCaseSearcher::new(Arc::clone(&signals), thresholds.similar_limit);
        Self {
            thresholds,
            eod,
            ticks,
            signals,
            searcher,
            fast_read: None,
            refresher: None,
            dispatcher: None,
        }
    }

    /// 수집기 링버퍼 읽기 핸들 연결.
    pub fn with_fast_read(mut self, fast_read: Arc<dyn FastRead>) -> Self {
        self.fast_read = Some(fast_read);
        self
    }

    /// 평가 직전 EOD 재수집 활성화 (on-demand 모드).
    pub fn with_refresher(mut self, refresher: Arc<dyn EodRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<AlertDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn thresholds(&self) -> &PatternThresholds {
        &self.thresholds
    }

    pub fn searcher(&self) -> &SimilarCaseSearcher {
        &self.searcher
    }

    /// 종목 1개 평가. 항상 신호 1건을 저장하거나, 에러로 아무것도 저장하지 않습니다.
    #[instrument(skip_all, fields(ticker = %ticker))]
    pub async fn evaluate(
        &self,
        ticker: &str,
        reference_time: DateTime<Utc>,
    ) -> Result<EvaluationOutcome, EvaluationError> {
        if !is_kr_stock_code(ticker) {
            return Err(EvaluationError::InvalidTicker(ticker.to_string()));
        }

        let date = session_date(reference_time);

        let eod_refresh = match &self.refresher {
            Some(refresher) => refresher.refresh(ticker, date).await,
            None => EodRefreshStatus::Skipped,
        };

        let institutional = self.institutional_trigger(ticker, date, &eod_refresh).await?;
        let current = self.current_session_volume(ticker, date, reference_time).await?;

        let dates = self
            .eod
            .trading_dates_before(ticker, date, self.thresholds.program_history_days)
            .await?;
        let samples: Vec<i64> = self
            .ticks
            .daily_net_volumes(ticker, &dates)
            .await?
            .into_iter()
            .map(|(_, volume)| volume)
            .collect();
        let program = evaluate_program(current, dates.len(), &samples, &self.thresholds);

        let now = Utc::now();
        let signal = PatternSignal {
            id: Uuid::new_v4(),
            reference_time,
            ticker: ticker.to_string(),
            daily_institutional_strong: institutional.strong,
            realtime_program_strong: program.strong,
            institutional_buy_day_count: institutional.buy_day_count,
            program_volume_snapshot: program.current_volume,
            program_ratio_snapshot: program.ratio,
            trigger_detail: TriggerDetail {
                session_date: date,
                eod_refresh,
                institutional: institutional.detail,
                program: program.detail,
            },
            created_at: now,
        };

        self.signals.insert(&signal).await?;

        info!(
            session_date = %date,
            institutional = signal.daily_institutional_strong,
            program = signal.realtime_program_strong,
            composite = signal.composite_strong(),
            buy_days = signal.institutional_buy_day_count,
            program_volume = signal.program_volume_snapshot,
            "패턴 신호 저장"
        );

        if !signal.composite_strong() {
            return Ok(EvaluationOutcome {
                signal,
                similar_cases: Vec::new(),
                dispatch: None,
            });
        }

        let similar_cases = match self
            .searcher
            .find_similar(ticker, reference_time, self.thresholds.similar_lookback_days)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "유사 사례 조회 실패, 빈 목록으로 진행");
                Vec::new()
            }
        };

        let dispatch = match &self.dispatcher {
            Some(dispatcher) => Some(dispatcher.dispatch(&signal, &similar_cases).await),
            None => None,
        };

        Ok(EvaluationOutcome {
            signal,
            similar_cases,
            dispatch,
        })
    }

    async fn institutional_trigger(
        &self,
        ticker: &str,
        date: NaiveDate,
        refresh: &EodRefreshStatus,
    ) -> Result<InstitutionalOutcome, StorageError> {
        if let EodRefreshStatus::Failed { reason } = refresh {
            warn!(ticker, reason = %reason, "EOD 재수집 실패, 기관 트리거 판정 불가");
            return Ok(institutional::unavailable(reason.clone(), &self.thresholds));
        }

        let records = self
            .eod
            .recent_on_or_before(ticker, date, self.thresholds.eod_window_days)
            .await?;
        Ok(evaluate_institutional(&records, &self.thresholds))
    }

    /// 정규장 `[09:00, min(기준 시각, 15:30)]` 구간 순매수 합계.
    ///
    /// 과거 표본(`daily_net_volumes`)과 같은 구간입니다. 링버퍼가 세션 전체를
    /// 담고 있으면 링버퍼를, 아니면 저장소를 읽습니다.
    async fn current_session_volume(
        &self,
        ticker: &str,
        date: NaiveDate,
        reference_time: DateTime<Utc>,
    ) -> Result<SessionVolume, StorageError> {
        let open = session_open(date);
        let end = reference_time.min(session_close(date));

        if let Some(snapshot) = self.fast_read.as_ref().and_then(|r| r.snapshot(ticker)) {
            if snapshot.covers_since(open) {
                return Ok(session_volume(
                    &snapshot.ticks,
                    open,
                    end,
                    WindowSource::RingBuffer,
                ));
            }
            debug!(ticker, capacity = snapshot.capacity, "링버퍼가 세션 시작을 덮지 못함, 저장소 사용");
        }

        if end < open {
            return Ok(session_volume(&[], open, end, WindowSource::Storage));
        }

        let ticks = self.ticks.ticks_between(ticker, open, end).await?;
        Ok(session_volume(&ticks, open, end, WindowSource::Storage))
    }

    /// 여러 종목 동시 평가. 동시 실행 수는 `concurrency`로 제한됩니다.
    pub async fn evaluate_many(
        self: &Arc<Self>,
        tickers: &[String],
        reference_time: DateTime<Utc>,
        concurrency: usize,
    ) -> BatchEvaluation {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for ticker in tickers {
            let evaluator = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let ticker = ticker.clone();

            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => evaluator.evaluate(&ticker, reference_time).await,
                    Err(e) => Err(EvaluationError::Task(e.to_string())),
                };
                (ticker, result)
            });
        }

        let mut stats = EvaluationStats {
            total: tickers.len(),
            ..Default::default()
        };
        let mut outcomes = Vec::with_capacity(tickers.len());

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((ticker, result)) => {
                    match &result {
                        Ok(outcome) => stats.record(outcome),
                        Err(e) => {
                            stats.errors += 1;
                            error!(ticker = %ticker, error = %e, "평가 실패");
                        }
                    }
                    outcomes.push((ticker, result));
                }
                Err(e) => {
                    stats.errors += 1;
                    error!(error = %e, "평가 태스크 비정상 종료");
                }
            }
        }

        stats.elapsed = start.elapsed();
        BatchEvaluation { outcomes, stats }
    }
}
