//! 수급 패턴 신호.
//!
//! 한 번의 평가 실행은 정확히 하나의 `PatternSignal`을 만듭니다.
//! 복합 신호(`composite_strong`)는 두 트리거의 논리곱으로만 계산되며
//! 별도로 설정할 수 있는 필드가 존재하지 않습니다.
//!
//! 직렬화는 `PatternSignalRecord`를 거칩니다. 출력에는 항상 파생값
//! `composite_strong`이 포함되고, 입력값과 모순되는 레코드는 역직렬화가 거부됩니다.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 복합 신호 계산 (일별 기관 트리거 AND 실시간 프로그램 트리거).
pub fn composite(daily_institutional_strong: bool, realtime_program_strong: bool) -> bool {
    daily_institutional_strong && realtime_program_strong
}

/// 트리거 판정 상태.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerStatus {
    /// 정상 판정
    Evaluated,
    /// 과거 데이터 부족 (false로 기록)
    InsufficientHistory,
    /// 데이터 소스 장애로 판정 불가 (false로 기록)
    Unavailable { reason: String },
}

/// 현재 세션 프로그램 순매수를 계산한 데이터 출처.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSource {
    /// 수집기 메모리 링버퍼 스냅샷
    RingBuffer,
    /// 영구 저장소 (세션 시작 이후 틱)
    Storage,
}

/// 평가 직전 EOD 재수집 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EodRefreshStatus {
    /// 재수집하지 않음 (스케줄 평가)
    Skipped,
    /// 재수집 성공
    Refreshed,
    /// 휴장 등 데이터 없음 (저장된 데이터로 진행)
    DataUnavailable,
    /// 재시도 소진 후 실패
    Failed { reason: String },
}

/// 기관 연속 순매수 트리거 상세.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionalDetail {
    pub status: TriggerStatus,
    /// 판정 창 크기 (거래일)
    pub window_days: usize,
    /// 실제로 읽은 거래일 수
    pub available_days: usize,
    /// 기관 순매수 양수인 날 수
    pub positive_days: usize,
    /// 최근일 기관 순매수 양수 여부
    pub latest_positive: bool,
    /// 최근 거래일
    pub latest_trade_date: Option<NaiveDate>,
    /// 필요한 최소 양수일 수
    pub min_positive_days: usize,
}

/// 프로그램 순매수 급증 트리거 상세.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramDetail {
    pub status: TriggerStatus,
    /// 현재 세션 합계 출처
    pub source: Option<WindowSource>,
    /// 합산한 세션 틱 수
    pub tick_count: usize,
    /// 현재 세션 누적 순매수 수량
    pub current_volume: i64,
    /// 기준 표본 일수
    pub history_days: usize,
    /// 표본 평균
    pub average_volume: Option<f64>,
    /// 평균 × 배수
    pub threshold_volume: Option<f64>,
    /// 표본 백분위 값
    pub percentile_volume: Option<f64>,
    /// 사용한 백분위 (0~1)
    pub percentile: f64,
    /// 사용한 평균 배수
    pub volume_multiplier: f64,
}

/// 어떤 세부 조건이 충족되었는지 설명하는 감사용 페이로드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDetail {
    /// 평가 기준 세션 일자 (Asia/Seoul)
    pub session_date: NaiveDate,
    pub eod_refresh: EodRefreshStatus,
    pub institutional: InstitutionalDetail,
    pub program: ProgramDetail,
}

/// 평가 1회의 결과 신호. 저장 후에는 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PatternSignalRecord", try_from = "PatternSignalRecord")]
pub struct PatternSignal {
    pub id: Uuid,
    pub reference_time: DateTime<Utc>,
    pub ticker: String,
    pub daily_institutional_strong: bool,
    pub realtime_program_strong: bool,
    /// 최근 창 내 기관 순매수 양수일 수 (0~5)
    pub institutional_buy_day_count: u8,
    pub program_volume_snapshot: i64,
    /// 현재 순매수 / 기준 평균 (평균이 양수일 때만)
    pub program_ratio_snapshot: Option<f64>,
    pub trigger_detail: TriggerDetail,
    pub created_at: DateTime<Utc>,
}

impl PatternSignal {
    /// 복합 신호. 두 트리거 필드에서 항상 다시 계산됩니다.
    pub fn composite_strong(&self) -> bool {
        composite(self.daily_institutional_strong, self.realtime_program_strong)
    }

    /// 평가 기준 세션 일자.
    pub fn session_date(&self) -> NaiveDate {
        self.trigger_detail.session_date
    }
}

/// 직렬화/저장 경계용 평면 레코드.
///
/// `composite_strong`은 여기에만 존재하며 `PatternSignal`에서 변환될 때 계산됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSignalRecord {
    pub id: Uuid,
    pub reference_time: DateTime<Utc>,
    pub ticker: String,
    pub daily_institutional_strong: bool,
    pub realtime_program_strong: bool,
    pub composite_strong: bool,
    pub institutional_buy_day_count: u8,
    pub program_volume_snapshot: i64,
    pub program_ratio_snapshot: Option<f64>,
    pub trigger_detail: TriggerDetail,
    pub created_at: DateTime<Utc>,
}

impl From<PatternSignal> for PatternSignalRecord {
    fn from(signal: PatternSignal) -> Self {
        let composite_strong = signal.composite_strong();
        Self {
            id: signal.id,
            reference_time: signal.reference_time,
            ticker: signal.ticker,
            daily_institutional_strong: signal.daily_institutional_strong,
            realtime_program_strong: signal.realtime_program_strong,
            composite_strong,
            institutional_buy_day_count: signal.institutional_buy_day_count,
            program_volume_snapshot: signal.program_volume_snapshot,
            program_ratio_snapshot: signal.program_ratio_snapshot,
            trigger_detail: signal.trigger_detail,
            created_at: signal.created_at,
        }
    }
}

impl TryFrom<PatternSignalRecord> for PatternSignal {
    type Error = String;

    fn try_from(record: PatternSignalRecord) -> Result<Self, Self::Error> {
        let expected = composite(
            record.daily_institutional_strong,
            record.realtime_program_strong,
        );
        if record.composite_strong != expected {
            return Err(format!(
                "composite_strong 불일치 (id={}): 저장값 {}, 계산값 {}",
                record.id, record.composite_strong, expected
            ));
        }
        if record.institutional_buy_day_count > 5 {
            return Err(format!(
                "institutional_buy_day_count 범위 초과 (id={}): {}",
                record.id, record.institutional_buy_day_count
            ));
        }

        Ok(Self {
            id: record.id,
            reference_time: record.reference_time,
            ticker: record.ticker,
            daily_institutional_strong: record.daily_institutional_strong,
            realtime_program_strong: record.realtime_program_strong,
            institutional_buy_day_count: record.institutional_buy_day_count,
            program_volume_snapshot: record.program_volume_snapshot,
            program_ratio_snapshot: record.program_ratio_snapshot,
            trigger_detail: record.trigger_detail,
            created_at: record.created_at,
        })
    }
}
