//! 일별 기관 연속 순매수 트리거.

use flow_core::{EodFlowRecord, InstitutionalDetail, PatternThresholds, TriggerStatus};

/// 기관 트리거 판정 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct InstitutionalOutcome {
    pub strong: bool,
    /// 창 내 기관 순매수 양수일 수
    pub buy_day_count: u8,
    pub detail: InstitutionalDetail,
}

/// 최근 EOD 레코드로 기관 트리거를 판정합니다.
///
/// `records`는 세션 일자 이하의 최근 레코드입니다. 순서와 무관하게
/// 날짜 내림차순으로 다시 정렬한 뒤 앞에서 `eod_window_days`건만 사용합니다.
/// 창이 다 차지 않으면 `InsufficientHistory`로 false를 반환합니다.
pub fn evaluate_institutional(
    records: &[EodFlowRecord],
    thresholds: &PatternThresholds,
) -> InstitutionalOutcome {
    let mut window: Vec<&EodFlowRecord> = records.iter().collect();
    window.sort_by(|a, b| b.trade_date.cmp(&a.trade_date));
    window.truncate(thresholds.eod_window_days);

    let positive_days = window.iter().filter(|r| r.is_institutional_buy()).count();
    let latest = window.first();
    let latest_positive = latest.is_some_and(|r| r.is_institutional_buy());

    let (status, strong) = if window.len() < thresholds.eod_window_days {
        (TriggerStatus::InsufficientHistory, false)
    } else {
        let latest_ok = !thresholds.require_latest_positive || latest_positive;
        (
            TriggerStatus::Evaluated,
            positive_days >= thresholds.min_positive_days && latest_ok,
        )
    };

    InstitutionalOutcome {
        strong,
        buy_day_count: u8::try_from(positive_days).unwrap_or(u8::MAX),
        detail: InstitutionalDetail {
            status,
            window_days: thresholds.eod_window_days,
            available_days: window.len(),
            positive_days,
            latest_positive,
            latest_trade_date: latest.map(|r| r.trade_date),
            min_positive_days: thresholds.min_positive_days,
        },
    }
}

/// EOD 데이터 소스 장애로 판정할 수 없을 때의 결과 (false).
pub fn unavailable(reason: impl Into<String>, thresholds: &PatternThresholds) -> InstitutionalOutcome {
    InstitutionalOutcome {
        strong: false,
        buy_day_count: 0,
        detail: InstitutionalDetail {
            status: TriggerStatus::Unavailable {
                reason: reason.into(),
            },
            window_days: thresholds.eod_window_days,
            available_days: 0,
            positive_days: 0,
            latest_positive: false,
            latest_trade_date: None,
            min_positive_days: thresholds.min_positive_days,
        },
    }
}
