//! 실시간 프로그램 순매수 급증 트리거.

use chrono::{DateTime, Utc};
use flow_core::{PatternThresholds, ProgramDetail, ProgramFlowTick, TriggerStatus, WindowSource};

use crate::stats::{mean, percentile_linear};

/// 현재 세션 합계.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionVolume {
    /// net_volume 합계
    pub net_volume: i64,
    /// 합산한 틱 수
    pub tick_count: usize,
    pub source: WindowSource,
}

/// `[open, end]` 구간 틱의 순매수 수량 합계.
pub fn session_volume(
    ticks: &[ProgramFlowTick],
    open: DateTime<Utc>,
    end: DateTime<Utc>,
    source: WindowSource,
) -> SessionVolume {
    let (net_volume, tick_count) = ticks
        .iter()
        .filter(|t| t.timestamp >= open && t.timestamp <= end)
        .fold((0i64, 0usize), |(sum, n), t| {
            (sum.saturating_add(t.net_volume), n + 1)
        });

    SessionVolume {
        net_volume,
        tick_count,
        source,
    }
}

/// 프로그램 트리거 판정 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramOutcome {
    pub strong: bool,
    pub current_volume: i64,
    /// 현재 / 기준 평균 (평균이 양수이고 표본이 충분할 때만)
    pub ratio: Option<f64>,
    pub detail: ProgramDetail,
}

/// 현재 세션 합계를 과거 표본과 비교해 판정합니다.
///
/// - `eod_days`: 세션 일자 이전 EOD 거래일 수
/// - `samples`: 그 거래일 중 프로그램 데이터가 있는 날의 일별 순매수 합계
///
/// 두 값 모두 `program_history_days` 이상이어야 판정하며, 아니면
/// `InsufficientHistory`로 false입니다. 판정 조건은
/// `current > multiplier × mean` 그리고 `current > P(percentile)`입니다.
pub fn evaluate_program(
    current: SessionVolume,
    eod_days: usize,
    samples: &[i64],
    thresholds: &PatternThresholds,
) -> ProgramOutcome {
    let history_days = eod_days.min(samples.len());
    let mut detail = ProgramDetail {
        status: TriggerStatus::InsufficientHistory,
        source: Some(current.source),
        tick_count: current.tick_count,
        current_volume: current.net_volume,
        history_days,
        average_volume: None,
        threshold_volume: None,
        percentile_volume: None,
        percentile: thresholds.percentile,
        volume_multiplier: thresholds.volume_multiplier,
    };

    let required = thresholds.program_history_days;
    if eod_days < required || samples.len() < required {
        return ProgramOutcome {
            strong: false,
            current_volume: current.net_volume,
            ratio: None,
            detail,
        };
    }

    let values: Vec<f64> = samples.iter().map(|&v| v as f64).collect();
    let (Some(average), Some(percentile_value)) =
        (mean(&values), percentile_linear(&values, thresholds.percentile))
    else {
        return ProgramOutcome {
            strong: false,
            current_volume: current.net_volume,
            ratio: None,
            detail,
        };
    };

    let threshold = average * thresholds.volume_multiplier;
    let current_f = current.net_volume as f64;
    let strong = current_f > threshold && current_f > percentile_value;
    let ratio = (average > 0.0).then(|| current_f / average);

    detail.status = TriggerStatus::Evaluated;
    detail.average_volume = Some(average);
    detail.threshold_volume = Some(threshold);
    detail.percentile_volume = Some(percentile_value);

    ProgramOutcome {
        strong,
        current_volume: current.net_volume,
        ratio,
        detail,
    }
}
