//! 패턴 판정 임계값.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 설정 검증 에러.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// 값이 허용 범위를 벗어남
    #[error("설정 값 범위 오류: {field} = {value} ({expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// 패턴 평가기가 사용하는 불변 임계값.
///
/// 평가기 생성 시 한 번 주입되며 실행 중에는 바뀌지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternThresholds {
    /// 기관 트리거 판정 창 (거래일)
    pub eod_window_days: usize,
    /// 창 내 필요한 기관 순매수 양수일 수
    pub min_positive_days: usize,
    /// 최근일 기관 순매수 양수 필수 여부
    pub require_latest_positive: bool,
    /// 프로그램 기준 표본 일수
    pub program_history_days: usize,
    /// 평균 대비 배수
    pub volume_multiplier: f64,
    /// 백분위 (0~1)
    pub percentile: f64,
    /// 유사 사례 조회 기간 (일)
    pub similar_lookback_days: i64,
    /// 유사 사례 최대 건수
    pub similar_limit: usize,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            eod_window_days: 5,
            min_positive_days: 3,
            require_latest_positive: true,
            program_history_days: 30,
            volume_multiplier: 2.5,
            percentile: 0.90,
            similar_lookback_days: 365,
            similar_limit: 5,
        }
    }
}

impl PatternThresholds {
    /// 값 범위 검증.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=5).contains(&self.eod_window_days) {
            return Err(out_of_range("eod_window_days", self.eod_window_days, "1..=5"));
        }
        if self.min_positive_days == 0 || self.min_positive_days > self.eod_window_days {
            return Err(out_of_range(
                "min_positive_days",
                self.min_positive_days,
                "1..=eod_window_days",
            ));
        }
        if self.program_history_days < 2 {
            return Err(out_of_range(
                "program_history_days",
                self.program_history_days,
                ">= 2",
            ));
        }
        if !(self.volume_multiplier.is_finite() && self.volume_multiplier > 0.0) {
            return Err(out_of_range(
                "volume_multiplier",
                self.volume_multiplier,
                "> 0",
            ));
        }
        if !(self.percentile > 0.0 && self.percentile < 1.0) {
            return Err(out_of_range("percentile", self.percentile, "0 < p < 1"));
        }
        if !(1..=3650).contains(&self.similar_lookback_days) {
            return Err(out_of_range(
                "similar_lookback_days",
                self.similar_lookback_days,
                "1..=3650",
            ));
        }
        if self.similar_limit == 0 {
            return Err(out_of_range("similar_limit", self.similar_limit, ">= 1"));
        }
        Ok(())
    }
}

fn out_of_range(
    field: &'static str,
    value: impl std::fmt::Display,
    expected: &'static str,
) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
        expected,
    }
}
