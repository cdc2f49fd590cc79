//! KRX 운영 시간 기반 스케줄러.
//!
//! 장 마감 후 EOD 수집과 평가를 언제 돌릴지, 어느 거래일을 대상으로 할지 결정합니다.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use flow_core::session::{kst_to_utc, session_close, session_date, KST, SESSION_CLOSE, SESSION_OPEN};
use tracing::{debug, info};

use crate::config::SchedulingConfig;

/// 다음 거래일 탐색 한도 (연휴 최대 길이보다 넉넉하게)
const MAX_DAY_SCAN: i64 = 30;

/// 2025년 KRX 휴장일 (주말 제외)
const KRX_HOLIDAYS_2025: &[(u32, u32)] = &[
    (1, 1),   // 신정
    (1, 27),  // 임시공휴일
    (1, 28),  // 설날 연휴
    (1, 29),  // 설날
    (1, 30),  // 설날 연휴
    (3, 3),   // 삼일절 대체공휴일
    (5, 1),   // 근로자의 날
    (5, 5),   // 어린이날
    (5, 6),   // 대체공휴일
    (6, 3),   // 대통령 선거
    (6, 6),   // 현충일
    (8, 15),  // 광복절
    (10, 3),  // 개천절
    (10, 6),  // 추석
    (10, 7),  // 추석 연휴
    (10, 8),  // 대체공휴일
    (10, 9),  // 한글날
    (12, 25), // 크리스마스
    (12, 31), // 연말 휴장
];

/// 2026년 KRX 휴장일 (주말 제외)
const KRX_HOLIDAYS_2026: &[(u32, u32)] = &[
    (1, 1),   // 신정
    (2, 16),  // 설날 연휴
    (2, 17),  // 설날
    (2, 18),  // 설날 연휴
    (3, 2),   // 삼일절 대체공휴일
    (5, 1),   // 근로자의 날
    (5, 5),   // 어린이날
    (5, 25),  // 부처님오신날 대체공휴일
    (6, 3),   // 지방선거
    (8, 17),  // 광복절 대체공휴일
    (9, 24),  // 추석 연휴
    (9, 25),  // 추석
    (10, 5),  // 개천절 대체공휴일
    (10, 9),  // 한글날
    (12, 25), // 크리스마스
    (12, 31), // 연말 휴장
];

/// 시장 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStatus {
    /// 장 시작 전
    PreOpen,
    /// 장중 (거래 시간)
    Open,
    /// 장 마감 (데이터 수집 가능)
    Closed,
    /// 휴장 (주말 또는 공휴일)
    Holiday,
}

/// KRX 스케줄러
pub struct Scheduler {
    holidays: HashSet<NaiveDate>,
    config: SchedulingConfig,
    /// 마지막 일일 워크플로우 실행 거래일
    last_daily_run: Option<NaiveDate>,
}

impl Scheduler {
    /// 새 스케줄러 생성 (2025/2026 휴장일 포함)
    pub fn new(config: &SchedulingConfig) -> Self {
        let mut scheduler = Self {
            holidays: HashSet::new(),
            config: config.clone(),
            last_daily_run: None,
        };
        scheduler.load_holidays(2025, KRX_HOLIDAYS_2025);
        scheduler.load_holidays(2026, KRX_HOLIDAYS_2026);
        scheduler
    }

    fn load_holidays(&mut self, year: i32, days: &[(u32, u32)]) {
        for &(month, day) in days {
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                self.holidays.insert(date);
            }
        }
    }

    /// 휴장일 추가
    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    /// 주말 여부 확인
    pub fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// 공휴일 여부 확인
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// 거래일 여부 (설정의 주말/공휴일 건너뛰기 반영)
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        if self.config.skip_weekends && Self::is_weekend(date) {
            return false;
        }
        !(self.config.skip_holidays && self.is_holiday(date))
    }

    /// `date` 직전 거래일
    pub fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        (1..=MAX_DAY_SCAN)
            .map(|offset| date - Duration::days(offset))
            .find(|d| self.is_trading_day(*d))
            .unwrap_or(date - Duration::days(1))
    }

    /// 시장 상태 조회
    pub fn get_market_status(&self, now: DateTime<Utc>) -> MarketStatus {
        let local = now.with_timezone(&KST);
        if !self.is_trading_day(local.date_naive()) {
            return MarketStatus::Holiday;
        }

        let time = local.time();
        if time < SESSION_OPEN {
            MarketStatus::PreOpen
        } else if time < SESSION_CLOSE {
            MarketStatus::Open
        } else {
            MarketStatus::Closed
        }
    }

    /// 장 마감 후 워크플로우 실행 시각 (KST)
    fn daily_run_time(&self) -> NaiveTime {
        SESSION_CLOSE + Duration::minutes(i64::from(self.config.delay_after_close_minutes))
    }

    /// 일일 워크플로우 실행 여부 판단
    ///
    /// 조건:
    /// 1. 오늘이 거래일
    /// 2. 마감 후 설정된 시간이 경과
    /// 3. 오늘 아직 실행하지 않음
    pub fn should_run_daily_workflow(&mut self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&KST);
        let today = local.date_naive();

        if !self.is_trading_day(today) || local.time() < self.daily_run_time() {
            return false;
        }

        if self.last_daily_run == Some(today) {
            debug!(%today, "오늘 이미 일일 워크플로우 실행함");
            return false;
        }

        self.last_daily_run = Some(today);
        info!(
            local_time = %local.format("%Y-%m-%d %H:%M:%S"),
            "일일 워크플로우 실행 조건 충족"
        );
        true
    }

    /// 다음 일일 워크플로우 실행 시각 (UTC)
    pub fn next_run_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = session_date(now);
        let run_time = self.daily_run_time();

        (0..=MAX_DAY_SCAN)
            .map(|offset| today + Duration::days(offset))
            .filter(|d| self.is_trading_day(*d) && self.last_daily_run != Some(*d))
            .map(|d| kst_to_utc(d, run_time))
            .find(|t| *t > now)
    }

    /// 다음 실행 시각까지 남은 시간 (초)
    pub fn seconds_until_next_run(&self, now: DateTime<Utc>) -> Option<i64> {
        self.next_run_time(now)
            .map(|t| (t - now).num_seconds().max(0))
    }

    /// 장이 마감된 가장 최근 거래일.
    ///
    /// 오늘이 거래일이고 마감 이후면 오늘, 아니면 직전 거래일입니다.
    pub fn latest_closed_session(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = session_date(now);
        if self.is_trading_day(today) && now >= session_close(today) {
            today
        } else {
            self.previous_trading_day(today)
        }
    }

    /// 스케줄러 상태 요약
    pub fn status_summary(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&KST);
        let mut lines = vec![
            "=== 스케줄러 상태 ===".to_string(),
            format!(
                "KRX: {:?} (현지시간: {})",
                self.get_market_status(now),
                local.format("%Y-%m-%d %H:%M:%S")
            ),
            format!("최근 마감 거래일: {}", self.latest_closed_session(now)),
        ];

        match self.next_run_time(now) {
            Some(next) => lines.push(format!(
                "다음 일일 워크플로우: {}",
                next.with_timezone(&KST).format("%Y-%m-%d %H:%M")
            )),
            None => lines.push("다음 일일 워크플로우: 없음".to_string()),
        }

        lines.join("\n")
    }
}
