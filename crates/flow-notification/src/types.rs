//! 알림 공통 타입.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 알림 우선순위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Critical,
}

/// 복합 신호 알림 내용.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeSignalAlert {
    pub ticker: String,
    /// 평가 기준 세션 일자 (Asia/Seoul)
    pub session_date: NaiveDate,
    pub reference_time: DateTime<Utc>,
    /// 창 내 기관 순매수 양수일 수
    pub institutional_buy_days: u8,
    /// 기관 판정 창 크기
    pub window_days: usize,
    /// 현재 세션 프로그램 순매수 수량
    pub program_volume: i64,
    /// 현재 / 기준 평균
    pub program_ratio: Option<f64>,
    pub average_volume: Option<f64>,
    pub percentile_volume: Option<f64>,
    /// 과거 유사 사례 세션 일자 (최신순)
    pub similar_dates: Vec<NaiveDate>,
}

/// 알림 이벤트 종류.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// 기관 + 프로그램 복합 신호 발생
    CompositeSignal(CompositeSignalAlert),
    /// 운영 공지 (수집 중단 등)
    SystemNotice { title: String, message: String },
}

/// 전송 단위 알림.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: NotificationEvent,
    pub priority: NotificationPriority,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// 이벤트 종류에 맞는 기본 우선순위로 알림을 생성합니다.
    pub fn new(event: NotificationEvent) -> Self {
        let priority = match &event {
            NotificationEvent::CompositeSignal(_) => NotificationPriority::High,
            NotificationEvent::SystemNotice { .. } => NotificationPriority::Normal,
        };
        Self {
            event,
            priority,
            timestamp: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// 알림 전송 에러.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// 네트워크 오류
    #[error("네트워크 오류: {0}")]
    NetworkError(String),

    /// 요청 한도 초과 (재시도까지 대기 초)
    #[error("요청 한도 초과: {0}초 후 재시도")]
    RateLimited(u64),

    /// 설정 오류
    #[error("설정 오류: {0}")]
    InvalidConfig(String),

    /// 전송 실패
    #[error("전송 실패: {0}")]
    SendFailed(String),
}

/// 알림 Result 타입 별칭.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// 알림 채널 추상화.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 알림 전송. 비활성 채널은 아무것도 하지 않고 `Ok`를 반환합니다.
    async fn send(&self, notification: &Notification) -> NotificationResult<()>;

    /// 채널 활성 여부.
    fn is_enabled(&self) -> bool;

    /// 채널 이름 (로그와 결과 집계용).
    fn name(&self) -> &str;
}
