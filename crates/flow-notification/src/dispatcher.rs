//! 복합 신호 알림 디스패처.
//!
//! 채널별 전송 실패는 결과에 기록만 하고 호출자에게 전파하지 않습니다.
//! 저장된 신호는 전송 결과와 무관합니다.

use std::sync::Arc;

use flow_core::PatternSignal;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{CompositeSignalAlert, Notification, NotificationEvent, NotificationSender};

/// 채널 한 곳의 전송 실패.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{channel}] {message}")]
pub struct DispatchError {
    pub channel: String,
    pub message: String,
}

/// 디스패치 결과 요약.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// 전송 성공 채널
    pub delivered: Vec<String>,
    /// 비활성이라 건너뛴 채널
    pub skipped: Vec<String>,
    /// 전송 실패
    pub errors: Vec<DispatchError>,
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// 복합 신호를 알림으로 변환해 모든 활성 채널에 전달합니다.
pub struct AlertDispatcher {
    senders: Vec<Arc<dyn NotificationSender>>,
    similar_limit: usize,
}

impl AlertDispatcher {
    pub fn new(senders: Vec<Arc<dyn NotificationSender>>, similar_limit: usize) -> Self {
        Self {
            senders,
            similar_limit,
        }
    }

    /// 등록된 채널 수.
    pub fn channel_count(&self) -> usize {
        self.senders.len()
    }

    /// 신호와 유사 사례로 알림을 만듭니다.
    pub fn build_notification(&self, signal: &PatternSignal, similar: &[PatternSignal]) -> Notification {
        let detail = &signal.trigger_detail;
        let similar_dates = similar
            .iter()
            .filter(|s| s.composite_strong())
            .take(self.similar_limit)
            .map(|s| s.session_date())
            .collect();

        Notification::new(NotificationEvent::CompositeSignal(CompositeSignalAlert {
            ticker: signal.ticker.clone(),
            session_date: signal.session_date(),
            reference_time: signal.reference_time,
            institutional_buy_days: signal.institutional_buy_day_count,
            window_days: detail.institutional.window_days,
            program_volume: signal.program_volume_snapshot,
            program_ratio: signal.program_ratio_snapshot,
            average_volume: detail.program.average_volume,
            percentile_volume: detail.program.percentile_volume,
            similar_dates,
        }))
    }

    /// 복합 신호 알림 전송. 복합 신호가 아니면 아무 채널에도 보내지 않습니다.
    pub async fn dispatch(&self, signal: &PatternSignal, similar: &[PatternSignal]) -> DispatchResult {
        if !signal.composite_strong() {
            debug!(ticker = %signal.ticker, "복합 신호가 아니므로 알림 생략");
            return DispatchResult::default();
        }

        let notification = self.build_notification(signal, similar);
        self.send_all(&notification).await
    }

    /// 임의 알림을 모든 활성 채널에 전송합니다.
    pub async fn send_all(&self, notification: &Notification) -> DispatchResult {
        let mut result = DispatchResult::default();

        let (active, inactive): (Vec<_>, Vec<_>) =
            self.senders.iter().partition(|s| s.is_enabled());
        result.skipped = inactive.iter().map(|s| s.name().to_string()).collect();

        let outcomes = join_all(active.iter().map(|sender| async move {
            (sender.name().to_string(), sender.send(notification).await)
        }))
        .await;

        for (channel, outcome) in outcomes {
            match outcome {
                Ok(()) => result.delivered.push(channel),
                Err(e) => {
                    warn!(channel = %channel, error = %e, "알림 전송 실패");
                    result.errors.push(DispatchError {
                        channel,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            delivered = result.delivered.len(),
            skipped = result.skipped.len(),
            failed = result.errors.len(),
            "알림 디스패치 완료"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NotificationError, NotificationResult};
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use flow_core::{
        EodRefreshStatus, InstitutionalDetail, ProgramDetail, TriggerDetail, TriggerStatus,
        WindowSource,
    };
    use std::sync::Mutex;
    use uuid::Uuid;

    struct RecordingSender {
        name: &'static str,
        enabled: bool,
        fail: bool,
        sent: Mutex<Vec<Notification>>,
    }

    impl RecordingSender {
        fn new(name: &'static str, enabled: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                enabled,
                fail,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send(&self, notification: &Notification) -> NotificationResult<()> {
            if self.fail {
                return Err(NotificationError::SendFailed("HTTP 502".to_string()));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn signal(day: u32, daily: bool, realtime: bool) -> PatternSignal {
        let session_date = NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
        PatternSignal {
            id: Uuid::new_v4(),
            reference_time: Utc.with_ymd_and_hms(2026, 3, day, 6, 0, 0).unwrap(),
            ticker: "005930".to_string(),
            daily_institutional_strong: daily,
            realtime_program_strong: realtime,
            institutional_buy_day_count: 4,
            program_volume_snapshot: 300_000,
            program_ratio_snapshot: Some(3.0),
            trigger_detail: TriggerDetail {
                session_date,
                eod_refresh: EodRefreshStatus::Skipped,
                institutional: InstitutionalDetail {
                    status: TriggerStatus::Evaluated,
                    window_days: 5,
                    available_days: 5,
                    positive_days: 4,
                    latest_positive: true,
                    latest_trade_date: Some(session_date),
                    min_positive_days: 3,
                },
                program: ProgramDetail {
                    status: TriggerStatus::Evaluated,
                    source: Some(WindowSource::Storage),
                    tick_count: 12,
                    current_volume: 300_000,
                    history_days: 30,
                    average_volume: Some(100_000.0),
                    threshold_volume: Some(250_000.0),
                    percentile_volume: Some(280_000.0),
                    percentile: 0.9,
                    volume_multiplier: 2.5,
                },
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_failure_recorded_not_propagated() {
        let ok = RecordingSender::new("ok", true, false);
        let broken = RecordingSender::new("broken", true, true);
        let off = RecordingSender::new("off", false, false);
        let dispatcher = AlertDispatcher::new(vec![ok.clone(), broken, off.clone()], 5);

        let result = dispatcher.dispatch(&signal(5, true, true), &[]).await;

        assert_eq!(result.delivered, vec!["ok".to_string()]);
        assert_eq!(result.skipped, vec!["off".to_string()]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].channel, "broken");
        assert!(!result.is_success());
        assert_eq!(ok.sent_count(), 1);
        assert_eq!(off.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_non_composite_not_dispatched() {
        let ok = RecordingSender::new("ok", true, false);
        let dispatcher = AlertDispatcher::new(vec![ok.clone()], 5);

        let result = dispatcher.dispatch(&signal(5, true, false), &[]).await;
        assert!(result.delivered.is_empty());
        assert_eq!(ok.sent_count(), 0);
    }

    #[test]
    fn test_similar_dates_limited_and_composite_only() {
        let dispatcher = AlertDispatcher::new(vec![], 2);
        let similar = vec![
            signal(4, true, true),
            signal(3, true, false),
            signal(2, true, true),
            signal(1, true, true),
        ];

        let notification = dispatcher.build_notification(&signal(5, true, true), &similar);
        match notification.event {
            NotificationEvent::CompositeSignal(alert) => {
                assert_eq!(
                    alert.similar_dates,
                    vec![
                        NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
                        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                    ]
                );
                assert_eq!(alert.program_volume, 300_000);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
