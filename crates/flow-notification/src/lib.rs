//! 수급 패턴 신호 알림.
//!
//! - `NotificationSender`: 알림 채널 추상화
//! - `TelegramSender`: teloxide 기반 Telegram 전송기
//! - `AlertDispatcher`: 복합 신호를 모든 활성 채널로 전달

pub mod dispatcher;
pub mod telegram;
pub mod types;

pub use dispatcher::{AlertDispatcher, DispatchError, DispatchResult};
pub use telegram::{TelegramConfig, TelegramSender};
pub use types::{
    CompositeSignalAlert, Notification, NotificationError, NotificationEvent,
    NotificationPriority, NotificationResult, NotificationSender,
};
