//! Telegram 알림 서비스.
//!
//! teloxide Bot API로 HTML 파싱 모드 메시지를 전송합니다.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::RequestError;
use tracing::{debug, error, info, warn};

use crate::types::{
    Notification, NotificationError, NotificationEvent, NotificationPriority, NotificationResult,
    NotificationSender,
};

/// Telegram 전송 설정.
#[derive(Clone)]
pub struct TelegramConfig {
    /// @BotFather 발급 토큰
    pub bot_token: String,
    /// 수신 채팅 ID
    pub chat_id: i64,
    /// 전송 활성화 여부
    pub enabled: bool,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"***")
            .field("chat_id", &self.chat_id)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl TelegramConfig {
    pub fn new(bot_token: String, chat_id: i64) -> Self {
        Self {
            bot_token,
            chat_id,
            enabled: true,
        }
    }

    /// 환경 변수에서 설정을 생성합니다.
    ///
    /// `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`가 모두 있어야 하며
    /// `TELEGRAM_ENABLED=false`면 비활성 상태로 만들어집니다.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .ok()
            .and_then(|s| s.trim().parse().ok())?;
        let enabled = std::env::var("TELEGRAM_ENABLED")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(true);

        Some(Self {
            bot_token,
            chat_id,
            enabled,
        })
    }
}

/// Telegram 알림 전송기.
pub struct TelegramSender {
    config: TelegramConfig,
    bot: Bot,
}

impl TelegramSender {
    pub fn new(config: TelegramConfig) -> Self {
        let bot = Bot::new(config.bot_token.clone());
        Self { config, bot }
    }

    /// 환경 변수에서 전송기를 생성합니다.
    pub fn from_env() -> Option<Self> {
        TelegramConfig::from_env().map(Self::new)
    }

    /// 테스트 메시지를 전송합니다.
    pub async fn send_test(&self) -> NotificationResult<()> {
        self.send_html("✓ <b>Telegram 알림 설정 완료</b>\n수급 패턴 신호를 이 채팅으로 받습니다.".to_string())
            .await
    }

    async fn send_html(&self, text: String) -> NotificationResult<()> {
        debug!(chat_id = self.config.chat_id, "Telegram 메시지 전송");

        match self
            .bot
            .send_message(ChatId(self.config.chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => {
                info!("Telegram 알림 전송 완료");
                Ok(())
            }
            Err(RequestError::RetryAfter(after)) => {
                warn!("Telegram rate limited");
                Err(NotificationError::RateLimited(u64::from(after.seconds())))
            }
            Err(e @ RequestError::Network(_)) => {
                error!(error = %e, "Telegram 네트워크 오류");
                Err(NotificationError::NetworkError(e.to_string()))
            }
            Err(e) => {
                error!(error = %e, "Telegram 전송 실패");
                Err(NotificationError::SendFailed(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        if !self.is_enabled() {
            debug!("Telegram 알림이 비활성화되어 있습니다");
            return Ok(());
        }

        self.send_html(format_html(notification)).await
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty()
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Telegram HTML 특수 문자 이스케이프.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn priority_emoji(priority: NotificationPriority) -> &'static str {
    match priority {
        NotificationPriority::Low => "ℹ️",
        NotificationPriority::Normal => "📢",
        NotificationPriority::High => "🚀",
        NotificationPriority::Critical => "🚨",
    }
}

/// 천 단위 구분 기호를 넣은 정수 표기.
fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// 알림을 Telegram HTML 메시지로 포맷합니다.
pub fn format_html(notification: &Notification) -> String {
    let emoji = priority_emoji(notification.priority);

    match &notification.event {
        NotificationEvent::CompositeSignal(alert) => {
            let mut lines = vec![
                format!("{} <b>수급 복합 신호</b> <code>{}</code>", emoji, escape_html(&alert.ticker)),
                format!("세션: {}", alert.session_date),
                String::new(),
                format!(
                    "🏦 기관 순매수: 최근 {}일 중 <b>{}일</b> 양수",
                    alert.window_days, alert.institutional_buy_days
                ),
                format!(
                    "⚡ 프로그램 순매수: <b>{}</b>주",
                    group_thousands(alert.program_volume)
                ),
            ];

            if let Some(ratio) = alert.program_ratio {
                lines.push(format!("   기준 평균 대비 <b>{:.2}배</b>", ratio));
            }
            if let Some(avg) = alert.average_volume {
                lines.push(format!("   평균 {}주", group_thousands(avg.round() as i64)));
            }
            if let Some(p) = alert.percentile_volume {
                lines.push(format!("   백분위 기준 {}주", group_thousands(p.round() as i64)));
            }

            lines.push(String::new());
            if alert.similar_dates.is_empty() {
                lines.push("📚 과거 유사 사례 없음".to_string());
            } else {
                lines.push(format!("📚 과거 유사 사례 {}건", alert.similar_dates.len()));
                for date in &alert.similar_dates {
                    lines.push(format!("  • {}", date));
                }
            }

            lines.join("\n")
        }
        NotificationEvent::SystemNotice { title, message } => {
            format!(
                "{} <b>{}</b>\n{}",
                emoji,
                escape_html(title),
                escape_html(message)
            )
        }
    }
}
