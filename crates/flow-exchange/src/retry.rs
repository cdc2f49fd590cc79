//! 제공자 호출 재시도 유틸리티.
//!
//! 네트워크 오류, 호출 한도 초과, 5xx 등 일시적인 오류에 대해
//! 지수 백오프(±25% 지터)로 재시도합니다. EOD 수집기와 실시간 수집기의
//! 재연결 대기 계산이 같은 설정을 공유합니다.
//!
//! # 예시
//!
//! ```rust,ignore
//! use flow_exchange::retry::{RetryConfig, with_retry};
//!
//! let config = RetryConfig::default();
//! let record = with_retry(&config, || async {
//!     provider.fetch_daily("005930", date).await
//! }).await?;
//! ```

use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::{debug, warn};

use crate::ExchangeError;

/// 재시도 설정.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// 최대 재시도 횟수 (초기 시도 제외).
    pub max_retries: u32,
    /// 기본 대기 시간.
    pub base_delay: Duration,
    /// 최대 대기 시간.
    pub max_delay: Duration,
    /// 백오프 배수.
    pub backoff_multiplier: f64,
    /// ±25% 지터 추가 여부.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// 최대 재시도 횟수만 바꾼 기본 설정.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// 재시도 없음 (단일 시도).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// `attempt`번째(0부터) 재시도 전 대기 시간.
    ///
    /// `base × multiplier^attempt`를 `max_delay`로 자른 뒤 지터를 더합니다.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.delay_from(self.base_delay, attempt)
    }

    fn calculate_delay(&self, attempt: u32, error: &ExchangeError) -> Duration {
        // 에러에 권장 대기 시간이 있으면 기준값으로 사용
        let base = error
            .retry_delay_ms()
            .map(Duration::from_millis)
            .unwrap_or(self.base_delay);
        self.delay_from(base, attempt)
    }

    fn delay_from(&self, base: Duration, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt.min(32) as i32);
        let secs = (base.as_secs_f64() * multiplier).min(self.max_delay.as_secs_f64());
        let delay = Duration::from_secs_f64(secs.max(0.0));

        if self.add_jitter {
            let jitter_range = delay.as_millis() as f64 * 0.25;
            let jitter = rand::thread_rng().gen_range(-1.0..=1.0) * jitter_range;
            Duration::from_millis((delay.as_millis() as f64 + jitter).max(0.0) as u64)
        } else {
            delay
        }
    }
}

/// 재시도가 포함된 비동기 작업 실행.
///
/// 치명적 에러와 재시도 불가 에러(예: `NoData`)는 즉시 반환합니다.
/// 재시도를 모두 소진하면 마지막 에러를 반환합니다.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, ExchangeError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 0;
    let mut total_delay = Duration::ZERO;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        attempts = attempt + 1,
                        total_delay_ms = total_delay.as_millis(),
                        "재시도 후 성공"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if e.is_fatal() {
                    warn!(error = %e, "치명적 에러 발생, 재시도 없이 실패 반환");
                    return Err(e);
                }

                if !e.is_retryable() {
                    debug!(error = %e, "재시도 불가능한 에러, 즉시 반환");
                    return Err(e);
                }

                if attempt >= config.max_retries {
                    warn!(
                        error = %e,
                        attempts = attempt + 1,
                        max_retries = config.max_retries,
                        "최대 재시도 횟수 초과"
                    );
                    return Err(e);
                }

                let delay = config.calculate_delay(attempt, &e);
                total_delay += delay;

                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis(),
                    "재시도 대기 중"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
