//! 환경변수 기반 설정 모듈.

use std::{sync::Arc, time::Duration};

use flow_core::session::is_kr_stock_code;
use flow_core::PatternThresholds;
use flow_data::DEFAULT_RING_CAPACITY;
use flow_exchange::{KisConfig, KisEnvironment, RetryConfig};
use flow_notification::{AlertDispatcher, NotificationSender, TelegramConfig, TelegramSender};
use secrecy::SecretString;

use crate::error::CollectorError;
use crate::Result;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL
    pub database_url: String,
    /// KIS 접속 설정 (앱 키가 없으면 `None`)
    pub kis: Option<KisSettings>,
    /// 추적 종목 목록
    pub tickers: Vec<String>,
    /// EOD 수집 설정
    pub eod_collect: EodCollectConfig,
    /// 프로그램 매매 수집 설정
    pub ingest: IngestConfig,
    /// 평가 실행 설정
    pub evaluation: EvaluationConfig,
    /// 패턴 판정 임계값
    pub thresholds: PatternThresholds,
    /// 스케줄링 설정
    pub scheduling: SchedulingConfig,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
    /// Telegram 알림 (토큰이 없으면 `None`)
    pub telegram: Option<TelegramConfig>,
}

/// KIS Open API 설정
#[derive(Debug, Clone)]
pub struct KisSettings {
    pub app_key: String,
    pub app_secret: SecretString,
    pub environment: KisEnvironment,
    /// REST URL 재정의
    pub base_url: Option<String>,
    /// WebSocket URL 재정의
    pub websocket_url: Option<String>,
}

/// EOD 수집 설정
#[derive(Debug, Clone)]
pub struct EodCollectConfig {
    /// 종목 간 요청 딜레이 (밀리초)
    pub request_delay_ms: u64,
    /// 요청당 최대 재시도 횟수
    pub max_retries: u32,
    /// HTTP 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

/// 프로그램 매매 수집 설정
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// 종목당 링버퍼 용량
    pub ring_capacity: usize,
    /// 연속 재연결 한도 (0 = 무제한)
    pub reconnect_max_attempts: u32,
    /// 피드 → 수집 태스크 채널 크기
    pub channel_capacity: usize,
}

/// 평가 실행 설정
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// 동시 평가 종목 수
    pub concurrency: usize,
    /// 장중 평가 주기 (분, 0이면 비활성)
    pub intraday_interval_minutes: u64,
}

/// 스케줄링 설정 (KRX 운영 시간 기반)
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// 장 마감 후 대기 시간 (분)
    /// 기본: 30분 (15:30 마감 + 30분 = 16:00부터 수집)
    pub delay_after_close_minutes: u32,
    /// 주말 건너뛰기
    pub skip_weekends: bool,
    /// 공휴일 건너뛰기
    pub skip_holidays: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            delay_after_close_minutes: 30,
            skip_weekends: true,
            skip_holidays: true,
        }
    }
}

/// 데몬 모드 설정
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 일일 워크플로우 조건 확인 주기 (초)
    pub check_interval_secs: u64,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").map_err(|_| {
            CollectorError::Config("DATABASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })?;

        let kis = match (std::env::var("KIS_APP_KEY"), std::env::var("KIS_APP_SECRET")) {
            (Ok(app_key), Ok(app_secret)) => Some(KisSettings {
                app_key,
                app_secret: SecretString::from(app_secret),
                environment: std::env::var("KIS_ENVIRONMENT")
                    .unwrap_or_else(|_| "real".to_string())
                    .parse()
                    .map_err(|e: flow_exchange::ExchangeError| {
                        CollectorError::Config(e.to_string())
                    })?,
                base_url: std::env::var("KIS_BASE_URL").ok(),
                websocket_url: std::env::var("KIS_WS_URL").ok(),
            }),
            _ => None,
        };

        let tickers = env_var_list("FLOW_TICKERS");
        if let Some(invalid) = tickers.iter().find(|t| !is_kr_stock_code(t)) {
            return Err(CollectorError::Config(format!(
                "FLOW_TICKERS에 유효하지 않은 종목코드: {}",
                invalid
            )));
        }

        let defaults = PatternThresholds::default();
        let thresholds = PatternThresholds {
            eod_window_days: env_var_parse("PATTERN_EOD_WINDOW_DAYS", defaults.eod_window_days),
            min_positive_days: env_var_parse(
                "PATTERN_MIN_POSITIVE_DAYS",
                defaults.min_positive_days,
            ),
            require_latest_positive: env_var_bool(
                "PATTERN_REQUIRE_LATEST_POSITIVE",
                defaults.require_latest_positive,
            ),
            program_history_days: env_var_parse(
                "PATTERN_PROGRAM_HISTORY_DAYS",
                defaults.program_history_days,
            ),
            volume_multiplier: env_var_parse(
                "PATTERN_VOLUME_MULTIPLIER",
                defaults.volume_multiplier,
            ),
            percentile: env_var_parse("PATTERN_PERCENTILE", defaults.percentile),
            similar_lookback_days: env_var_parse(
                "SIMILAR_LOOKBACK_DAYS",
                defaults.similar_lookback_days,
            ),
            similar_limit: env_var_parse("SIMILAR_LIMIT", defaults.similar_limit),
        };
        thresholds
            .validate()
            .map_err(|e| CollectorError::Config(e.to_string()))?;

        Ok(Self {
            database_url,
            kis,
            tickers,
            eod_collect: EodCollectConfig {
                request_delay_ms: env_var_parse("EOD_REQUEST_DELAY_MS", 200),
                max_retries: env_var_parse("EOD_MAX_RETRIES", 3),
                request_timeout_secs: env_var_parse("EOD_REQUEST_TIMEOUT_SECS", 10),
            },
            ingest: IngestConfig {
                ring_capacity: env_var_parse("PROGRAM_RING_CAPACITY", DEFAULT_RING_CAPACITY),
                reconnect_max_attempts: env_var_parse("PROGRAM_RECONNECT_MAX_ATTEMPTS", 0),
                channel_capacity: env_var_parse("PROGRAM_CHANNEL_CAPACITY", 1024),
            },
            evaluation: EvaluationConfig {
                concurrency: env_var_parse("EVAL_CONCURRENCY", 4),
                intraday_interval_minutes: env_var_parse("EVAL_INTRADAY_INTERVAL_MINUTES", 0),
            },
            thresholds,
            scheduling: SchedulingConfig {
                delay_after_close_minutes: env_var_parse("SCHEDULING_DELAY_MINUTES", 30),
                skip_weekends: env_var_bool("SCHEDULING_SKIP_WEEKENDS", true),
                skip_holidays: env_var_bool("SCHEDULING_SKIP_HOLIDAYS", true),
            },
            daemon: DaemonConfig {
                check_interval_secs: env_var_parse("DAEMON_CHECK_INTERVAL_SECS", 60),
            },
            telegram: TelegramConfig::from_env(),
        })
    }

    /// KIS 클라이언트 설정 생성. 앱 키가 없으면 설정 에러.
    pub fn kis_config(&self) -> Result<KisConfig> {
        let kis = self.kis.as_ref().ok_or_else(|| {
            CollectorError::Config(
                "KIS_APP_KEY / KIS_APP_SECRET 환경변수가 설정되지 않았습니다".to_string(),
            )
        })?;

        let mut config = KisConfig::new(
            kis.app_key.clone(),
            kis.app_secret.clone(),
            kis.environment,
        )
        .with_timeout(self.eod_collect.request_timeout());
        if let Some(url) = &kis.base_url {
            config = config.with_base_url(url.clone());
        }
        if let Some(url) = &kis.websocket_url {
            config = config.with_websocket_url(url.clone());
        }
        Ok(config)
    }

    /// 활성화된 알림 채널로 디스패처 구성. 채널이 없으면 `None`.
    pub fn alert_dispatcher(&self) -> Option<Arc<AlertDispatcher>> {
        let mut senders: Vec<Arc<dyn NotificationSender>> = Vec::new();
        if let Some(telegram) = &self.telegram {
            let sender = TelegramSender::new(telegram.clone());
            if sender.is_enabled() {
                senders.push(Arc::new(sender));
            }
        }

        if senders.is_empty() {
            return None;
        }
        Some(Arc::new(AlertDispatcher::new(
            senders,
            self.thresholds.similar_limit,
        )))
    }

    /// 명령행 종목 목록이 있으면 그것을, 없으면 `FLOW_TICKERS`를 사용.
    pub fn resolve_tickers(&self, cli_tickers: Option<&str>) -> Result<Vec<String>> {
        let tickers = match cli_tickers {
            Some(list) => parse_list(list),
            None => self.tickers.clone(),
        };
        if tickers.is_empty() {
            return Err(CollectorError::Config(
                "대상 종목이 없습니다 (--tickers 또는 FLOW_TICKERS)".to_string(),
            ));
        }
        if let Some(invalid) = tickers.iter().find(|t| !is_kr_stock_code(t)) {
            return Err(CollectorError::Config(format!(
                "유효하지 않은 종목코드: {}",
                invalid
            )));
        }
        Ok(tickers)
    }
}

impl EodCollectConfig {
    /// 종목 간 요청 딜레이를 Duration으로 반환
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 요청 재시도 설정
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_max_retries(self.max_retries)
    }
}

impl IngestConfig {
    /// 재연결 백오프 (1초 시작, 2배, 최대 60초)
    pub fn reconnect_backoff(&self) -> RetryConfig {
        RetryConfig::with_max_retries(self.reconnect_max_attempts)
    }
}

impl EvaluationConfig {
    /// 장중 평가 주기. 0분이면 `None`.
    pub fn intraday_interval(&self) -> Option<Duration> {
        (self.intraday_interval_minutes > 0)
            .then(|| Duration::from_secs(self.intraday_interval_minutes * 60))
    }
}

impl DaemonConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

/// 환경변수에서 쉼표로 구분된 리스트 파싱
fn env_var_list(key: &str) -> Vec<String> {
    std::env::var(key).map(|v| parse_list(&v)).unwrap_or_default()
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}
