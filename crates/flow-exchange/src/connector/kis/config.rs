//! KIS 접속 설정.

use std::time::Duration;

use secrecy::SecretString;

use crate::ExchangeError;

/// 실전/모의 환경.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KisEnvironment {
    /// 실전투자
    Real,
    /// 모의투자
    Paper,
}

impl KisEnvironment {
    fn rest_url(&self) -> &'static str {
        match self {
            KisEnvironment::Real => "https://openapi.koreainvestment.com:9443",
            KisEnvironment::Paper => "https://openapivts.koreainvestment.com:29443",
        }
    }

    fn websocket_url(&self) -> &'static str {
        match self {
            KisEnvironment::Real => "ws://ops.koreainvestment.com:21000",
            KisEnvironment::Paper => "ws://ops.koreainvestment.com:31000",
        }
    }
}

impl std::str::FromStr for KisEnvironment {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "real" | "prod" | "live" => Ok(KisEnvironment::Real),
            "paper" | "mock" | "vts" => Ok(KisEnvironment::Paper),
            other => Err(ExchangeError::InvalidConfig(format!(
                "알 수 없는 KIS 환경: {} (real|paper)",
                other
            ))),
        }
    }
}

/// KIS 앱 키와 엔드포인트 설정.
#[derive(Clone)]
pub struct KisConfig {
    pub app_key: String,
    pub app_secret: SecretString,
    pub environment: KisEnvironment,
    /// REST 기본 URL 재정의 (테스트/프록시)
    pub base_url_override: Option<String>,
    /// WebSocket URL 재정의
    pub websocket_url_override: Option<String>,
    /// HTTP 요청 타임아웃
    pub request_timeout: Duration,
}

impl std::fmt::Debug for KisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KisConfig")
            .field("app_key", &"***")
            .field("app_secret", &"***")
            .field("environment", &self.environment)
            .field("base_url", &self.rest_url())
            .field("websocket_url", &self.websocket_url())
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl KisConfig {
    pub fn new(app_key: String, app_secret: SecretString, environment: KisEnvironment) -> Self {
        Self {
            app_key,
            app_secret,
            environment,
            base_url_override: None,
            websocket_url_override: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// REST 기본 URL 재정의.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url_override = Some(url.into());
        self
    }

    /// WebSocket URL 재정의.
    pub fn with_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url_override = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn rest_url(&self) -> &str {
        self.base_url_override
            .as_deref()
            .unwrap_or_else(|| self.environment.rest_url())
            .trim_end_matches('/')
    }

    pub fn websocket_url(&self) -> &str {
        self.websocket_url_override
            .as_deref()
            .unwrap_or_else(|| self.environment.websocket_url())
    }
}
