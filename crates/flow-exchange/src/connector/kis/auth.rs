//! KIS 접근토큰과 WebSocket 접속키 관리.
//!
//! KIS는 접근토큰 발급을 1분에 1회로 제한하므로 발급한 토큰을 만료 10분 전까지
//! 재사용합니다. REST 클라이언트와 WebSocket 피드가 `Arc<KisOAuth>`를 공유합니다.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::config::KisConfig;
use crate::ExchangeError;

/// 만료 전 갱신 여유.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(600);

/// 토큰 발급 제한 초과 코드 (1분당 1회).
const TOKEN_ISSUE_LIMIT_CODE: &str = "EGW00133";

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    appkey: &'a str,
    appsecret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    86_400
}

#[derive(Debug, Serialize)]
struct ApprovalRequest<'a> {
    grant_type: &'static str,
    appkey: &'a str,
    secretkey: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApprovalResponse {
    approval_key: String,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    error_description: String,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// KIS OAuth 관리자.
pub struct KisOAuth {
    config: KisConfig,
    http: Client,
    token: Mutex<Option<CachedToken>>,
    websocket_key: Mutex<Option<String>>,
}

impl KisOAuth {
    /// HTTP 클라이언트를 만들고 OAuth 관리자 생성.
    pub fn new(config: KisConfig) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ExchangeError::NetworkError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            config,
            http,
            token: Mutex::new(None),
            websocket_key: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &KisConfig {
        &self.config
    }

    /// 공유 HTTP 클라이언트.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// 유효한 접근토큰. 없거나 만료 임박이면 새로 발급합니다.
    pub async fn access_token(&self) -> Result<String, ExchangeError> {
        let mut guard = self.token.lock().await;

        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let url = format!("{}/oauth2/tokenP", self.config.rest_url());
        let request = TokenRequest {
            grant_type: "client_credentials",
            appkey: &self.config.app_key,
            appsecret: self.config.app_secret.expose_secret(),
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(ExchangeError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(ExchangeError::from_reqwest)?;
        if !status.is_success() {
            return Err(classify_oauth_error(status, &body));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ParseError(format!("토큰 응답 파싱 실패: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        info!(expires_in = token.expires_in, "KIS 접근토큰 발급");

        let access_token = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(access_token)
    }

    /// 캐시된 접근토큰 폐기 (만료 응답을 받았을 때).
    pub async fn invalidate_token(&self) {
        *self.token.lock().await = None;
        debug!("KIS 접근토큰 캐시 폐기");
    }

    /// 실시간 WebSocket 접속키.
    pub async fn websocket_key(&self) -> Result<String, ExchangeError> {
        let mut guard = self.websocket_key.lock().await;
        if let Some(key) = guard.as_ref() {
            return Ok(key.clone());
        }

        let url = format!("{}/oauth2/Approval", self.config.rest_url());
        let request = ApprovalRequest {
            grant_type: "client_credentials",
            appkey: &self.config.app_key,
            secretkey: self.config.app_secret.expose_secret(),
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(ExchangeError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(ExchangeError::from_reqwest)?;
        if !status.is_success() {
            return Err(classify_oauth_error(status, &body));
        }

        let approval: ApprovalResponse = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ParseError(format!("접속키 응답 파싱 실패: {}", e)))?;

        info!("KIS WebSocket 접속키 발급");
        *guard = Some(approval.approval_key.clone());
        Ok(approval.approval_key)
    }

    /// 접속키 폐기 (재연결 시 재발급).
    pub async fn clear_websocket_key(&self) {
        *self.websocket_key.lock().await = None;
    }
}

fn classify_oauth_error(status: StatusCode, body: &str) -> ExchangeError {
    let parsed: Option<OAuthErrorResponse> = serde_json::from_str(body).ok();
    let (code, description) = parsed
        .map(|e| (e.error_code, e.error_description))
        .unwrap_or_else(|| (String::new(), body.to_string()));

    if code == TOKEN_ISSUE_LIMIT_CODE || status == StatusCode::TOO_MANY_REQUESTS {
        return ExchangeError::RateLimited(format!("토큰 발급 제한: {}", description));
    }
    if status.is_server_error() {
        return ExchangeError::ServerError {
            status: status.as_u16(),
            message: description,
        };
    }
    ExchangeError::Unauthorized(format!("[{}] {} {}", status.as_u16(), code, description))
}
