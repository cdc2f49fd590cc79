//! 제공자 에러 타입.

use thiserror::Error;

/// 외부 데이터 제공자 호출 에러.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// 네트워크 오류
    #[error("네트워크 오류: {0}")]
    NetworkError(String),

    /// 요청 타임아웃
    #[error("요청 타임아웃: {0}")]
    Timeout(String),

    /// 호출 한도 초과 (KIS EGW00201)
    #[error("호출 한도 초과: {0}")]
    RateLimited(String),

    /// 서버 오류 (5xx)
    #[error("서버 오류 ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// 접근 토큰 만료 (재발급 후 재시도)
    #[error("접근 토큰 만료: {0}")]
    TokenExpired(String),

    /// 인증 실패
    #[error("인증 실패: {0}")]
    Unauthorized(String),

    /// API 업무 오류 (rt_cd != 0)
    #[error("API 오류 [{code}]: {message}")]
    ApiError { code: String, message: String },

    /// 응답 파싱 실패
    #[error("응답 파싱 실패: {0}")]
    ParseError(String),

    /// 해당 일자 데이터 없음 (휴장일 등)
    #[error("데이터 없음: {0}")]
    NoData(String),

    /// 실시간 연결 끊김
    #[error("연결 끊김: {0}")]
    Disconnected(String),

    /// 잘못된 설정
    #[error("설정 오류: {0}")]
    InvalidConfig(String),
}

impl ExchangeError {
    /// 재시도하면 성공할 수 있는 일시적 오류인지 여부.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::NetworkError(_)
                | ExchangeError::Timeout(_)
                | ExchangeError::RateLimited(_)
                | ExchangeError::ServerError { .. }
                | ExchangeError::TokenExpired(_)
                | ExchangeError::Disconnected(_)
        )
    }

    /// 재시도해도 해결되지 않는 오류인지 여부.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExchangeError::Unauthorized(_) | ExchangeError::InvalidConfig(_)
        )
    }

    /// 오류 종류별 권장 대기 시간.
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            // KIS 초당 호출 제한은 1초 단위
            ExchangeError::RateLimited(_) => Some(1000),
            ExchangeError::TokenExpired(_) => Some(100),
            _ => None,
        }
    }

    /// reqwest 에러 분류.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_decode() {
            ExchangeError::ParseError(err.to_string())
        } else {
            ExchangeError::NetworkError(err.to_string())
        }
    }
}
