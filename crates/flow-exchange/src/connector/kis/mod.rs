//! 한국투자증권(KIS) Open API 커넥터.
//!
//! - REST: 접근토큰 발급, 투자자별 매매동향, 일별 시세
//! - WebSocket: 실시간 프로그램매매(`H0STPGM0`), 실시간 체결가(`H0STCNT0`)

mod auth;
mod client;
mod config;
mod websocket_program;

pub use auth::KisOAuth;
pub use client::KisFlowClient;
pub use config::{KisConfig, KisEnvironment};
pub use websocket_program::{KisProgramFeed, ProgramFlowAccumulator};

/// KIS 거래 ID.
pub mod tr_id {
    /// 주식현재가 투자자
    pub const INQUIRE_INVESTOR: &str = "FHKST01010900";
    /// 국내주식 기간별 시세 (일/주/월/년)
    pub const INQUIRE_DAILY_CHART: &str = "FHKST03010100";
    /// 실시간 프로그램매매
    pub const WS_KR_PROGRAM: &str = "H0STPGM0";
    /// 실시간 체결가
    pub const WS_KR_TRADE: &str = "H0STCNT0";
}

/// KIS 응답 코드.
pub mod msg_cd {
    /// 초당 거래건수 초과
    pub const RATE_LIMITED: &str = "EGW00201";
    /// 기간이 만료된 token
    pub const TOKEN_EXPIRED: &str = "EGW00123";
}
