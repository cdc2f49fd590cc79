//! 제공자 추상화.
//!
//! 수집기는 이 트레이트에만 의존하므로 KIS 외 다른 제공자나
//! 테스트용 스크립트 제공자로 교체할 수 있습니다.

use async_trait::async_trait;
use chrono::NaiveDate;
use flow_core::{EodFlowRecord, ProgramFlowTick};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ExchangeError;

/// 일별 투자자별 수급 제공자.
#[async_trait]
pub trait EodFlowProvider: Send + Sync {
    /// 제공자 이름 (로그용).
    fn name(&self) -> &str;

    /// 특정 거래일 수급 조회.
    ///
    /// 휴장일이거나 해당 일자 행이 없으면 `ExchangeError::NoData`.
    async fn fetch_daily(&self, ticker: &str, date: NaiveDate)
        -> Result<EodFlowRecord, ExchangeError>;

    /// `end_date` 이하 최근 이력 (날짜 내림차순). 제공 범위는 제공자마다 다릅니다.
    async fn fetch_history(
        &self,
        ticker: &str,
        end_date: NaiveDate,
    ) -> Result<Vec<EodFlowRecord>, ExchangeError>;
}

/// 실시간 프로그램 매매 피드.
#[async_trait]
pub trait ProgramTradeFeed: Send + Sync {
    /// 피드 이름 (로그용).
    fn name(&self) -> &str;

    /// 연결 세션 1회 실행.
    ///
    /// 수신한 틱을 `tx`로 보냅니다. `cancel`이 취소되면 읽기를 멈추고 `Ok(())`,
    /// 연결이 끊기거나 연결에 실패하면 `Err`를 반환합니다. 재연결은 호출자 책임입니다.
    async fn run_session(
        &self,
        tickers: &[String],
        tx: mpsc::Sender<ProgramFlowTick>,
        cancel: CancellationToken,
    ) -> Result<(), ExchangeError>;
}
