//! 일별 투자자별 수급 레코드.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 장 마감 후 수집되는 종목별 투자자 순매수 집계.
///
/// (trade_date, ticker)당 최대 한 건이며, 재수집 시 upsert로 덮어씁니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EodFlowRecord {
    /// 거래일
    pub trade_date: NaiveDate,
    /// 종목코드 (예: "005930")
    pub ticker: String,
    /// 기관 순매수 수량 (주)
    pub institutional_net: i64,
    /// 외국인 순매수 수량 (주)
    pub foreign_net: i64,
    /// 개인 순매수 수량 (주)
    pub individual_net: i64,
    /// 거래대금 (원)
    pub total_value: i64,
    /// 종가
    pub close_price: Decimal,
    /// 거래량 (주)
    pub volume: i64,
}

impl EodFlowRecord {
    /// 기관이 순매수한 날인지 여부.
    pub fn is_institutional_buy(&self) -> bool {
        self.institutional_net > 0
    }
}
