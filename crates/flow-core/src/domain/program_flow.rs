//! 프로그램 매매 틱.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 순매수 부호로부터 파생되는 프로그램 매매 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramSide {
    /// 순매수
    Buy,
    /// 순매도
    Sell,
    /// 변화 없음
    Neutral,
}

impl ProgramSide {
    /// 순매수 수량의 부호로 방향 결정.
    pub fn from_net_volume(net_volume: i64) -> Self {
        match net_volume.signum() {
            1 => ProgramSide::Buy,
            -1 => ProgramSide::Sell,
            _ => ProgramSide::Neutral,
        }
    }

    /// DB 저장용 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramSide::Buy => "BUY",
            ProgramSide::Sell => "SELL",
            ProgramSide::Neutral => "NEUTRAL",
        }
    }
}

impl std::fmt::Display for ProgramSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProgramSide {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(ProgramSide::Buy),
            "SELL" => Ok(ProgramSide::Sell),
            "NEUTRAL" => Ok(ProgramSide::Neutral),
            _ => Err(format!("Invalid program side: {}", s)),
        }
    }
}

/// 실시간 프로그램 매매 체결 한 건.
///
/// `side`는 역직렬화 시에도 `net_volume`에서 다시 계산합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProgramFlowTickRecord")]
pub struct ProgramFlowTick {
    /// 체결 시각
    pub timestamp: DateTime<Utc>,
    /// 종목코드
    pub ticker: String,
    /// 순매수 수량 변화 (주, 부호 있음)
    pub net_volume: i64,
    /// 순매수 금액 변화 (원, 부호 있음)
    pub net_value: i64,
    /// 방향 (net_volume 부호로 파생)
    side: ProgramSide,
    /// 직전 체결가
    pub price: Decimal,
    /// 세션 누적 프로그램 체결량 (세션 내 단조 비감소)
    pub total_volume_to_date: i64,
}

impl ProgramFlowTick {
    /// 새 틱 생성. `side`는 `net_volume`에서 파생됩니다.
    pub fn new(
        timestamp: DateTime<Utc>,
        ticker: impl Into<String>,
        net_volume: i64,
        net_value: i64,
        price: Decimal,
        total_volume_to_date: i64,
    ) -> Self {
        Self {
            timestamp,
            ticker: ticker.into(),
            net_volume,
            net_value,
            side: ProgramSide::from_net_volume(net_volume),
            price,
            total_volume_to_date,
        }
    }

    pub fn side(&self) -> ProgramSide {
        self.side
    }
}

#[derive(Deserialize)]
struct ProgramFlowTickRecord {
    timestamp: DateTime<Utc>,
    ticker: String,
    net_volume: i64,
    net_value: i64,
    price: Decimal,
    total_volume_to_date: i64,
}

impl From<ProgramFlowTickRecord> for ProgramFlowTick {
    fn from(r: ProgramFlowTickRecord) -> Self {
        Self::new(
            r.timestamp,
            r.ticker,
            r.net_volume,
            r.net_value,
            r.price,
            r.total_volume_to_date,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_from_sign() {
        assert_eq!(ProgramSide::from_net_volume(120), ProgramSide::Buy);
        assert_eq!(ProgramSide::from_net_volume(-3), ProgramSide::Sell);
        assert_eq!(ProgramSide::from_net_volume(0), ProgramSide::Neutral);
    }

    #[test]
    fn test_side_roundtrip_str() {
        for side in [ProgramSide::Buy, ProgramSide::Sell, ProgramSide::Neutral] {
            assert_eq!(side.as_str().parse::<ProgramSide>().unwrap(), side);
        }
        assert!("HOLD".parse::<ProgramSide>().is_err());
    }

    #[test]
    fn test_new_derives_side() {
        let tick = ProgramFlowTick::new(Utc::now(), "005930", -500, -35_000_000, dec!(70000), 9000);
        assert_eq!(tick.side(), ProgramSide::Sell);
        assert_eq!(tick.ticker, "005930");
    }

    #[test]
    fn test_deserialize_rederives_side() {
        let tick = ProgramFlowTick::new(Utc::now(), "005930", 300, 21_000_000, dec!(70000), 9000);
        let mut json = serde_json::to_value(&tick).unwrap();
        assert_eq!(json["side"], "buy");

        json["side"] = serde_json::json!("sell");
        let back: ProgramFlowTick = serde_json::from_value(json).unwrap();
        assert_eq!(back.side(), ProgramSide::Buy);
        assert_eq!(back, tick);
    }
}
