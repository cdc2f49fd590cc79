//! KIS 국내주식 수급 REST 클라이언트.
//!
//! 두 API를 거래일 기준으로 합쳐 `EodFlowRecord`를 만듭니다.
//!
//! ```text
//! inquire-investor (FHKST01010900)           → 개인/외국인/기관 순매수 수량 (최근 약 30거래일)
//! inquire-daily-itemchartprice (FHKST03010100) → 종가, 누적 거래량, 누적 거래대금
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use flow_core::EodFlowRecord;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::auth::KisOAuth;
use super::{msg_cd, tr_id};
use crate::traits::EodFlowProvider;
use crate::ExchangeError;

const INVESTOR_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-investor";
const DAILY_CHART_PATH: &str = "/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice";

/// 일별 시세 조회 범위 (투자자 API 제공 범위보다 넉넉하게).
const CHART_LOOKBACK_DAYS: i64 = 60;

// ==================== 응답 타입 ====================

/// 공통 응답 헤더.
#[derive(Debug, Default, Deserialize)]
struct KisEnvelope {
    #[serde(default)]
    rt_cd: String,
    #[serde(default)]
    msg_cd: String,
    #[serde(default)]
    msg1: String,
}

#[derive(Debug, Deserialize)]
struct InvestorResponse {
    #[serde(default)]
    output: Vec<InvestorRow>,
}

/// 투자자별 매매동향 행. 장중 당일 행은 수량이 빈 문자열로 옵니다.
#[derive(Debug, Deserialize)]
struct InvestorRow {
    #[serde(default)]
    stck_bsop_date: String,
    #[serde(default)]
    prsn_ntby_qty: String,
    #[serde(default)]
    frgn_ntby_qty: String,
    #[serde(default)]
    orgn_ntby_qty: String,
}

#[derive(Debug, Deserialize)]
struct DailyChartResponse {
    #[serde(default)]
    output2: Vec<DailyChartRow>,
}

#[derive(Debug, Deserialize)]
struct DailyChartRow {
    #[serde(default)]
    stck_bsop_date: String,
    #[serde(default)]
    stck_clpr: String,
    #[serde(default)]
    acml_vol: String,
    #[serde(default)]
    acml_tr_pbmn: String,
}

struct DailyQuote {
    close_price: Decimal,
    volume: i64,
    total_value: i64,
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").ok()
}

fn parse_i64(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}

/// 응답 상태와 본문으로 에러 분류. 정상이면 `None`.
fn classify_response(status: StatusCode, body: &str) -> Option<ExchangeError> {
    let envelope: KisEnvelope = serde_json::from_str(body).unwrap_or_default();

    // KIS는 호출 한도 초과를 HTTP 500 + EGW00201로 돌려줍니다.
    if envelope.msg_cd == msg_cd::RATE_LIMITED || status == StatusCode::TOO_MANY_REQUESTS {
        return Some(ExchangeError::RateLimited(envelope.msg1));
    }
    if envelope.msg_cd == msg_cd::TOKEN_EXPIRED {
        return Some(ExchangeError::TokenExpired(envelope.msg1));
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Some(ExchangeError::Unauthorized(format!(
            "[{}] {}",
            envelope.msg_cd, envelope.msg1
        )));
    }
    if status.is_server_error() {
        return Some(ExchangeError::ServerError {
            status: status.as_u16(),
            message: if envelope.msg1.is_empty() { body.chars().take(200).collect() } else { envelope.msg1 },
        });
    }
    if !status.is_success() {
        return Some(ExchangeError::ApiError {
            code: status.as_u16().to_string(),
            message: body.chars().take(200).collect(),
        });
    }
    if envelope.rt_cd != "0" {
        return Some(ExchangeError::ApiError {
            code: envelope.msg_cd,
            message: envelope.msg1,
        });
    }
    None
}

// ==================== 클라이언트 ====================

/// KIS 수급 조회 클라이언트.
pub struct KisFlowClient {
    oauth: Arc<KisOAuth>,
}

impl KisFlowClient {
    /// 공유 OAuth로 클라이언트 생성.
    pub fn new(oauth: Arc<KisOAuth>) -> Self {
        Self { oauth }
    }

    pub fn oauth(&self) -> &Arc<KisOAuth> {
        &self.oauth
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        tr_id: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let token = self.oauth.access_token().await?;
        let config = self.oauth.config();
        let url = format!("{}{}", config.rest_url(), path);

        let response = self
            .oauth
            .http()
            .get(&url)
            .header("content-type", "application/json; charset=utf-8")
            .header("authorization", format!("Bearer {}", token))
            .header("appkey", &config.app_key)
            .header("appsecret", config.app_secret.expose_secret())
            .header("tr_id", tr_id)
            .header("custtype", "P")
            .query(query)
            .send()
            .await
            .map_err(ExchangeError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(ExchangeError::from_reqwest)?;

        if let Some(err) = classify_response(status, &body) {
            if matches!(err, ExchangeError::TokenExpired(_)) {
                self.oauth.invalidate_token().await;
            }
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| {
            ExchangeError::ParseError(format!("{} 응답 파싱 실패: {}", tr_id, e))
        })
    }

    /// 투자자별 매매동향 (최근 약 30거래일).
    async fn fetch_investor_rows(&self, ticker: &str) -> Result<Vec<InvestorRow>, ExchangeError> {
        let response: InvestorResponse = self
            .get(
                INVESTOR_PATH,
                tr_id::INQUIRE_INVESTOR,
                &[
                    ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
                    ("FID_INPUT_ISCD", ticker.to_string()),
                ],
            )
            .await?;
        Ok(response.output)
    }

    /// 일별 시세 (거래일 → 종가/거래량/거래대금).
    async fn fetch_daily_quotes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<NaiveDate, DailyQuote>, ExchangeError> {
        let response: DailyChartResponse = self
            .get(
                DAILY_CHART_PATH,
                tr_id::INQUIRE_DAILY_CHART,
                &[
                    ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
                    ("FID_INPUT_ISCD", ticker.to_string()),
                    ("FID_INPUT_DATE_1", start.format("%Y%m%d").to_string()),
                    ("FID_INPUT_DATE_2", end.format("%Y%m%d").to_string()),
                    ("FID_PERIOD_DIV_CODE", "D".to_string()),
                    ("FID_ORG_ADJ_PRC", "0".to_string()),
                ],
            )
            .await?;

        let mut quotes = HashMap::new();
        for row in response.output2 {
            // 빈 객체 행이 섞여 올 수 있음
            let Some(date) = parse_date(&row.stck_bsop_date) else {
                continue;
            };
            let (Some(close_price), Some(volume)) =
                (parse_decimal(&row.stck_clpr), parse_i64(&row.acml_vol))
            else {
                continue;
            };
            quotes.insert(
                date,
                DailyQuote {
                    close_price,
                    volume,
                    total_value: parse_i64(&row.acml_tr_pbmn).unwrap_or(0),
                },
            );
        }
        Ok(quotes)
    }
}

#[async_trait]
impl EodFlowProvider for KisFlowClient {
    fn name(&self) -> &str {
        "KIS"
    }

    #[instrument(skip(self))]
    async fn fetch_daily(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<EodFlowRecord, ExchangeError> {
        let history = self.fetch_history(ticker, date).await?;
        history
            .into_iter()
            .find(|r| r.trade_date == date)
            .ok_or_else(|| ExchangeError::NoData(format!("{} {} 투자자 수급 없음", ticker, date)))
    }

    #[instrument(skip(self))]
    async fn fetch_history(
        &self,
        ticker: &str,
        end_date: NaiveDate,
    ) -> Result<Vec<EodFlowRecord>, ExchangeError> {
        let investor_rows = self.fetch_investor_rows(ticker).await?;
        let quotes = self
            .fetch_daily_quotes(ticker, end_date - Duration::days(CHART_LOOKBACK_DAYS), end_date)
            .await?;

        let mut records = Vec::with_capacity(investor_rows.len());
        for row in investor_rows {
            let Some(trade_date) = parse_date(&row.stck_bsop_date) else {
                continue;
            };
            if trade_date > end_date {
                continue;
            }

            let (Some(institutional_net), Some(foreign_net), Some(individual_net)) = (
                parse_i64(&row.orgn_ntby_qty),
                parse_i64(&row.frgn_ntby_qty),
                parse_i64(&row.prsn_ntby_qty),
            ) else {
                // 장중 당일 행은 아직 집계되지 않음
                debug!(ticker, %trade_date, "투자자 수량 미집계 행 건너뜀");
                continue;
            };

            let Some(quote) = quotes.get(&trade_date) else {
                warn!(ticker, %trade_date, "일별 시세 없음, 행 건너뜀");
                continue;
            };

            records.push(EodFlowRecord {
                trade_date,
                ticker: ticker.to_string(),
                institutional_net,
                foreign_net,
                individual_net,
                total_value: quote.total_value,
                close_price: quote.close_price,
                volume: quote.volume,
            });
        }

        records.sort_by(|a, b| b.trade_date.cmp(&a.trade_date));
        debug!(ticker, count = records.len(), "KIS 수급 이력 조회");
        Ok(records)
    }
}
