//! KIS 실시간 프로그램매매 피드.
//!
//! `H0STPGM0`은 세션 누적값(매도/매수/순매수 체결량과 거래대금)을 보내므로
//! 직전 누적값과의 차이로 체결 단위 순매수를 계산합니다. 가격은 같은 종목의
//! `H0STCNT0` 최근 체결가를 사용합니다.
//!
//! 메시지 형식: `0|H0STPGM0|001|005930^091500^...` (암호화 여부|TR|건수|필드)

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use flow_core::session::{kst_to_utc, session_date};
use flow_core::ProgramFlowTick;
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::auth::KisOAuth;
use super::tr_id;
use crate::traits::ProgramTradeFeed;
use crate::ExchangeError;

/// Ping 간격 (초).
const PING_INTERVAL_SECS: u64 = 30;

/// 구독 등록 간격 (밀리초). 건당 0.2초 이상 권장.
const SUBSCRIBE_INTERVAL_MS: u64 = 200;

/// `H0STPGM0` 최소 필드 수 (순매수 거래대금까지).
const PROGRAM_MIN_FIELDS: usize = 8;

/// `H0STCNT0` 최소 필드 수 (체결가까지).
const TRADE_MIN_FIELDS: usize = 3;

// ==================== 구독 메시지 ====================

#[derive(Debug, Serialize)]
struct WsSubscribeRequest<'a> {
    header: WsHeader<'a>,
    body: WsBody<'a>,
}

#[derive(Debug, Serialize)]
struct WsHeader<'a> {
    approval_key: &'a str,
    custtype: &'static str,
    tr_type: &'static str, // "1": 등록, "2": 해제
    #[serde(rename = "content-type")]
    content_type: &'static str,
}

#[derive(Debug, Serialize)]
struct WsBody<'a> {
    input: WsInput<'a>,
}

#[derive(Debug, Serialize)]
struct WsInput<'a> {
    tr_id: &'a str,
    tr_key: &'a str,
}

fn subscribe_message(approval_key: &str, tr_id: &str, ticker: &str, subscribe: bool) -> String {
    let request = WsSubscribeRequest {
        header: WsHeader {
            approval_key,
            custtype: "P",
            tr_type: if subscribe { "1" } else { "2" },
            content_type: "utf-8",
        },
        body: WsBody {
            input: WsInput {
                tr_id,
                tr_key: ticker,
            },
        },
    };
    serde_json::to_string(&request).unwrap_or_default()
}

/// JSON 제어 메시지 (구독 응답, PINGPONG).
#[derive(Debug, Deserialize)]
struct WsControl {
    header: WsControlHeader,
    #[serde(default)]
    body: Option<WsControlBody>,
}

#[derive(Debug, Deserialize)]
struct WsControlHeader {
    #[serde(default)]
    tr_id: String,
    #[serde(default)]
    tr_key: String,
}

#[derive(Debug, Deserialize)]
struct WsControlBody {
    #[serde(default)]
    rt_cd: String,
    #[serde(default)]
    msg1: String,
}

// ==================== 파싱 ====================

/// `H0STPGM0` 한 건 (세션 누적값).
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramRecord {
    pub ticker: String,
    pub time: NaiveTime,
    /// 누적 매도 체결량
    pub sell_volume: i64,
    /// 누적 매수 체결량
    pub buy_volume: i64,
    /// 누적 순매수 체결량
    pub net_volume: i64,
    /// 누적 순매수 거래대금
    pub net_value: i64,
}

/// 수신 프레임 해석 결과.
#[derive(Debug, Clone, PartialEq)]
enum Frame {
    Program(Vec<ProgramRecord>),
    Trade(Vec<(String, Decimal)>),
    /// 그대로 돌려보내야 하는 PINGPONG
    PingPong,
    Control,
}

fn parse_i64(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// `|` 구분 실시간 프레임을 레코드 단위 필드 목록으로 분리.
///
/// 한 프레임에 여러 건이 올 수 있으며 필드는 `^`로 이어져 있습니다.
fn split_records<'a>(count: &str, data: &'a str) -> Vec<Vec<&'a str>> {
    let fields: Vec<&str> = data.split('^').collect();
    let count = count.trim().parse::<usize>().unwrap_or(1).max(1);
    if fields.len() % count != 0 {
        return vec![fields];
    }
    let per_record = fields.len() / count;
    fields.chunks(per_record).map(|c| c.to_vec()).collect()
}

fn parse_program_fields(fields: &[&str]) -> Option<ProgramRecord> {
    if fields.len() < PROGRAM_MIN_FIELDS {
        warn!(fields = fields.len(), "프로그램매매 필드 부족");
        return None;
    }
    // 0 종목코드, 1 체결시간, 2 매도체결량, 3 매도거래대금, 4 매수체결량,
    // 5 매수거래대금, 6 순매수체결량, 7 순매수거래대금
    Some(ProgramRecord {
        ticker: fields[0].to_string(),
        time: NaiveTime::parse_from_str(fields[1], "%H%M%S").ok()?,
        sell_volume: parse_i64(fields[2])?,
        buy_volume: parse_i64(fields[4])?,
        net_volume: parse_i64(fields[6])?,
        net_value: parse_i64(fields[7])?,
    })
}

fn parse_frame(text: &str) -> Option<Frame> {
    if text.starts_with('{') {
        let control: WsControl = serde_json::from_str(text).ok()?;
        if control.header.tr_id == "PINGPONG" {
            return Some(Frame::PingPong);
        }
        if let Some(body) = control.body {
            if body.rt_cd == "0" {
                debug!(tr_id = %control.header.tr_id, tr_key = %control.header.tr_key, msg = %body.msg1, "구독 응답");
            } else {
                warn!(tr_id = %control.header.tr_id, tr_key = %control.header.tr_key, msg = %body.msg1, "구독 실패 응답");
            }
        }
        return Some(Frame::Control);
    }

    let parts: Vec<&str> = text.splitn(4, '|').collect();
    if parts.len() < 4 {
        return None;
    }
    if parts[0] == "1" {
        warn!(tr_id = parts[1], "암호화 프레임은 지원하지 않음");
        return None;
    }

    let records = split_records(parts[2], parts[3]);
    match parts[1] {
        tr_id::WS_KR_PROGRAM => Some(Frame::Program(
            records.iter().filter_map(|f| parse_program_fields(f)).collect(),
        )),
        tr_id::WS_KR_TRADE => Some(Frame::Trade(
            records
                .iter()
                .filter(|f| f.len() >= TRADE_MIN_FIELDS)
                .filter_map(|f| Some((f[0].to_string(), f[2].trim().parse().ok()?)))
                .collect(),
        )),
        other => {
            debug!(tr_id = other, "처리하지 않는 tr_id");
            None
        }
    }
}

// ==================== 누적값 → 체결 단위 ====================

#[derive(Debug, Clone, Default)]
struct TickerState {
    session: Option<NaiveDate>,
    net_volume: i64,
    net_value: i64,
    total_volume: i64,
    last_price: Option<Decimal>,
}

/// 종목별 누적값을 기억해 체결 단위 순매수로 변환.
///
/// 누적 체결량이 줄어들거나 거래일이 바뀌면 새 세션으로 보고 0부터 다시 계산합니다.
#[derive(Debug, Default)]
pub struct ProgramFlowAccumulator {
    states: HashMap<String, TickerState>,
}

impl ProgramFlowAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 최근 체결가 갱신.
    pub fn on_trade(&mut self, ticker: &str, price: Decimal) {
        self.states.entry(ticker.to_string()).or_default().last_price = Some(price);
    }

    /// 재시작 시 이미 저장된 세션 누적값으로 기준점 설정.
    pub fn seed(
        &mut self,
        ticker: &str,
        session: NaiveDate,
        net_volume: i64,
        net_value: i64,
        total_volume: i64,
    ) {
        let state = self.states.entry(ticker.to_string()).or_default();
        state.session = Some(session);
        state.net_volume = net_volume;
        state.net_value = net_value;
        state.total_volume = total_volume;
    }

    /// 누적 레코드 한 건을 틱으로 변환. 변화가 없으면 `None`.
    pub fn on_program(&mut self, record: &ProgramRecord, session: NaiveDate) -> Option<ProgramFlowTick> {
        let state = self.states.entry(record.ticker.clone()).or_default();
        let total_volume = record.sell_volume + record.buy_volume;

        if state.session != Some(session) || total_volume < state.total_volume {
            state.session = Some(session);
            state.net_volume = 0;
            state.net_value = 0;
            state.total_volume = 0;
        }

        let delta_volume = record.net_volume - state.net_volume;
        let delta_value = record.net_value - state.net_value;
        if delta_volume == 0 && delta_value == 0 && total_volume == state.total_volume {
            return None;
        }

        state.net_volume = record.net_volume;
        state.net_value = record.net_value;
        state.total_volume = total_volume;

        Some(ProgramFlowTick::new(
            kst_to_utc(session, record.time),
            record.ticker.clone(),
            delta_volume,
            delta_value,
            state.last_price.unwrap_or(Decimal::ZERO),
            total_volume,
        ))
    }
}

// ==================== 피드 ====================

/// KIS 실시간 프로그램매매 피드.
pub struct KisProgramFeed {
    oauth: Arc<KisOAuth>,
    accumulator: Mutex<ProgramFlowAccumulator>,
}

impl KisProgramFeed {
    pub fn new(oauth: Arc<KisOAuth>) -> Self {
        Self {
            oauth,
            accumulator: Mutex::new(ProgramFlowAccumulator::new()),
        }
    }

    /// 종목 누적 기준점 설정 (`ProgramFlowAccumulator::seed` 참고).
    pub fn seed(&self, ticker: &str, session: NaiveDate, net_volume: i64, net_value: i64, total_volume: i64) {
        let mut acc = self.accumulator.lock().unwrap_or_else(|e| e.into_inner());
        acc.seed(ticker, session, net_volume, net_value, total_volume);
    }

    /// 프레임 처리. 반환값은 이번 프레임에서 생성된 틱.
    fn apply_frame(&self, frame: Frame) -> Vec<ProgramFlowTick> {
        let mut acc = self.accumulator.lock().unwrap_or_else(|e| e.into_inner());
        match frame {
            Frame::Program(records) => {
                let session = session_date(Utc::now());
                records
                    .iter()
                    .filter_map(|r| acc.on_program(r, session))
                    .collect()
            }
            Frame::Trade(prices) => {
                for (ticker, price) in prices {
                    acc.on_trade(&ticker, price);
                }
                Vec::new()
            }
            Frame::PingPong | Frame::Control => Vec::new(),
        }
    }
}

#[async_trait]
impl ProgramTradeFeed for KisProgramFeed {
    fn name(&self) -> &str {
        "KIS H0STPGM0"
    }

    async fn run_session(
        &self,
        tickers: &[String],
        tx: mpsc::Sender<ProgramFlowTick>,
        cancel: CancellationToken,
    ) -> Result<(), ExchangeError> {
        let approval_key = match self.oauth.websocket_key().await {
            Ok(key) => key,
            Err(e) => {
                // 재연결 때 새 키로 시도
                self.oauth.clear_websocket_key().await;
                return Err(e);
            }
        };
        let ws_url = self.oauth.config().websocket_url().to_string();

        info!(url = %ws_url, tickers = tickers.len(), "KIS 프로그램매매 WebSocket 연결 중");
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("WebSocket 연결 실패: {}", e)))?;
        let (mut write, mut read) = ws_stream.split();

        for (i, ticker) in tickers.iter().enumerate() {
            for (j, tr) in [tr_id::WS_KR_PROGRAM, tr_id::WS_KR_TRADE].iter().enumerate() {
                if i > 0 || j > 0 {
                    tokio::time::sleep(Duration::from_millis(SUBSCRIBE_INTERVAL_MS)).await;
                }
                write
                    .send(Message::Text(subscribe_message(&approval_key, tr, ticker, true)))
                    .await
                    .map_err(|e| ExchangeError::Disconnected(e.to_string()))?;
            }
            debug!(ticker = %ticker, "프로그램매매/체결가 구독 등록");
        }
        info!("KIS 프로그램매매 구독 완료");

        let mut ping_interval = interval(Duration::from_secs(PING_INTERVAL_SECS));

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("종료 요청, 프로그램매매 구독 해제");
                    for ticker in tickers {
                        for tr in [tr_id::WS_KR_PROGRAM, tr_id::WS_KR_TRADE] {
                            let _ = write
                                .send(Message::Text(subscribe_message(&approval_key, tr, ticker, false)))
                                .await;
                        }
                    }
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let Some(frame) = parse_frame(&text) else {
                                continue;
                            };
                            if frame == Frame::PingPong {
                                let _ = write.send(Message::Text(text)).await;
                                continue;
                            }
                            for tick in self.apply_frame(frame) {
                                if tx.send(tick).await.is_err() {
                                    // 수신측이 사라짐
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("서버에서 연결 종료 요청");
                            self.oauth.clear_websocket_key().await;
                            return Err(ExchangeError::Disconnected("서버 종료".to_string()));
                        }
                        Some(Err(e)) => {
                            return Err(ExchangeError::Disconnected(e.to_string()));
                        }
                        None => {
                            return Err(ExchangeError::Disconnected("스트림 종료".to_string()));
                        }
                        _ => {}
                    }
                }

                _ = ping_interval.tick() => {
                    if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                        return Err(ExchangeError::Disconnected(format!("Ping 전송 실패: {}", e)));
                    }
                }
            }
        }
    }
}
