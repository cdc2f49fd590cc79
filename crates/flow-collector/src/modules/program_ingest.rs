//! 실시간 프로그램 매매 수집 모듈.
//!
//! 피드 세션을 돌리면서 받은 틱을 영구 저장소에 append하고 링버퍼에 넣습니다.
//! 연결이 끊기면 지수 백오프로 재연결하며, 취소 토큰이 취소되면 종료합니다.
//!
//! 링버퍼 쓰기는 이 태스크만 합니다. 평가기는 `reader()`로 얻은 핸들로
//! 복사본만 읽습니다.

use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::NaiveDate;
use flow_core::session::session_date;
use flow_core::{DurableAppend, ProgramFlowTick};
use flow_data::{ProgramWindowCache, ProgramWindowReader};
use flow_exchange::{ProgramTradeFeed, RetryConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::IngestStats;

/// 수집 태스크 설정
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// 재연결 대기 계산
    pub reconnect: RetryConfig,
    /// 데이터 없이 연속 실패 허용 횟수 (0 = 무제한)
    pub max_attempts: u32,
    /// 피드 → 수집 채널 크기
    pub channel_capacity: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            reconnect: RetryConfig::default(),
            max_attempts: 0,
            channel_capacity: 1024,
        }
    }
}

impl From<&IngestConfig> for IngestSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            reconnect: config.reconnect_backoff(),
            max_attempts: config.reconnect_max_attempts,
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

/// 프로그램 매매 수집기.
pub struct ProgramStreamIngester {
    feed: Arc<dyn ProgramTradeFeed>,
    store: Arc<dyn DurableAppend>,
    cache: ProgramWindowCache,
    tickers: Vec<String>,
    settings: IngestSettings,
    /// 종목별 (세션 일자, 마지막 누적 체결량)
    last_totals: HashMap<String, (NaiveDate, i64)>,
    stats: IngestStats,
}

impl ProgramStreamIngester {
    pub fn new(
        feed: Arc<dyn ProgramTradeFeed>,
        store: Arc<dyn DurableAppend>,
        mut cache: ProgramWindowCache,
        tickers: Vec<String>,
        settings: IngestSettings,
    ) -> Self {
        for ticker in &tickers {
            cache.track(ticker);
        }
        Self {
            feed,
            store,
            cache,
            tickers,
            settings,
            last_totals: HashMap::new(),
            stats: IngestStats::default(),
        }
    }

    /// 링버퍼 읽기 핸들 (평가기 주입용)
    pub fn reader(&self) -> ProgramWindowReader {
        self.cache.reader()
    }

    /// 취소될 때까지 수집. 종료 시 통계를 반환합니다.
    pub async fn run(mut self, cancel: CancellationToken) -> IngestStats {
        let start = Instant::now();

        if let Err(e) = self.cache.rebuild(self.store.as_ref(), &self.tickers).await {
            warn!(error = %e, "링버퍼 재구성 실패, 빈 창으로 시작");
        }
        for ticker in &self.tickers {
            if let Some(tick) = self.cache.latest(ticker) {
                self.last_totals.insert(
                    ticker.clone(),
                    (session_date(tick.timestamp), tick.total_volume_to_date),
                );
            }
        }

        info!(
            feed = self.feed.name(),
            tickers = self.tickers.len(),
            "프로그램 매매 수집 시작"
        );

        let feed = Arc::clone(&self.feed);
        let tickers = self.tickers.clone();
        let mut attempts: u32 = 0;

        while !cancel.is_cancelled() {
            self.stats.sessions += 1;
            let received_before = self.stats.ticks_received;

            let (tx, rx) = mpsc::channel(self.settings.channel_capacity);
            let (result, ()) = tokio::join!(
                feed.run_session(&tickers, tx, cancel.clone()),
                self.consume(rx)
            );

            match result {
                Ok(()) if cancel.is_cancelled() => break,
                Ok(()) => warn!("피드 세션이 취소 없이 종료됨, 재연결"),
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "치명적 피드 오류, 수집 중단");
                    self.stats.gave_up = true;
                    break;
                }
                Err(e) => warn!(error = %e, "피드 세션 종료"),
            }
            if cancel.is_cancelled() {
                break;
            }

            if self.stats.ticks_received > received_before {
                attempts = 0;
            }
            attempts += 1;
            if self.settings.max_attempts > 0 && attempts > self.settings.max_attempts {
                error!(attempts = attempts - 1, "재연결 한도 초과, 수집 중단");
                self.stats.gave_up = true;
                break;
            }

            let delay = self.settings.reconnect.backoff_delay(attempts - 1);
            self.stats.reconnects += 1;
            info!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "피드 재연결 대기"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        self.stats.elapsed = start.elapsed();
        self.stats.log_summary("program_ingest");
        self.stats
    }

    async fn consume(&mut self, mut rx: mpsc::Receiver<ProgramFlowTick>) {
        while let Some(tick) = rx.recv().await {
            self.handle_tick(tick).await;
        }
    }

    async fn handle_tick(&mut self, tick: ProgramFlowTick) {
        self.stats.ticks_received += 1;

        let day = session_date(tick.timestamp);
        if let Some(&(last_day, last_total)) = self.last_totals.get(&tick.ticker) {
            if last_day == day && tick.total_volume_to_date < last_total {
                debug!(
                    ticker = %tick.ticker,
                    total = tick.total_volume_to_date,
                    last_total,
                    "누적 체결량 감소 틱 무시"
                );
                self.stats.ticks_dropped += 1;
                return;
            }
        }
        self.last_totals
            .insert(tick.ticker.clone(), (day, tick.total_volume_to_date));

        match self.store.append(&tick).await {
            Ok(()) => self.stats.ticks_stored += 1,
            Err(e) => {
                self.stats.storage_failures += 1;
                warn!(ticker = %tick.ticker, error = %e, "프로그램 틱 저장 실패");
            }
        }
        self.cache.push(tick);
    }
}
