//! 수급 패턴 API 서버.
//!
//! 종목 즉시 평가와 신호 이력 조회 엔드포인트를 제공합니다.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::StatusCode;
use flow_analytics::PatternEvaluator;
use flow_api::{create_api_router, AppState};
use flow_collector::{modules::EodCollector, CollectorConfig};
use flow_core::{DurableAppend, EodFlowStore, PatternSignalStore};
use flow_data::{Database, DatabaseConfig, PgEodFlowStore, PgPatternSignalStore, PgProgramTickStore};
use flow_exchange::{KisFlowClient, KisOAuth};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 기본 바인딩 주소
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3100";

/// 요청 타임아웃 (EOD 재수집 재시도 포함)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "flow_api=info,flow_analytics=info,flow_data=info,flow_exchange=info,tower_http=info".into()
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// 평가기 구성. 저장소 경로만 사용하며 KIS 설정이 있으면 평가 직전 EOD를 재수집합니다.
fn build_evaluator(
    config: &CollectorConfig,
    eod: Arc<dyn EodFlowStore>,
    ticks: Arc<dyn DurableAppend>,
    signals: Arc<dyn PatternSignalStore>,
) -> anyhow::Result<PatternEvaluator> {
    let mut evaluator =
        PatternEvaluator::new(config.thresholds.clone(), Arc::clone(&eod), ticks, signals);

    match config.kis_config() {
        Ok(kis) => {
            let oauth = Arc::new(KisOAuth::new(kis).context("KIS 클라이언트 생성 실패")?);
            let collector = EodCollector::new(Arc::new(KisFlowClient::new(oauth)), eod)
                .with_retry(config.eod_collect.retry());
            evaluator = evaluator.with_refresher(Arc::new(collector));
            info!("on-demand EOD 재수집 활성화");
        }
        Err(e) => warn!(error = %e, "KIS 설정 없음, 저장된 EOD로만 평가"),
    }

    match config.alert_dispatcher() {
        Some(dispatcher) => {
            info!(channels = dispatcher.channel_count(), "알림 채널 활성화");
            evaluator = evaluator.with_dispatcher(dispatcher);
        }
        None => info!("알림 채널 없음"),
    }

    Ok(evaluator)
}

/// Graceful shutdown 시그널 대기 (Ctrl+C 또는 SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C 핸들러 설치 실패");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM 핸들러 설치 실패");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Ctrl+C 수신, 서버 종료 중..."),
        _ = terminate => warn!("SIGTERM 수신, 서버 종료 중..."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = CollectorConfig::from_env().context("설정 로드 실패")?;
    let addr: SocketAddr = std::env::var("API_BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()
        .context("API_BIND_ADDR 형식 오류")?;

    let db = Database::connect(&DatabaseConfig::for_api(config.database_url.clone()))
        .await
        .context("데이터베이스 연결 실패")?;
    db.migrate().await.context("마이그레이션 실패")?;

    let pool = db.pool().clone();
    let signals: Arc<dyn PatternSignalStore> = Arc::new(PgPatternSignalStore::new(pool.clone()));
    let evaluator = build_evaluator(
        &config,
        Arc::new(PgEodFlowStore::new(pool.clone())),
        Arc::new(PgProgramTickStore::new(pool)),
        Arc::clone(&signals),
    )?;
    let state = Arc::new(AppState::new(Arc::new(evaluator), signals));

    let app = create_api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("{} 바인딩 실패", addr))?;
    info!(%addr, "Flow API 서버 시작");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.pool().close().await;
    info!("Flow API 서버 종료");
    Ok(())
}
