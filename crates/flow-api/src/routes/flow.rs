//! 수급 패턴 API 라우트
//!
//! 종목 즉시 평가, 과거 유사 사례, 신호 이력 조회를 제공합니다.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use flow_analytics::EvaluationOutcome;
use flow_core::session::is_kr_stock_code;
use flow_core::PatternSignal;
use flow_notification::DispatchResult;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::{ApiErrorResponse, ApiResult, AppState};

// ==================== Request/Response 타입 ====================

/// 평가 응답
#[derive(Debug, Serialize)]
pub struct EvaluationResponse {
    pub ticker: String,
    pub session_date: NaiveDate,
    pub composite_strong: bool,
    /// 저장된 신호 (composite_strong 포함)
    pub signal: PatternSignal,
    pub similar_cases: Vec<PatternSignal>,
    /// 알림 채널이 설정되어 있고 복합 신호일 때만 존재
    pub dispatch: Option<DispatchResult>,
}

impl From<EvaluationOutcome> for EvaluationResponse {
    fn from(outcome: EvaluationOutcome) -> Self {
        Self {
            ticker: outcome.signal.ticker.clone(),
            session_date: outcome.signal.session_date(),
            composite_strong: outcome.signal.composite_strong(),
            signal: outcome.signal,
            similar_cases: outcome.similar_cases,
            dispatch: outcome.dispatch,
        }
    }
}

/// 유사 사례 조회 파라미터
#[derive(Debug, Deserialize, Validate)]
pub struct SimilarQuery {
    /// 조회 기간 (일, 기본: SIMILAR_LOOKBACK_DAYS)
    #[validate(range(min = 1, max = 3650))]
    pub lookback_days: Option<i64>,

    /// 기준 시각 (기본: 현재)
    pub at: Option<DateTime<Utc>>,
}

/// 유사 사례 응답
#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    pub ticker: String,
    pub lookback_days: i64,
    pub cases: Vec<PatternSignal>,
}

/// 신호 이력 조회 파라미터
#[derive(Debug, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(range(min = 1, max = 500))]
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

/// 신호 이력 응답
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub ticker: String,
    pub signals: Vec<PatternSignal>,
    pub total: usize,
}

fn normalize_ticker(ticker: &str) -> ApiResult<String> {
    let ticker = ticker.trim().to_uppercase();
    if !is_kr_stock_code(&ticker) {
        return Err(ApiErrorResponse::invalid_ticker(&ticker));
    }
    Ok(ticker)
}

// ==================== 핸들러 ====================

/// 종목 즉시 평가 (현재 시각 기준, EOD 재수집 포함)
pub async fn evaluate_ticker(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> ApiResult<Json<EvaluationResponse>> {
    let ticker = normalize_ticker(&ticker)?;
    let outcome = state.evaluator.evaluate(&ticker, Utc::now()).await?;

    info!(
        ticker = %ticker,
        composite = outcome.signal.composite_strong(),
        "on-demand 평가 완료"
    );
    Ok(Json(outcome.into()))
}

/// 과거 복합 신호 조회
pub async fn similar_cases(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<SimilarQuery>,
) -> ApiResult<Json<SimilarResponse>> {
    query.validate()?;
    let ticker = normalize_ticker(&ticker)?;

    let lookback_days = query
        .lookback_days
        .unwrap_or(state.evaluator.thresholds().similar_lookback_days);
    let cases = state
        .evaluator
        .searcher()
        .find_similar(&ticker, query.at.unwrap_or_else(Utc::now), lookback_days)
        .await?;

    Ok(Json(SimilarResponse {
        ticker,
        lookback_days,
        cases,
    }))
}

/// 종목 신호 이력 (최신순)
pub async fn signal_history(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    query.validate()?;
    let ticker = normalize_ticker(&ticker)?;

    let signals = state.signals.recent(&ticker, query.limit).await?;
    Ok(Json(HistoryResponse {
        ticker,
        total: signals.len(),
        signals,
    }))
}

/// 수급 패턴 라우터 생성.
pub fn flow_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{ticker}/evaluate", post(evaluate_ticker))
        .route("/{ticker}/similar", get(similar_cases))
        .route("/{ticker}/signals", get(signal_history))
}

// ==================== 테스트 ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_api_router, ApiError};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use flow_analytics::PatternEvaluator;
    use flow_core::PatternThresholds;
    use flow_data::{InMemoryEodFlowStore, InMemoryPatternSignalStore, InMemoryProgramTickStore};
    use serde_json::Value;
    use tower::ServiceExt;

    struct Fixture {
        eod: Arc<InMemoryEodFlowStore>,
        signals: Arc<InMemoryPatternSignalStore>,
        app: Router,
    }

    fn fixture() -> Fixture {
        let eod = Arc::new(InMemoryEodFlowStore::new());
        let signals = Arc::new(InMemoryPatternSignalStore::new());
        let evaluator = PatternEvaluator::new(
            PatternThresholds::default(),
            eod.clone(),
            Arc::new(InMemoryProgramTickStore::new()),
            signals.clone(),
        );
        let state = Arc::new(AppState::new(Arc::new(evaluator), signals.clone()));

        Fixture {
            eod,
            signals,
            app: create_api_router().with_state(state),
        }
    }

    async fn send(app: &Router, method: &str, uri: &str) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let fixture = fixture();
        let response = send(&fixture.app, "GET", "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_evaluate_invalid_ticker() {
        let fixture = fixture();
        let response = send(&fixture.app, "POST", "/api/v1/flow/5930/evaluate").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ApiError = body_json(response).await;
        assert_eq!(error.code, "INVALID_TICKER");
        assert!(fixture.signals.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_persists_signal_without_history() {
        let fixture = fixture();
        let response = send(&fixture.app, "POST", "/api/v1/flow/005930/evaluate").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = body_json(response).await;
        assert_eq!(body["ticker"], "005930");
        assert_eq!(body["composite_strong"], false);
        assert_eq!(body["signal"]["composite_strong"], false);
        assert_eq!(
            body["signal"]["trigger_detail"]["institutional"]["status"]["kind"],
            "insufficient_history"
        );
        assert!(body["similar_cases"].as_array().unwrap().is_empty());
        assert_eq!(fixture.signals.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_evaluate_storage_failure_is_500() {
        let fixture = fixture();
        fixture.eod.set_fail_reads(true);

        let response = send(&fixture.app, "POST", "/api/v1/flow/005930/evaluate").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ApiError = body_json(response).await;
        assert_eq!(error.code, "EVALUATION_ERROR");
        assert!(fixture.signals.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_similar_lookback_validation() {
        let fixture = fixture();

        let response = send(&fixture.app, "GET", "/api/v1/flow/005930/similar?lookback_days=0").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ApiError = body_json(response).await;
        assert_eq!(error.code, "VALIDATION_ERROR");

        let response =
            send(&fixture.app, "GET", "/api/v1/flow/005930/similar?lookback_days=4000").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&fixture.app, "GET", "/api/v1/flow/005930/similar?lookback_days=30").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = body_json(response).await;
        assert_eq!(body["lookback_days"], 30);
        assert!(body["cases"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signal_history_after_evaluation() {
        let fixture = fixture();
        send(&fixture.app, "POST", "/api/v1/flow/005930/evaluate").await;
        send(&fixture.app, "POST", "/api/v1/flow/005930/evaluate").await;
        send(&fixture.app, "POST", "/api/v1/flow/000660/evaluate").await;

        let response = send(&fixture.app, "GET", "/api/v1/flow/005930/signals?limit=10").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = body_json(response).await;
        assert_eq!(body["total"], 2);

        let response = send(&fixture.app, "GET", "/api/v1/flow/005930/signals?limit=0").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
