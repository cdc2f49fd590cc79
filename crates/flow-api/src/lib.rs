//! 수급 패턴 on-demand 평가 및 신호 이력 API.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use routes::create_api_router;
pub use state::AppState;
