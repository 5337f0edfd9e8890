//! Shared state, error mapping and operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use storefront_core::StorefrontError;
use storefront_promotions::FlashSaleScheduler;
use storefront_subscriptions::{ReminderJob, SubscriptionProcessor};

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub subscriptions: Arc<SubscriptionProcessor>,
    pub reminders: Arc<ReminderJob>,
    pub flash_sales: Arc<FlashSaleScheduler>,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    /// Status and body for a job or lookup failure. Unknown ids are 404,
    /// bad input is 400, a job already running is 409, everything else is 500.
    pub fn from_error(code: &str, err: &StorefrontError) -> (StatusCode, Json<ErrorResponse>) {
        let status = match err {
            StorefrontError::NotFound(_) => StatusCode::NOT_FOUND,
            StorefrontError::Validation(_) => StatusCode::BAD_REQUEST,
            StorefrontError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        metrics::counter!("api.errors", "code" => code.to_string()).increment(1);
        (
            status,
            Json(ErrorResponse {
                error: code.to_string(),
                message: err.to_string(),
            }),
        )
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (StorefrontError::not_found("subscription x"), StatusCode::NOT_FOUND),
            (StorefrontError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (StorefrontError::Conflict("busy".into()), StatusCode::CONFLICT),
            (StorefrontError::store("down"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let (status, body) = ErrorResponse::from_error("job_failed", &err);
            assert_eq!(status, expected);
            assert_eq!(body.error, "job_failed");
        }
    }
}
