//! Subscription tier and discount lookups.

use crate::rest::{AppState, ErrorResponse};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use storefront_loyalty::{DiscountResult, TierProgress};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DiscountPreviewRequest {
    pub subscription_id: Uuid,
    /// Defaults to the subscription's fulfillable items at current prices.
    pub subtotal: Option<f64>,
}

/// GET /v1/subscriptions/tiers/:user_id
pub async fn handle_tier_progress(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<TierProgress>, (StatusCode, Json<ErrorResponse>)> {
    state
        .subscriptions
        .tier_progress(user_id, Utc::now())
        .map(Json)
        .map_err(|e| ErrorResponse::from_error("tier_lookup_failed", &e))
}

/// POST /v1/subscriptions/discount/preview
pub async fn handle_discount_preview(
    State(state): State<AppState>,
    Json(request): Json<DiscountPreviewRequest>,
) -> Result<Json<DiscountResult>, (StatusCode, Json<ErrorResponse>)> {
    metrics::counter!("loyalty.api.discount_preview").increment(1);
    state
        .subscriptions
        .preview_discount(request.subscription_id, request.subtotal, Utc::now())
        .map(Json)
        .map_err(|e| ErrorResponse::from_error("discount_preview_failed", &e))
}
