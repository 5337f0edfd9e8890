//! Job trigger endpoints called by the periodic job runner.
//!
//! Completed runs answer 200 with the summary even when some items failed.
//! A run already in progress answers 409; only a failure of the batch setup
//! answers 500.

use crate::rest::{AppState, ErrorResponse};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use storefront_promotions::FlashSaleTickReport;
use storefront_subscriptions::{ProcessSummary, ReminderSummary};
use tracing::error;

/// Optional override of the run date, for re-running a missed day.
#[derive(Debug, Default, Deserialize)]
pub struct RunDate {
    pub date: Option<NaiveDate>,
}

/// POST /v1/jobs/subscriptions/process
pub async fn handle_process_subscriptions(
    State(state): State<AppState>,
    Query(run): Query<RunDate>,
) -> Result<Json<ProcessSummary>, (StatusCode, Json<ErrorResponse>)> {
    let now = Utc::now();
    let today = run.date.unwrap_or_else(|| now.date_naive());
    state.subscriptions.run(today, now).map(Json).map_err(|e| {
        error!(error = %e, today = %today, "Subscription processing failed");
        ErrorResponse::from_error("subscription_processing_failed", &e)
    })
}

/// POST /v1/jobs/subscriptions/remind
pub async fn handle_subscription_reminders(
    State(state): State<AppState>,
    Query(run): Query<RunDate>,
) -> Result<Json<ReminderSummary>, (StatusCode, Json<ErrorResponse>)> {
    let now = Utc::now();
    let today = run.date.unwrap_or_else(|| now.date_naive());
    state.reminders.run(today, now).await.map(Json).map_err(|e| {
        error!(error = %e, today = %today, "Subscription reminders failed");
        ErrorResponse::from_error("subscription_reminders_failed", &e)
    })
}

/// POST /v1/jobs/flash-sales/process
pub async fn handle_process_flash_sales(State(state): State<AppState>) -> Json<FlashSaleTickReport> {
    Json(state.flash_sales.tick(Utc::now()).await)
}
