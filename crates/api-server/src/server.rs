//! API server: job triggers, tier lookups and health checks over HTTP, Prometheus
//! metrics on a separate port.

use crate::rest::{self, AppState};
use crate::{jobs_rest, loyalty_rest};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use storefront_core::config::AppConfig;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        // Job triggers
        .route(
            "/v1/jobs/subscriptions/process",
            post(jobs_rest::handle_process_subscriptions),
        )
        .route(
            "/v1/jobs/subscriptions/remind",
            post(jobs_rest::handle_subscription_reminders),
        )
        .route(
            "/v1/jobs/flash-sales/process",
            post(jobs_rest::handle_process_flash_sales),
        )
        // Tiers and discounts
        .route(
            "/v1/subscriptions/tiers/:user_id",
            get(loyalty_rest::handle_tier_progress),
        )
        .route(
            "/v1/subscriptions/discount/preview",
            post(loyalty_rest::handle_discount_preview),
        )
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        if !self.config.metrics.enabled {
            info!("Metrics exporter disabled");
            return Ok(());
        }
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Instant;
    use storefront_channels::RecordingPushGateway;
    use storefront_core::config::{DiscountConfig, FlashSaleConfig, SubscriptionJobConfig};
    use storefront_core::event_bus::noop_sink;
    use storefront_promotions::FlashSaleScheduler;
    use storefront_store::{CommerceStore, FaultyStore, MemoryStore, StoreOp};
    use storefront_subscriptions::{ReminderJob, SubscriptionProcessor};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn state(store: Arc<dyn CommerceStore>) -> AppState {
        let gateway = Arc::new(RecordingPushGateway::new());
        AppState {
            subscriptions: Arc::new(SubscriptionProcessor::new(
                store.clone(),
                noop_sink(),
                SubscriptionJobConfig::default(),
                DiscountConfig::default(),
            )),
            reminders: Arc::new(ReminderJob::new(store.clone(), gateway.clone())),
            flash_sales: Arc::new(FlashSaleScheduler::new(
                store,
                gateway,
                noop_sink(),
                FlashSaleConfig::default(),
            )),
            node_id: "test-node".into(),
            start_time: Instant::now(),
        }
    }

    fn demo() -> Arc<FaultyStore> {
        Arc::new(FaultyStore::new(MemoryStore::with_demo_data(
            Utc::now().date_naive(),
        )))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_reports_node() {
        let (status, body) = send(router(state(demo())), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["node_id"], "test-node");
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_process_subscriptions_returns_summary() {
        let store = demo();
        let (status, body) = send(
            router(state(store.clone())),
            "POST",
            "/v1/jobs/subscriptions/process",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["processed"], 1);
        assert_eq!(body["success"], 1);
        assert_eq!(body["results"][0]["status"], "success");
        assert_eq!(store.inner().order_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_failures_still_200() {
        let store = demo();
        store.fail(StoreOp::InsertOrder);
        let (status, body) = send(
            router(state(store)),
            "POST",
            "/v1/jobs/subscriptions/process",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["failed"], 1);
        assert!(body["results"][0]["error"].as_str().unwrap().contains("Failed to create order"));
    }

    #[tokio::test]
    async fn test_setup_failure_is_500() {
        let store = demo();
        store.fail(StoreOp::DueSubscriptions);
        let (status, body) = send(
            router(state(store)),
            "POST",
            "/v1/jobs/subscriptions/process",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "subscription_processing_failed");
        assert!(body["message"].as_str().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_reminders_with_date_override() {
        let today = Utc::now().date_naive();
        let (status, body) = send(
            router(state(demo())),
            "POST",
            &format!("/v1/jobs/subscriptions/remind?date={today}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["sent"], 1);
    }

    #[tokio::test]
    async fn test_flash_sale_tick_never_500() {
        let store = demo();
        store.fail(StoreOp::ActiveFlashSales);
        let (status, body) = send(router(state(store)), "POST", "/v1/jobs/flash-sales/process", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tier_progress_endpoint() {
        let customer = Uuid::from_u128(1);
        let (status, body) = send(
            router(state(demo())),
            "GET",
            &format!("/v1/subscriptions/tiers/{customer}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current"]["name"], "bronze");
        assert_eq!(body["next"]["name"], "silver");
    }

    #[tokio::test]
    async fn test_discount_preview_endpoint() {
        let app = router(state(demo()));
        let (status, body) = send(
            app.clone(),
            "POST",
            "/v1/subscriptions/discount/preview",
            Some(serde_json::json!({
                "subscription_id": Uuid::from_u128(0x52),
                "subtotal": 1000.0,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        // 10% base + 3 whole months of tenure bonus (6%), capped at 15%.
        assert_eq!(body["discount_percent"], 15.0);
        assert_eq!(body["final_total"], 850.0);

        let (status, body) = send(
            app,
            "POST",
            "/v1/subscriptions/discount/preview",
            Some(serde_json::json!({ "subscription_id": Uuid::new_v4() })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "discount_preview_failed");
    }
}
