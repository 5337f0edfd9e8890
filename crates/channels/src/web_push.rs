//! Web push notifications via Web Push Protocol (RFC 8030) and VAPID.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use storefront_core::config::PushConfig;
use storefront_core::notification::PushSubscription;
use storefront_core::{StorefrontError, StorefrontResult};
use uuid::Uuid;

/// Notification body posted to a push endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
    pub data: serde_json::Value,
    pub actions: Vec<PushAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushDeliveryResult {
    pub subscription_id: Uuid,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Totals for one fan-out over many endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushBroadcast {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Transport for a single push delivery.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Whether credentials are present; nothing is sent otherwise.
    fn is_configured(&self) -> bool;

    async fn deliver(&self, subscription: &PushSubscription, payload: &PushPayload) -> PushDeliveryResult;
}

/// Deliver `payload` to every endpoint, one at a time. Failures are logged
/// per endpoint and never abort the fan-out.
pub async fn broadcast(
    gateway: &dyn PushGateway,
    subscriptions: &[PushSubscription],
    payload: &PushPayload,
) -> PushBroadcast {
    let mut report = PushBroadcast::default();
    if !gateway.is_configured() {
        tracing::error!("VAPID keys not configured, skipping push delivery");
        return report;
    }
    for sub in subscriptions {
        report.attempted += 1;
        let result = gateway.deliver(sub, payload).await;
        if result.success {
            report.delivered += 1;
        } else {
            report.failed += 1;
            tracing::warn!(
                user_id = %sub.user_id,
                sub_id = %sub.id,
                status = ?result.status_code,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Push delivery failed"
            );
        }
    }
    metrics::counter!("push.delivered").increment(report.delivered as u64);
    metrics::counter!("push.failed").increment(report.failed as u64);
    report
}

/// VAPID web push provider. POSTs the JSON payload to each subscription
/// endpoint with a `TTL` header.
pub struct WebPushProvider {
    config: PushConfig,
    client: Client,
}

impl WebPushProvider {
    pub fn new(config: PushConfig) -> StorefrontResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StorefrontError::Push(format!("failed to build HTTP client: {e}")))?;
        tracing::info!(
            subject = %config.subject,
            configured = config.vapid_configured(),
            "Web push provider initialized"
        );
        Ok(Self { config, client })
    }

    fn result(subscription: &PushSubscription, status_code: Option<u16>, error: Option<String>) -> PushDeliveryResult {
        PushDeliveryResult {
            subscription_id: subscription.id,
            success: error.is_none(),
            status_code,
            error,
            sent_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PushGateway for WebPushProvider {
    fn is_configured(&self) -> bool {
        self.config.vapid_configured()
    }

    async fn deliver(&self, subscription: &PushSubscription, payload: &PushPayload) -> PushDeliveryResult {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", self.config.ttl_secs.to_string())
            .json(payload)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(
                    user_id = %subscription.user_id,
                    sub_id = %subscription.id,
                    status = response.status().as_u16(),
                    "Web push delivered"
                );
                Self::result(subscription, Some(response.status().as_u16()), None)
            }
            Ok(response) => {
                let status = response.status();
                Self::result(subscription, Some(status.as_u16()), Some(format!("HTTP {status}")))
            }
            Err(e) => Self::result(subscription, e.status().map(|s| s.as_u16()), Some(e.to_string())),
        }
    }
}

/// Gateway that records payloads instead of sending them. Endpoints added
/// with `fail_endpoint` answer 410 Gone.
pub struct RecordingPushGateway {
    configured: bool,
    failing: Mutex<HashSet<String>>,
    sent: Mutex<Vec<(Uuid, PushPayload)>>,
}

impl Default for RecordingPushGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPushGateway {
    pub fn new() -> Self {
        Self {
            configured: true,
            failing: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn fail_endpoint(&self, endpoint: impl Into<String>) {
        self.failing.lock().insert(endpoint.into());
    }

    /// `(user_id, payload)` for every successful delivery.
    pub fn sent(&self) -> Vec<(Uuid, PushPayload)> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl PushGateway for RecordingPushGateway {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn deliver(&self, subscription: &PushSubscription, payload: &PushPayload) -> PushDeliveryResult {
        let failed = self.failing.lock().contains(&subscription.endpoint);
        if !failed {
            self.sent.lock().push((subscription.user_id, payload.clone()));
        }
        PushDeliveryResult {
            subscription_id: subscription.id,
            success: !failed,
            status_code: Some(if failed { 410 } else { 201 }),
            error: failed.then(|| "410 Gone".to_string()),
            sent_at: Utc::now(),
        }
    }
}
