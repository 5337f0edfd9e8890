//! Day-before delivery reminders.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storefront_channels::messages::{delivery_reminder_notification, delivery_reminder_push};
use storefront_channels::{broadcast, PushGateway};
use storefront_core::catalog::round_currency;
use storefront_core::subscription::DueSubscription;
use storefront_core::StorefrontResult;
use storefront_store::CommerceStore;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderResult {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub status: ReminderStatus,
    /// Push endpoints that accepted the reminder.
    pub pushed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReminderSummary {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub results: Vec<ReminderResult>,
}

/// Item count and estimate at current prices. Deleted products count as zero.
pub fn estimate(due: &DueSubscription) -> (usize, f64) {
    let total = due
        .lines
        .iter()
        .map(|l| l.product.as_ref().map_or(0.0, |p| p.price) * f64::from(l.item.quantity))
        .sum();
    (due.lines.len(), round_currency(total))
}

pub struct ReminderJob {
    store: Arc<dyn CommerceStore>,
    gateway: Arc<dyn PushGateway>,
}

impl ReminderJob {
    pub fn new(store: Arc<dyn CommerceStore>, gateway: Arc<dyn PushGateway>) -> Self {
        Self { store, gateway }
    }

    /// Remind the owner of every active subscription delivering tomorrow.
    ///
    /// The in-app notification decides the per-subscription status; push
    /// delivery is best-effort.
    pub async fn run(&self, today: NaiveDate, now: DateTime<Utc>) -> StorefrontResult<ReminderSummary> {
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
        let due = self.store.subscriptions_due_on(tomorrow)?;
        info!(count = due.len(), date = %tomorrow, "Found subscriptions due tomorrow");

        let mut results = Vec::with_capacity(due.len());
        for d in &due {
            results.push(self.remind(d, now).await);
        }
        let sent = results.iter().filter(|r| r.status == ReminderStatus::Sent).count();
        let summary = ReminderSummary {
            total: results.len(),
            sent,
            failed: results.len() - sent,
            results,
        };
        metrics::counter!("subscriptions.reminders_sent").increment(summary.sent as u64);
        info!(total = summary.total, sent = summary.sent, failed = summary.failed, "Reminder processing complete");
        Ok(summary)
    }

    async fn remind(&self, due: &DueSubscription, now: DateTime<Utc>) -> ReminderResult {
        let sub = &due.subscription;
        let (item_count, total) = estimate(due);
        let notification =
            delivery_reminder_notification(sub.user_id, sub.id, &sub.name, item_count, total, now);

        if let Err(e) = self.store.insert_notification(notification) {
            warn!(subscription_id = %sub.id, error = %e, "Failed to store reminder notification");
            return ReminderResult {
                subscription_id: sub.id,
                user_id: sub.user_id,
                status: ReminderStatus::Failed,
                pushed: 0,
                error: Some(e.to_string()),
            };
        }

        let pushed = match self.store.push_subscriptions_for(sub.user_id) {
            Ok(endpoints) if !endpoints.is_empty() => {
                let payload = delivery_reminder_push(sub.id, &sub.name);
                broadcast(self.gateway.as_ref(), &endpoints, &payload).await.delivered
            }
            Ok(_) => 0,
            Err(e) => {
                warn!(user_id = %sub.user_id, error = %e, "Failed to load push subscriptions");
                0
            }
        };

        ReminderResult {
            subscription_id: sub.id,
            user_id: sub.user_id,
            status: ReminderStatus::Sent,
            pushed,
            error: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use storefront_channels::RecordingPushGateway;
    use storefront_core::notification::{NotificationKind, PushSubscription};
    use storefront_store::MemoryStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_reminds_only_tomorrows_deliveries() {
        let today = now().date_naive();
        let store = Arc::new(MemoryStore::with_demo_data(today));
        let gateway = Arc::new(RecordingPushGateway::new());
        let job = ReminderJob::new(store.clone(), gateway.clone());

        let summary = job.run(today, now()).await.unwrap();
        // Demo data: the monthly pantry subscription is due tomorrow.
        assert_eq!(summary.total, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.results[0].subscription_id, Uuid::from_u128(0x52));
        assert_eq!(summary.results[0].pushed, 1);

        let customer = Uuid::from_u128(1);
        let notes = store.notifications_for(customer);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::SubscriptionReminder);
        // 2 x 60 + 159
        assert_eq!(notes[0].data["total"], 279.0);
        assert_eq!(gateway.sent()[0].0, customer);
    }

    #[tokio::test]
    async fn test_push_failure_does_not_fail_reminder() {
        let today = now().date_naive();
        let store = Arc::new(MemoryStore::with_demo_data(today));
        store.register_push_subscription(PushSubscription {
            id: Uuid::new_v4(),
            user_id: Uuid::from_u128(1),
            endpoint: "https://push/gone".into(),
            p256dh: "k".into(),
            auth: "a".into(),
        });
        let gateway = Arc::new(RecordingPushGateway::new());
        gateway.fail_endpoint("https://push/gone");
        let job = ReminderJob::new(store, gateway);

        let summary = job.run(today, now()).await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.results[0].pushed, 1);
    }

    #[tokio::test]
    async fn test_nothing_due_tomorrow() {
        let today = now().date_naive();
        let store = Arc::new(MemoryStore::with_demo_data(today + Duration::days(10)));
        let job = ReminderJob::new(store, Arc::new(RecordingPushGateway::unconfigured()));
        let summary = job.run(today, now()).await.unwrap();
        assert_eq!(summary.total, 0);
        assert!(summary.results.is_empty());
    }
}
