//! Flash Sale Scheduler: drives each scheduled sale through
//! `scheduled -> live -> ended` and sends the pre-start reminder.
//!
//! Runs as a periodic tick. A failure on one sale is recorded in the tick
//! report and never stops the others; `tick` itself never fails. A sale is
//! only closed once its products are unflagged, so a failed unflag is
//! retried on the next tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storefront_channels::messages::flash_sale_reminder_push;
use storefront_channels::{broadcast, PushGateway};
use storefront_core::config::FlashSaleConfig;
use storefront_core::event_bus::{make_event, EventSink, EventTopic};
use storefront_core::promotion::{FlashSalePhase, ScheduledFlashSale};
use storefront_core::StorefrontResult;
use storefront_store::CommerceStore;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Outcome of one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashSaleTickReport {
    pub timestamp: DateTime<Utc>,
    /// Names of sales whose products were flagged this tick.
    pub activated: Vec<String>,
    /// Names of sales closed this tick.
    pub deactivated: Vec<String>,
    /// Push deliveries accepted across all reminders.
    pub notifications_sent: usize,
    pub errors: Vec<String>,
    /// Set when another tick was still running and nothing was done.
    #[serde(default)]
    pub skipped: bool,
}

impl FlashSaleTickReport {
    fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            activated: Vec::new(),
            deactivated: Vec::new(),
            notifications_sent: 0,
            errors: Vec::new(),
            skipped: false,
        }
    }
}

pub struct FlashSaleScheduler {
    store: Arc<dyn CommerceStore>,
    gateway: Arc<dyn PushGateway>,
    events: Arc<dyn EventSink>,
    config: FlashSaleConfig,
    running: Mutex<()>,
}

impl FlashSaleScheduler {
    pub fn new(
        store: Arc<dyn CommerceStore>,
        gateway: Arc<dyn PushGateway>,
        events: Arc<dyn EventSink>,
        config: FlashSaleConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            config,
            running: Mutex::new(()),
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> FlashSaleTickReport {
        let mut report = FlashSaleTickReport::new(now);
        let Ok(_running) = self.running.try_lock() else {
            debug!("Flash sale tick already in progress, skipping");
            report.skipped = true;
            return report;
        };
        let sales = match self.store.active_flash_sales() {
            Ok(sales) => sales,
            Err(e) => {
                error!(error = %e, "Failed to load scheduled flash sales");
                report.errors.push(format!("Flash sale query error: {e}"));
                return report;
            }
        };

        for sale in &sales {
            match sale.phase_at(now) {
                FlashSalePhase::Ended => self.end(sale, now, &mut report),
                FlashSalePhase::Live => self.activate(sale, now, &mut report),
                FlashSalePhase::Scheduled => {
                    if !sale.notification_sent && sale.in_reminder_window(now) {
                        self.remind(sale, now, &mut report).await;
                    }
                }
            }
        }

        metrics::counter!("flash_sales.activated").increment(report.activated.len() as u64);
        metrics::counter!("flash_sales.deactivated").increment(report.deactivated.len() as u64);
        metrics::counter!("flash_sales.errors").increment(report.errors.len() as u64);
        if !report.activated.is_empty() || !report.deactivated.is_empty() || !report.errors.is_empty() {
            info!(
                activated = report.activated.len(),
                deactivated = report.deactivated.len(),
                notifications_sent = report.notifications_sent,
                errors = report.errors.len(),
                "Flash sale tick complete"
            );
        }
        report
    }

    /// Whether any listed product still lacks the flash sale flag.
    fn needs_activation(&self, sale: &ScheduledFlashSale) -> StorefrontResult<bool> {
        let products = self.store.products(&sale.product_ids)?;
        Ok(products.iter().any(|p| !p.is_flash_sale))
    }

    fn activate(&self, sale: &ScheduledFlashSale, now: DateTime<Utc>, report: &mut FlashSaleTickReport) {
        if sale.product_ids.is_empty() {
            return;
        }
        match self.needs_activation(sale) {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => {
                report
                    .errors
                    .push(format!("Activate products error for {}: {e}", sale.name));
                return;
            }
        }
        if let Err(e) = self.store.set_flash_sale_flags(&sale.product_ids, true, now) {
            warn!(sale_id = sale.id, error = %e, "Failed to flag flash sale products");
            report
                .errors
                .push(format!("Activate products error for {}: {e}", sale.name));
            return;
        }
        info!(sale_id = sale.id, name = %sale.name, products = sale.product_ids.len(), "Flash sale activated");
        report.activated.push(sale.name.clone());
        self.events.emit(make_event(
            EventTopic::FlashSaleActivated,
            sale.id.to_string(),
            None,
            serde_json::json!({ "name": sale.name, "product_ids": sale.product_ids }),
        ));
    }

    /// Unflag the products, then close the schedule. When unflagging fails
    /// the schedule stays active so the next tick tries again.
    fn end(&self, sale: &ScheduledFlashSale, now: DateTime<Utc>, report: &mut FlashSaleTickReport) {
        if !sale.product_ids.is_empty() {
            if let Err(e) = self.store.set_flash_sale_flags(&sale.product_ids, false, now) {
                warn!(sale_id = sale.id, error = %e, "Failed to unflag flash sale products");
                report
                    .errors
                    .push(format!("Deactivate products error for {}: {e}", sale.name));
                return;
            }
        }
        if let Err(e) = self.store.deactivate_flash_sale(sale.id) {
            report
                .errors
                .push(format!("Deactivate schedule error for {}: {e}", sale.name));
            return;
        }
        info!(sale_id = sale.id, name = %sale.name, "Flash sale ended");
        report.deactivated.push(sale.name.clone());
        self.events.emit(make_event(
            EventTopic::FlashSaleEnded,
            sale.id.to_string(),
            None,
            serde_json::json!({ "name": sale.name, "product_ids": sale.product_ids }),
        ));
    }

    /// Push the pre-start reminder to every stored endpoint, then set the
    /// sent flag. A crash between the two can send it twice.
    async fn remind(&self, sale: &ScheduledFlashSale, now: DateTime<Utc>, report: &mut FlashSaleTickReport) {
        let endpoints = match self.store.push_subscriptions() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                report
                    .errors
                    .push(format!("Push subscription query error for {}: {e}", sale.name));
                return;
            }
        };

        let delivered = if endpoints.is_empty() {
            0
        } else {
            let payload = flash_sale_reminder_push(sale, sale.minutes_until_start(now), &self.config);
            broadcast(self.gateway.as_ref(), &endpoints, &payload).await.delivered
        };
        report.notifications_sent += delivered;

        if let Err(e) = self.store.mark_flash_sale_notified(sale.id) {
            report
                .errors
                .push(format!("Notification flag error for {}: {e}", sale.name));
            return;
        }
        debug!(sale_id = sale.id, delivered = delivered, "Flash sale reminder sent");
        self.events.emit(make_event(
            EventTopic::FlashSaleReminderSent,
            sale.id.to_string(),
            None,
            serde_json::json!({ "name": sale.name, "delivered": delivered }),
        ));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use storefront_channels::RecordingPushGateway;
    use storefront_core::catalog::{Product, ProductId};
    use storefront_core::event_bus::capture_sink;
    use storefront_core::notification::PushSubscription;
    use storefront_store::{FaultyStore, MemoryStore, StoreOp};
    use uuid::Uuid;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn product(id: ProductId) -> Product {
        Product {
            id,
            name: format!("p{id}"),
            price: 10.0,
            is_active: true,
            stock: None,
            is_flash_sale: false,
            flash_sale_order: None,
        }
    }

    fn sale(id: i64, product_ids: Vec<ProductId>) -> ScheduledFlashSale {
        ScheduledFlashSale {
            id,
            name: format!("sale-{id}"),
            start_time: t(),
            end_time: t() + Duration::hours(2),
            product_ids,
            notify_before: 60,
            is_active: true,
            notification_sent: false,
        }
    }

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        for id in 1..=4 {
            store.insert_product(product(id));
        }
        for n in 0..2u128 {
            store.register_push_subscription(PushSubscription {
                id: Uuid::from_u128(0xb0 + n),
                user_id: Uuid::from_u128(n + 1),
                endpoint: format!("https://push/{n}"),
                p256dh: "k".into(),
                auth: "a".into(),
            });
        }
        Arc::new(store)
    }

    fn scheduler(store: Arc<dyn CommerceStore>, gateway: Arc<dyn PushGateway>) -> FlashSaleScheduler {
        FlashSaleScheduler::new(store, gateway, capture_sink(), FlashSaleConfig::default())
    }

    #[tokio::test]
    async fn test_reminder_sent_once_inside_window() {
        let store = store();
        store.insert_flash_sale(sale(1, vec![1]));
        let gateway = Arc::new(RecordingPushGateway::new());
        let s = scheduler(store.clone(), gateway.clone());

        let report = s.tick(t() - Duration::minutes(45)).await;
        assert_eq!(report.notifications_sent, 2);
        assert!(store.flash_sale(1).unwrap().notification_sent);
        assert!(gateway.sent()[0].1.body.contains("45 minutes"));

        let report = s.tick(t() - Duration::minutes(30)).await;
        assert_eq!(report.notifications_sent, 0);
        assert_eq!(gateway.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_no_reminder_before_window() {
        let store = store();
        store.insert_flash_sale(sale(1, vec![1]));
        let gateway = Arc::new(RecordingPushGateway::new());
        let s = scheduler(store.clone(), gateway.clone());

        s.tick(t() - Duration::minutes(61)).await;
        assert_eq!(gateway.sent_count(), 0);
        assert!(!store.flash_sale(1).unwrap().notification_sent);
    }

    #[tokio::test]
    async fn test_reminder_marked_sent_without_vapid_keys() {
        let store = store();
        store.insert_flash_sale(sale(1, vec![1]));
        let s = scheduler(store.clone(), Arc::new(RecordingPushGateway::unconfigured()));

        let report = s.tick(t() - Duration::minutes(10)).await;
        assert_eq!(report.notifications_sent, 0);
        assert!(store.flash_sale(1).unwrap().notification_sent);
    }

    #[tokio::test]
    async fn test_lifecycle_activate_then_end() {
        let store = store();
        store.insert_flash_sale(sale(1, vec![1, 2]));
        let events = capture_sink();
        let s = FlashSaleScheduler::new(
            store.clone(),
            Arc::new(RecordingPushGateway::new()),
            events.clone(),
            FlashSaleConfig::default(),
        );

        let report = s.tick(t()).await;
        assert_eq!(report.activated, vec!["sale-1".to_string()]);
        let p = store.product(1).unwrap();
        assert!(p.is_flash_sale);
        assert_eq!(p.flash_sale_order, Some(1));

        // Already flagged: not re-applied or re-reported.
        let report = s.tick(t() + Duration::minutes(1)).await;
        assert!(report.activated.is_empty());

        let report = s.tick(t() + Duration::hours(2)).await;
        assert_eq!(report.deactivated, vec!["sale-1".to_string()]);
        let p = store.product(2).unwrap();
        assert!(!p.is_flash_sale);
        assert_eq!(p.flash_sale_order, None);
        assert!(!store.flash_sale(1).unwrap().is_active);

        // Terminal.
        let report = s.tick(t() + Duration::hours(3)).await;
        assert!(report.deactivated.is_empty());
        assert_eq!(events.count_topic(EventTopic::FlashSaleActivated), 1);
        assert_eq!(events.count_topic(EventTopic::FlashSaleEnded), 1);
    }

    #[tokio::test]
    async fn test_partially_flagged_sale_is_reapplied() {
        let store = store();
        store.insert_flash_sale(sale(1, vec![1, 2]));
        let mut flagged = product(1);
        flagged.is_flash_sale = true;
        store.insert_product(flagged);
        let s = scheduler(store.clone(), Arc::new(RecordingPushGateway::new()));

        let report = s.tick(t() + Duration::minutes(5)).await;
        assert_eq!(report.activated.len(), 1);
        assert!(store.product(2).unwrap().is_flash_sale);
    }

    #[tokio::test]
    async fn test_sale_without_products_never_activates() {
        let store = store();
        store.insert_flash_sale(sale(1, vec![]));
        let s = scheduler(store.clone(), Arc::new(RecordingPushGateway::new()));
        let report = s.tick(t()).await;
        assert!(report.activated.is_empty());
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_sale_ended_while_never_ticked_live() {
        let store = store();
        let mut missed = sale(1, vec![3]);
        missed.notification_sent = false;
        store.insert_flash_sale(missed);
        let s = scheduler(store.clone(), Arc::new(RecordingPushGateway::new()));

        let report = s.tick(t() + Duration::hours(5)).await;
        assert_eq!(report.deactivated.len(), 1);
        assert!(report.activated.is_empty());
        assert_eq!(report.notifications_sent, 0);
    }

    fn faulty_store() -> Arc<FaultyStore> {
        let inner = MemoryStore::new();
        for id in 1..=4 {
            inner.insert_product(product(id));
        }
        Arc::new(FaultyStore::new(inner))
    }

    #[tokio::test]
    async fn test_product_update_error_does_not_block_other_sales() {
        let store = faulty_store();
        // Sales are visited in start order; the first flag update fails.
        store.inner().insert_flash_sale(sale(1, vec![3]));
        let mut later = sale(2, vec![4]);
        later.start_time = t() + Duration::seconds(30);
        store.inner().insert_flash_sale(later);
        store.fail_times(StoreOp::SetFlashSaleFlags, 1);
        let s = scheduler(store.clone(), Arc::new(RecordingPushGateway::new()));

        let report = s.tick(t() + Duration::minutes(1)).await;
        assert_eq!(report.activated, vec!["sale-2".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("sale-1"));
        assert!(store.inner().product(4).unwrap().is_flash_sale);
        assert!(!store.inner().product(3).unwrap().is_flash_sale);

        // Retried on the next tick.
        let report = s.tick(t() + Duration::minutes(2)).await;
        assert_eq!(report.activated, vec!["sale-1".to_string()]);
    }

    #[tokio::test]
    async fn test_ended_sale_retried_until_unflagged() {
        let store = faulty_store();
        store.inner().insert_flash_sale(sale(1, vec![3]));
        let s = scheduler(store.clone(), Arc::new(RecordingPushGateway::new()));
        s.tick(t()).await;
        assert!(store.inner().product(3).unwrap().is_flash_sale);

        store.fail_times(StoreOp::SetFlashSaleFlags, 1);
        let report = s.tick(t() + Duration::hours(2)).await;
        assert!(report.deactivated.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(store.inner().flash_sale(1).unwrap().is_active);

        // One scan interval later the products are unflagged and the sale closes.
        let report = s.tick(t() + Duration::hours(2) + Duration::minutes(1)).await;
        assert_eq!(report.deactivated, vec!["sale-1".to_string()]);
        assert!(!store.inner().product(3).unwrap().is_flash_sale);
        assert!(!store.inner().flash_sale(1).unwrap().is_active);
    }

    #[tokio::test]
    async fn test_overlapping_tick_skipped() {
        let store = store();
        store.insert_flash_sale(sale(1, vec![1]));
        let s = scheduler(store.clone(), Arc::new(RecordingPushGateway::new()));

        let held = s.running.try_lock().unwrap();
        let report = s.tick(t()).await;
        assert!(report.skipped);
        assert!(report.activated.is_empty());
        assert!(!store.product(1).unwrap().is_flash_sale);
        drop(held);

        let report = s.tick(t()).await;
        assert!(!report.skipped);
        assert_eq!(report.activated.len(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_reported_not_raised() {
        let store = faulty_store();
        store.fail(StoreOp::ActiveFlashSales);
        let s = scheduler(store, Arc::new(RecordingPushGateway::new()));
        let report = s.tick(t()).await;
        assert_eq!(report.errors.len(), 1);
        assert!(report.activated.is_empty());
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let s = scheduler(store(), Arc::new(RecordingPushGateway::new()));
        let json = serde_json::to_value(s.tick(t()).await).unwrap();
        assert!(json["activated"].as_array().unwrap().is_empty());
        assert_eq!(json["notifications_sent"], 0);
    }
}
