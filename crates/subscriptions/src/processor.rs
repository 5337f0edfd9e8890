//! Daily subscription batch: scan, guard, price, materialize.
//!
//! Each due subscription is processed sequentially and in isolation. Only the
//! initial reads (due list, tier table, discount settings) can fail the
//! whole run; anything after that becomes a per-subscription result.

use crate::cadence::next_delivery_date;
use crate::materializer::{plan_order, Materialized, OrderMaterializer};
use crate::scanner::{check_eligibility, find_due_subscriptions};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storefront_cache::TtlCache;
use storefront_core::config::{DiscountConfig, SubscriptionJobConfig};
use storefront_core::event_bus::EventSink;
use storefront_core::subscription::{
    DiscountSettings, DueSubscription, Subscription, SubscriptionOrder, SubscriptionOrderStatus,
    SubscriptionTier,
};
use storefront_core::{StorefrontError, StorefrontResult};
use storefront_loyalty::{calculate_discount, tier_progress, DiscountInput, DiscountResult, TierProgress};
use storefront_store::CommerceStore;
use tracing::{info, warn};
use uuid::Uuid;

const REFERENCE_KEY: &str = "pricing";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub subscription_id: Uuid,
    pub status: ProcessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_applied: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessResult {
    fn failed(subscription_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            subscription_id,
            status: ProcessStatus::Failed,
            order_id: None,
            discount_applied: None,
            error: Some(error.into()),
        }
    }
}

/// Response body of one batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_discount: f64,
    pub results: Vec<ProcessResult>,
}

impl ProcessSummary {
    fn from_results(results: Vec<ProcessResult>) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        Self {
            processed: results.len(),
            success: count(ProcessStatus::Success),
            failed: count(ProcessStatus::Failed),
            skipped: count(ProcessStatus::Skipped),
            total_discount: storefront_core::catalog::round_currency(
                results.iter().filter_map(|r| r.discount_applied).sum(),
            ),
            results,
        }
    }
}

/// Tier table and discount settings, read once per batch.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub tiers: Vec<SubscriptionTier>,
    pub settings: DiscountSettings,
}

pub struct SubscriptionProcessor {
    store: Arc<dyn CommerceStore>,
    events: Arc<dyn EventSink>,
    jobs: SubscriptionJobConfig,
    discount: DiscountConfig,
    reference: TtlCache<&'static str, ReferenceData>,
    /// Held for the whole batch; the duplicate guard is check-then-write.
    running: Mutex<()>,
}

impl SubscriptionProcessor {
    pub fn new(
        store: Arc<dyn CommerceStore>,
        events: Arc<dyn EventSink>,
        jobs: SubscriptionJobConfig,
        discount: DiscountConfig,
    ) -> Self {
        // Capped at one day.
        let ttl = Duration::seconds(jobs.reference_cache_ttl_secs.min(86_400) as i64);
        Self {
            store,
            events,
            jobs,
            discount,
            reference: TtlCache::new(ttl, 4),
            running: Mutex::new(()),
        }
    }

    /// Tier table and settings, from cache while fresh at `now`. A missing
    /// settings row falls back to the configured defaults.
    pub fn reference_data(&self, now: DateTime<Utc>) -> StorefrontResult<ReferenceData> {
        if let Some(cached) = self.reference.get_at(&REFERENCE_KEY, now) {
            return Ok(cached);
        }
        let tiers = self.store.subscription_tiers()?;
        let settings = match self.store.discount_settings()? {
            Some(settings) => settings,
            None => {
                info!("No discount settings stored, using configured defaults");
                self.discount.fallback_settings()
            }
        };
        let data = ReferenceData { tiers, settings };
        self.reference.put_at(REFERENCE_KEY, data.clone(), now);
        Ok(data)
    }

    pub fn invalidate_reference_data(&self) {
        self.reference.invalidate(&REFERENCE_KEY);
    }

    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        self.reference.evict_expired_at(now)
    }

    /// Process every subscription due on or before `today`.
    ///
    /// Fails with `Conflict` while another run is in progress.
    pub fn run(&self, today: NaiveDate, now: DateTime<Utc>) -> StorefrontResult<ProcessSummary> {
        let Some(_running) = self.running.try_lock() else {
            warn!("Subscription run already in progress");
            return Err(StorefrontError::Conflict(
                "subscription processing already in progress".to_string(),
            ));
        };
        let due = find_due_subscriptions(self.store.as_ref(), today)?;
        if due.is_empty() {
            return Ok(ProcessSummary::default());
        }
        let reference = self.reference_data(now)?;

        let results: Vec<ProcessResult> = due
            .iter()
            .map(|d| self.process_one(d, &reference, now))
            .collect();
        let summary = ProcessSummary::from_results(results);

        metrics::counter!("subscriptions.processed").increment(summary.processed as u64);
        metrics::counter!("subscriptions.success").increment(summary.success as u64);
        metrics::counter!("subscriptions.failed").increment(summary.failed as u64);
        metrics::counter!("subscriptions.skipped").increment(summary.skipped as u64);
        info!(
            processed = summary.processed,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            total_discount = summary.total_discount,
            "Subscription processing complete"
        );
        Ok(summary)
    }

    /// One subscription, never failing the batch.
    pub fn process_one(
        &self,
        due: &DueSubscription,
        reference: &ReferenceData,
        now: DateTime<Utc>,
    ) -> ProcessResult {
        let sub = &due.subscription;
        let scheduled_date = sub.next_delivery_date;
        let materializer = OrderMaterializer::new(self.store.as_ref(), self.events.as_ref(), &self.jobs);

        match self.already_materialized(sub, scheduled_date, now) {
            Ok(Some((order_id, reason))) => {
                return ProcessResult {
                    subscription_id: sub.id,
                    status: ProcessStatus::Skipped,
                    order_id,
                    discount_applied: None,
                    error: Some(reason),
                };
            }
            Ok(None) => {}
            Err(e) => {
                let message = e.to_string();
                materializer.record_failure(due, scheduled_date, None, &message, now);
                return ProcessResult::failed(sub.id, message);
            }
        }

        if let Err(reason) = check_eligibility(due) {
            materializer.record_failure(due, scheduled_date, None, reason.message(), now);
            return ProcessResult::failed(sub.id, reason.message());
        }

        let plan = plan_order(&due.lines);
        let discount = match self.discount_for(sub, plan.subtotal, reference, now) {
            Ok(discount) => discount,
            Err(e) => {
                let message = e.to_string();
                materializer.record_failure(due, scheduled_date, None, &message, now);
                return ProcessResult::failed(sub.id, message);
            }
        };

        match materializer.materialize(due, &plan, &discount, &reference.tiers, now) {
            Materialized::Created { order } => ProcessResult {
                subscription_id: sub.id,
                status: ProcessStatus::Success,
                order_id: Some(order.id),
                discount_applied: Some(discount.discount_amount),
                error: None,
            },
            Materialized::Failed { order_id, error } => ProcessResult {
                order_id,
                ..ProcessResult::failed(sub.id, error)
            },
        }
    }

    /// Whether an order already exists for this delivery date: a `created`
    /// row, or a `failed` row whose order could not be cancelled. When one
    /// does, a `skipped` row is appended and the cadence is advanced, since
    /// the earlier run stopped before moving the date. Returns the order id
    /// and the skip reason.
    fn already_materialized(
        &self,
        sub: &Subscription,
        scheduled_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> StorefrontResult<Option<(Option<Uuid>, String)>> {
        let existing = self.store.subscription_orders_for(sub.id, scheduled_date)?;
        let reason = if let Some(created) = existing
            .iter()
            .find(|r| r.status == SubscriptionOrderStatus::Created)
        {
            (created.order_id, format!("Already processed for {scheduled_date}"))
        } else if let Some(order_id) = existing
            .iter()
            .filter(|r| r.status == SubscriptionOrderStatus::Failed)
            .find_map(|r| r.order_id)
        {
            (Some(order_id), format!("Order {order_id} left incomplete for {scheduled_date}"))
        } else {
            return Ok(None);
        };
        warn!(subscription_id = %sub.id, scheduled_date = %scheduled_date, reason = %reason.1, "Order already exists for this delivery, skipping");
        self.store.insert_subscription_order(SubscriptionOrder::skipped(
            sub.id,
            scheduled_date,
            reason.1.clone(),
            now,
        ))?;
        let next = next_delivery_date(scheduled_date, sub.frequency);
        self.store.update_next_delivery_date(sub.id, next, now)?;
        Ok(Some(reason))
    }

    fn discount_for(
        &self,
        sub: &Subscription,
        subtotal: f64,
        reference: &ReferenceData,
        now: DateTime<Utc>,
    ) -> StorefrontResult<DiscountResult> {
        let tier = self
            .store
            .tier_assignment(sub.user_id)?
            .and_then(|a| reference.tiers.iter().find(|t| t.id == a.tier_id));
        let input = DiscountInput {
            subtotal,
            discount_enabled: sub.discount_enabled,
            base_discount_percent: sub.discount_percent,
            tier_bonus_percent: tier.map_or(0.0, |t| t.discount_bonus),
            tier_name: tier.map_or_else(|| self.discount.fallback_tier_name.clone(), |t| t.name.clone()),
            subscription_created_at: sub.created_at,
        };
        Ok(calculate_discount(&input, &reference.settings, now))
    }

    /// Discount the subscription would receive right now, without writing
    /// anything. `subtotal` defaults to the fulfillable items at current prices.
    pub fn preview_discount(
        &self,
        subscription_id: Uuid,
        subtotal: Option<f64>,
        now: DateTime<Utc>,
    ) -> StorefrontResult<DiscountResult> {
        let due = self
            .store
            .get_subscription(subscription_id)?
            .ok_or_else(|| StorefrontError::not_found(format!("subscription {subscription_id}")))?;
        if let Some(s) = subtotal {
            if !s.is_finite() || s < 0.0 {
                return Err(StorefrontError::Validation(format!("invalid subtotal {s}")));
            }
        }
        let subtotal = subtotal.unwrap_or_else(|| plan_order(&due.lines).subtotal);
        let reference = self.reference_data(now)?;
        self.discount_for(&due.subscription, subtotal, &reference, now)
    }

    /// Lifetime spend and position within the tier table.
    pub fn tier_progress(&self, user_id: Uuid, now: DateTime<Utc>) -> StorefrontResult<TierProgress> {
        let total = self.store.subscription_spending(user_id)?;
        let reference = self.reference_data(now)?;
        Ok(tier_progress(total, &reference.tiers))
    }
}
