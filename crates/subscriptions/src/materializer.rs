//! Order Materializer: turns a due subscription into a concrete order and
//! records the outcome in the audit trail.

use crate::cadence::next_delivery_date;
use chrono::{DateTime, NaiveDate, Utc};
use storefront_channels::messages::order_created_notification;
use storefront_core::catalog::{round_currency, NewOrder, Order, OrderItem, OrderStatus, Product};
use storefront_core::config::SubscriptionJobConfig;
use storefront_core::event_bus::{make_event, EventSink, EventTopic};
use storefront_core::subscription::{
    DueSubscription, SubscriptionLine, SubscriptionOrder, SubscriptionOrderStatus,
    SubscriptionTier, TierAssignment,
};
use storefront_core::StorefrontResult;
use storefront_loyalty::{resolve_tier, DiscountResult};
use storefront_store::CommerceStore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const NO_VALID_ITEMS: &str = "No valid items available";

/// A subscription line that can be fulfilled right now, priced at the
/// product's current price.
#[derive(Debug, Clone)]
pub struct PlannedLine {
    pub product: Product,
    pub quantity: u32,
}

impl PlannedLine {
    pub fn line_total(&self) -> f64 {
        self.product.price * f64::from(self.quantity)
    }
}

/// The fulfillable part of a subscription.
#[derive(Debug, Clone, Default)]
pub struct OrderPlan {
    pub lines: Vec<PlannedLine>,
    pub subtotal: f64,
    /// Lines dropped for inactive, deleted or short-stocked products.
    pub dropped: usize,
}

impl OrderPlan {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Keep lines whose product exists, is active and has enough stock.
/// Dropped lines are not an error.
pub fn plan_order(lines: &[SubscriptionLine]) -> OrderPlan {
    let mut plan = OrderPlan::default();
    for line in lines {
        match &line.product {
            Some(product) if product.can_fulfil(line.item.quantity) => {
                plan.lines.push(PlannedLine {
                    product: product.clone(),
                    quantity: line.item.quantity,
                });
            }
            _ => {
                debug!(
                    subscription_id = %line.item.subscription_id,
                    product_id = line.item.product_id,
                    quantity = line.item.quantity,
                    "Dropping unavailable subscription item"
                );
                plan.dropped += 1;
            }
        }
    }
    plan.subtotal = round_currency(plan.lines.iter().map(PlannedLine::line_total).sum());
    plan
}

/// Result of one materialization attempt.
#[derive(Debug, Clone)]
pub enum Materialized {
    Created { order: Order },
    Failed { order_id: Option<Uuid>, error: String },
}

/// Recompute the user's lifetime subscription spend and upsert the best
/// qualifying tier. Returns `None` (and writes nothing) when no tier qualifies.
pub fn recompute_tier(
    store: &dyn CommerceStore,
    user_id: Uuid,
    tiers: &[SubscriptionTier],
    now: DateTime<Utc>,
) -> StorefrontResult<Option<TierAssignment>> {
    let total_spending = store.subscription_spending(user_id)?;
    let Some(tier) = resolve_tier(total_spending, tiers) else {
        return Ok(None);
    };
    let assignment = TierAssignment {
        user_id,
        tier_id: tier.id,
        total_spending,
        updated_at: now,
    };
    store.upsert_tier_assignment(assignment.clone())?;
    debug!(user_id = %user_id, tier = %tier.name, total_spending = total_spending, "Tier assignment updated");
    Ok(Some(assignment))
}

pub struct OrderMaterializer<'a> {
    store: &'a dyn CommerceStore,
    events: &'a dyn EventSink,
    config: &'a SubscriptionJobConfig,
}

impl<'a> OrderMaterializer<'a> {
    pub fn new(
        store: &'a dyn CommerceStore,
        events: &'a dyn EventSink,
        config: &'a SubscriptionJobConfig,
    ) -> Self {
        Self { store, events, config }
    }

    /// Free at or above the threshold, flat fee below it.
    pub fn delivery_fee(&self, discounted_total: f64) -> f64 {
        if discounted_total >= self.config.free_delivery_threshold {
            0.0
        } else {
            self.config.delivery_fee
        }
    }

    /// Write a `failed` audit row for `scheduled_date` and emit the failure
    /// event. The subscription's delivery date is left untouched.
    pub fn record_failure(
        &self,
        due: &DueSubscription,
        scheduled_date: NaiveDate,
        order_id: Option<Uuid>,
        message: &str,
        now: DateTime<Utc>,
    ) -> Materialized {
        let sub = &due.subscription;
        warn!(subscription_id = %sub.id, reason = message, "Subscription order failed");

        let mut record = SubscriptionOrder::failed(sub.id, scheduled_date, message, now);
        record.order_id = order_id;
        if let Err(e) = self.store.insert_subscription_order(record) {
            error!(subscription_id = %sub.id, error = %e, "Failed to write failed audit record");
        }
        self.events.emit(make_event(
            EventTopic::SubscriptionOrderFailed,
            sub.id.to_string(),
            Some(sub.user_id),
            serde_json::json!({ "scheduled_date": scheduled_date, "error": message }),
        ));
        Materialized::Failed {
            order_id,
            error: message.to_string(),
        }
    }

    /// Cancel an order whose items or `created` audit row could not be
    /// written, then record the attempt as failed. A failed row keeps the
    /// order id only when the cancel also failed, which blocks any retry for
    /// that delivery date.
    fn abandon_order(
        &self,
        due: &DueSubscription,
        scheduled_date: NaiveDate,
        order: &Order,
        message: &str,
        now: DateTime<Utc>,
    ) -> Materialized {
        match self.store.cancel_order(order.id, now) {
            Ok(()) => {
                info!(subscription_id = %due.subscription.id, order_id = %order.id, "Cancelled incomplete subscription order");
                let message = format!("{message} (order {} cancelled)", order.id);
                self.record_failure(due, scheduled_date, None, &message, now)
            }
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Failed to cancel incomplete subscription order");
                // The order may still be billed; move past this date.
                let sub = &due.subscription;
                let next = next_delivery_date(scheduled_date, sub.frequency);
                if let Err(e) = self.store.update_next_delivery_date(sub.id, next, now) {
                    error!(subscription_id = %sub.id, next = %next, error = %e, "Failed to advance delivery date");
                }
                self.record_failure(due, scheduled_date, Some(order.id), message, now)
            }
        }
    }

    /// Create the order for `plan`, then run the follow-up writes.
    ///
    /// The order counts as created once its items and its `created` audit
    /// row are stored; a failure before that cancels the order. After that
    /// point a failing cadence, tier or notification write is logged only.
    pub fn materialize(
        &self,
        due: &DueSubscription,
        plan: &OrderPlan,
        discount: &DiscountResult,
        tiers: &[SubscriptionTier],
        now: DateTime<Utc>,
    ) -> Materialized {
        let sub = &due.subscription;
        let scheduled_date = sub.next_delivery_date;

        if plan.is_empty() {
            return self.record_failure(due, scheduled_date, None, NO_VALID_ITEMS, now);
        }
        let Some(address_id) = sub.address_id else {
            return self.record_failure(due, scheduled_date, None, "No delivery address configured", now);
        };

        let delivery_fee = self.delivery_fee(discount.final_total);
        let total = round_currency(discount.final_total + delivery_fee);
        let new_order = NewOrder {
            user_id: sub.user_id,
            address_id,
            subtotal: plan.subtotal,
            delivery_fee,
            discount: discount.discount_amount,
            total,
            payment_method: sub.payment_method.clone(),
            notes: format!(
                "Automatic order from: {} ({}% off - {})",
                sub.name, discount.discount_percent, discount.discount_breakdown.tier_name
            ),
            status: if sub.auto_confirm {
                OrderStatus::Confirmed
            } else {
                OrderStatus::Pending
            },
        };

        let order = match self.store.insert_order(new_order, now) {
            Ok(order) => order,
            Err(e) => {
                let message = format!("Failed to create order: {e}");
                return self.record_failure(due, scheduled_date, None, &message, now);
            }
        };

        let items: Vec<OrderItem> = plan
            .lines
            .iter()
            .map(|line| OrderItem {
                order_id: order.id,
                product_id: line.product.id,
                product_name: line.product.name.clone(),
                product_price: line.product.price,
                quantity: line.quantity,
                subtotal: round_currency(line.line_total()),
            })
            .collect();
        if let Err(e) = self.store.insert_order_items(items) {
            let message = format!("Failed to create order items: {e}");
            return self.abandon_order(due, scheduled_date, &order, &message, now);
        }

        let record = SubscriptionOrder {
            id: Uuid::new_v4(),
            subscription_id: sub.id,
            order_id: Some(order.id),
            scheduled_date,
            status: SubscriptionOrderStatus::Created,
            discount_amount: discount.discount_amount,
            original_total: Some(round_currency(plan.subtotal + delivery_fee)),
            final_total: Some(total),
            error_message: None,
            created_at: now,
        };
        if let Err(e) = self.store.insert_subscription_order(record) {
            let message = format!("Failed to record created order: {e}");
            return self.abandon_order(due, scheduled_date, &order, &message, now);
        }

        let next = next_delivery_date(scheduled_date, sub.frequency);
        if let Err(e) = self.store.update_next_delivery_date(sub.id, next, now) {
            error!(subscription_id = %sub.id, next = %next, error = %e, "Failed to advance delivery date");
        }

        if let Err(e) = recompute_tier(self.store, sub.user_id, tiers, now) {
            warn!(user_id = %sub.user_id, error = %e, "Failed to update tier assignment");
        }

        let notification = order_created_notification(
            sub.user_id,
            &sub.name,
            total,
            discount.discount_amount,
            serde_json::json!({
                "order_id": order.id,
                "subscription_id": sub.id,
                "discount": discount,
            }),
            now,
        );
        if let Err(e) = self.store.insert_notification(notification) {
            debug!(user_id = %sub.user_id, error = %e, "Order notification not stored");
        }

        self.events.emit(make_event(
            EventTopic::SubscriptionOrderCreated,
            sub.id.to_string(),
            Some(sub.user_id),
            serde_json::json!({
                "order_id": order.id,
                "scheduled_date": scheduled_date,
                "total": total,
                "discount_amount": discount.discount_amount,
            }),
        ));
        metrics::counter!("subscriptions.orders_created").increment(1);
        info!(
            subscription_id = %sub.id,
            order_id = %order.id,
            total = total,
            discount = discount.discount_amount,
            dropped_items = plan.dropped,
            "Subscription order created"
        );

        Materialized::Created { order }
    }
}
