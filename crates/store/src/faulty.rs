//! Fault-injecting wrapper around `MemoryStore` for exercising the jobs'
//! failure isolation.

use crate::memory::MemoryStore;
use crate::traits::CommerceStore;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use storefront_core::catalog::{NewOrder, Order, OrderItem, Product, ProductId};
use storefront_core::notification::{Notification, PushSubscription};
use storefront_core::promotion::ScheduledFlashSale;
use storefront_core::subscription::{
    DiscountSettings, DueSubscription, SubscriptionOrder, SubscriptionTier, TierAssignment,
};
use storefront_core::{StorefrontError, StorefrontResult};
use uuid::Uuid;

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    DueSubscriptions,
    SubscriptionsDueOn,
    UpdateNextDeliveryDate,
    SubscriptionOrdersFor,
    InsertSubscriptionOrder,
    SubscriptionTiers,
    DiscountSettings,
    TierAssignment,
    InsertOrder,
    InsertOrderItems,
    CancelOrder,
    InsertNotification,
    ActiveFlashSales,
    SetFlashSaleFlags,
    DeactivateFlashSale,
    MarkFlashSaleNotified,
    PushSubscriptions,
}

/// Delegates to a `MemoryStore`, failing selected operations with
/// `StorefrontError::Store`.
pub struct FaultyStore {
    inner: MemoryStore,
    /// `None` fails every call, `Some(n)` fails the next `n` calls.
    faults: Mutex<HashMap<StoreOp, Option<u32>>>,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Fail every call to `op` until `heal`.
    pub fn fail(&self, op: StoreOp) {
        self.faults.lock().insert(op, None);
    }

    /// Fail the next `times` calls to `op`.
    pub fn fail_times(&self, op: StoreOp, times: u32) {
        self.faults.lock().insert(op, Some(times));
    }

    pub fn heal(&self, op: StoreOp) {
        self.faults.lock().remove(&op);
    }

    fn check(&self, op: StoreOp) -> StorefrontResult<()> {
        let mut faults = self.faults.lock();
        let exhausted = match faults.get_mut(&op) {
            None => return Ok(()),
            Some(None) => false,
            Some(Some(remaining)) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
        };
        if exhausted {
            faults.remove(&op);
        }
        Err(StorefrontError::store(format!("{op:?} unavailable")))
    }
}

impl CommerceStore for FaultyStore {
    fn due_subscriptions(&self, today: NaiveDate) -> StorefrontResult<Vec<DueSubscription>> {
        self.check(StoreOp::DueSubscriptions)?;
        self.inner.due_subscriptions(today)
    }

    fn subscriptions_due_on(&self, date: NaiveDate) -> StorefrontResult<Vec<DueSubscription>> {
        self.check(StoreOp::SubscriptionsDueOn)?;
        self.inner.subscriptions_due_on(date)
    }

    fn get_subscription(&self, id: Uuid) -> StorefrontResult<Option<DueSubscription>> {
        self.inner.get_subscription(id)
    }

    fn update_next_delivery_date(
        &self,
        subscription_id: Uuid,
        next: NaiveDate,
        now: DateTime<Utc>,
    ) -> StorefrontResult<()> {
        self.check(StoreOp::UpdateNextDeliveryDate)?;
        self.inner.update_next_delivery_date(subscription_id, next, now)
    }

    fn subscription_orders_for(
        &self,
        subscription_id: Uuid,
        scheduled_date: NaiveDate,
    ) -> StorefrontResult<Vec<SubscriptionOrder>> {
        self.check(StoreOp::SubscriptionOrdersFor)?;
        self.inner.subscription_orders_for(subscription_id, scheduled_date)
    }

    fn insert_subscription_order(&self, record: SubscriptionOrder) -> StorefrontResult<()> {
        self.check(StoreOp::InsertSubscriptionOrder)?;
        self.inner.insert_subscription_order(record)
    }

    fn subscription_spending(&self, user_id: Uuid) -> StorefrontResult<f64> {
        self.inner.subscription_spending(user_id)
    }

    fn subscription_tiers(&self) -> StorefrontResult<Vec<SubscriptionTier>> {
        self.check(StoreOp::SubscriptionTiers)?;
        self.inner.subscription_tiers()
    }

    fn discount_settings(&self) -> StorefrontResult<Option<DiscountSettings>> {
        self.check(StoreOp::DiscountSettings)?;
        self.inner.discount_settings()
    }

    fn tier_assignment(&self, user_id: Uuid) -> StorefrontResult<Option<TierAssignment>> {
        self.check(StoreOp::TierAssignment)?;
        self.inner.tier_assignment(user_id)
    }

    fn upsert_tier_assignment(&self, assignment: TierAssignment) -> StorefrontResult<()> {
        self.inner.upsert_tier_assignment(assignment)
    }

    fn insert_order(&self, order: NewOrder, now: DateTime<Utc>) -> StorefrontResult<Order> {
        self.check(StoreOp::InsertOrder)?;
        self.inner.insert_order(order, now)
    }

    fn insert_order_items(&self, items: Vec<OrderItem>) -> StorefrontResult<()> {
        self.check(StoreOp::InsertOrderItems)?;
        self.inner.insert_order_items(items)
    }

    fn cancel_order(&self, order_id: Uuid, now: DateTime<Utc>) -> StorefrontResult<()> {
        self.check(StoreOp::CancelOrder)?;
        self.inner.cancel_order(order_id, now)
    }

    fn insert_notification(&self, notification: Notification) -> StorefrontResult<()> {
        self.check(StoreOp::InsertNotification)?;
        self.inner.insert_notification(notification)
    }

    fn active_flash_sales(&self) -> StorefrontResult<Vec<ScheduledFlashSale>> {
        self.check(StoreOp::ActiveFlashSales)?;
        self.inner.active_flash_sales()
    }

    fn products(&self, ids: &[ProductId]) -> StorefrontResult<Vec<Product>> {
        self.inner.products(ids)
    }

    fn set_flash_sale_flags(
        &self,
        product_ids: &[ProductId],
        on_sale: bool,
        now: DateTime<Utc>,
    ) -> StorefrontResult<()> {
        self.check(StoreOp::SetFlashSaleFlags)?;
        self.inner.set_flash_sale_flags(product_ids, on_sale, now)
    }

    fn deactivate_flash_sale(&self, id: i64) -> StorefrontResult<()> {
        self.check(StoreOp::DeactivateFlashSale)?;
        self.inner.deactivate_flash_sale(id)
    }

    fn mark_flash_sale_notified(&self, id: i64) -> StorefrontResult<()> {
        self.check(StoreOp::MarkFlashSaleNotified)?;
        self.inner.mark_flash_sale_notified(id)
    }

    fn push_subscriptions(&self) -> StorefrontResult<Vec<PushSubscription>> {
        self.check(StoreOp::PushSubscriptions)?;
        self.inner.push_subscriptions()
    }

    fn push_subscriptions_for(&self, user_id: Uuid) -> StorefrontResult<Vec<PushSubscription>> {
        self.check(StoreOp::PushSubscriptions)?;
        self.inner.push_subscriptions_for(user_id)
    }
}
