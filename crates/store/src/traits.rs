use chrono::{DateTime, NaiveDate, Utc};
use storefront_core::catalog::{NewOrder, Order, OrderItem, Product, ProductId};
use storefront_core::notification::{Notification, PushSubscription};
use storefront_core::promotion::ScheduledFlashSale;
use storefront_core::subscription::{
    DiscountSettings, DueSubscription, SubscriptionOrder, SubscriptionTier, TierAssignment,
};
use storefront_core::StorefrontResult;
use uuid::Uuid;

/// Logical operations the jobs perform against the relational backend.
///
/// Every method may fail with `StorefrontError::Store`; callers decide
/// whether a failure is per-item or fatal to the batch.
pub trait CommerceStore: Send + Sync {
    // ─── Subscriptions ─────────────────────────────────────────────────────

    /// Active subscriptions with `next_delivery_date <= today`, joined with
    /// items, products and delivery address.
    fn due_subscriptions(&self, today: NaiveDate) -> StorefrontResult<Vec<DueSubscription>>;

    /// Active subscriptions whose next delivery falls exactly on `date`.
    fn subscriptions_due_on(&self, date: NaiveDate) -> StorefrontResult<Vec<DueSubscription>>;

    fn get_subscription(&self, id: Uuid) -> StorefrontResult<Option<DueSubscription>>;

    fn update_next_delivery_date(
        &self,
        subscription_id: Uuid,
        next: NaiveDate,
        now: DateTime<Utc>,
    ) -> StorefrontResult<()>;

    // ─── Audit trail ───────────────────────────────────────────────────────

    fn subscription_orders_for(
        &self,
        subscription_id: Uuid,
        scheduled_date: NaiveDate,
    ) -> StorefrontResult<Vec<SubscriptionOrder>>;

    fn insert_subscription_order(&self, record: SubscriptionOrder) -> StorefrontResult<()>;

    /// Sum of order totals behind `created` audit records of the user's subscriptions.
    fn subscription_spending(&self, user_id: Uuid) -> StorefrontResult<f64>;

    // ─── Tiers & settings ──────────────────────────────────────────────────

    fn subscription_tiers(&self) -> StorefrontResult<Vec<SubscriptionTier>>;

    /// `None` when the settings row has never been written.
    fn discount_settings(&self) -> StorefrontResult<Option<DiscountSettings>>;

    fn tier_assignment(&self, user_id: Uuid) -> StorefrontResult<Option<TierAssignment>>;

    fn upsert_tier_assignment(&self, assignment: TierAssignment) -> StorefrontResult<()>;

    // ─── Orders & notifications ────────────────────────────────────────────

    fn insert_order(&self, order: NewOrder, now: DateTime<Utc>) -> StorefrontResult<Order>;

    fn insert_order_items(&self, items: Vec<OrderItem>) -> StorefrontResult<()>;

    /// Mark an order `cancelled`. Unknown ids are `NotFound`.
    fn cancel_order(&self, order_id: Uuid, now: DateTime<Utc>) -> StorefrontResult<()>;

    fn insert_notification(&self, notification: Notification) -> StorefrontResult<()>;

    // ─── Flash sales ───────────────────────────────────────────────────────

    /// Schedules still marked active.
    fn active_flash_sales(&self) -> StorefrontResult<Vec<ScheduledFlashSale>>;

    fn products(&self, ids: &[ProductId]) -> StorefrontResult<Vec<Product>>;

    /// Bulk-set `is_flash_sale` and `flash_sale_order` on the listed products.
    fn set_flash_sale_flags(
        &self,
        product_ids: &[ProductId],
        on_sale: bool,
        now: DateTime<Utc>,
    ) -> StorefrontResult<()>;

    fn deactivate_flash_sale(&self, id: i64) -> StorefrontResult<()>;

    fn mark_flash_sale_notified(&self, id: i64) -> StorefrontResult<()>;

    // ─── Push ──────────────────────────────────────────────────────────────

    fn push_subscriptions(&self) -> StorefrontResult<Vec<PushSubscription>>;

    fn push_subscriptions_for(&self, user_id: Uuid) -> StorefrontResult<Vec<PushSubscription>>;
}
