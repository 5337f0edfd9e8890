//! Recurring subscription domain types: cadence, items, loyalty tiers,
//! discount settings, and the per-attempt audit trail.

use crate::catalog::{Address, Product, ProductId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Cadence ────────────────────────────────────────────────────────────────

/// Recurring delivery interval of a subscription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryFrequency {
    Weekly,
    Biweekly,
    Monthly,
    /// Any value the store holds that is not one of the above.
    #[serde(other)]
    Unrecognized,
}

impl Default for DeliveryFrequency {
    fn default() -> Self {
        DeliveryFrequency::Weekly
    }
}

// ─── Subscription ───────────────────────────────────────────────────────────

/// A user's recurring order template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub frequency: DeliveryFrequency,
    pub next_delivery_date: NaiveDate,
    pub address_id: Option<Uuid>,
    pub payment_method: String,
    pub auto_confirm: bool,
    pub is_active: bool,
    pub discount_enabled: bool,
    /// Unset or zero falls back to the global default percent.
    pub discount_percent: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// One product line of a subscription, unique per (subscription, product).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub subscription_id: Uuid,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A subscription item joined with its product row (absent if the product
/// was deleted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionLine {
    pub item: SubscriptionItem,
    pub product: Option<Product>,
}

/// A subscription eagerly joined with its items, products and address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueSubscription {
    pub subscription: Subscription,
    pub lines: Vec<SubscriptionLine>,
    pub address: Option<Address>,
}

// ─── Tiers ──────────────────────────────────────────────────────────────────

/// Loyalty bracket unlocked by cumulative subscription spending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionTier {
    pub id: i64,
    pub name: String,
    pub min_spending: f64,
    /// Extra discount percentage points granted by this tier.
    pub discount_bonus: f64,
}

/// The tier a user currently holds. One row per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierAssignment {
    pub user_id: Uuid,
    pub tier_id: i64,
    pub total_spending: f64,
    pub updated_at: DateTime<Utc>,
}

// ─── Discount Settings ──────────────────────────────────────────────────────

/// Global subscription discount rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountSettings {
    pub default_discount_percent: f64,
    pub max_discount_percent: f64,
    pub loyalty_bonus_enabled: bool,
    /// Bonus percentage points per whole month subscribed.
    pub loyalty_bonus_percent: f64,
    pub loyalty_bonus_max_months: u32,
}

impl Default for DiscountSettings {
    fn default() -> Self {
        Self {
            default_discount_percent: 5.0,
            max_discount_percent: 15.0,
            loyalty_bonus_enabled: true,
            loyalty_bonus_percent: 2.0,
            loyalty_bonus_max_months: 3,
        }
    }
}

// ─── Audit Trail ────────────────────────────────────────────────────────────

/// Outcome of one processing attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionOrderStatus {
    Created,
    Failed,
    Skipped,
}

/// Append-only audit record: one row per processing attempt for one
/// subscription on one scheduled date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionOrder {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub order_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub status: SubscriptionOrderStatus,
    pub discount_amount: f64,
    pub original_total: Option<f64>,
    pub final_total: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionOrder {
    /// Audit row for an attempt that produced no order.
    pub fn failed(
        subscription_id: Uuid,
        scheduled_date: NaiveDate,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::without_order(
            subscription_id,
            scheduled_date,
            SubscriptionOrderStatus::Failed,
            message,
            now,
        )
    }

    pub fn skipped(
        subscription_id: Uuid,
        scheduled_date: NaiveDate,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::without_order(
            subscription_id,
            scheduled_date,
            SubscriptionOrderStatus::Skipped,
            message,
            now,
        )
    }

    fn without_order(
        subscription_id: Uuid,
        scheduled_date: NaiveDate,
        status: SubscriptionOrderStatus,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            order_id: None,
            scheduled_date,
            status,
            discount_amount: 0.0,
            original_total: None,
            final_total: None,
            error_message: Some(message.into()),
            created_at: now,
        }
    }
}
