//! Subscription discount: base percent + tier bonus + tenure bonus, capped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storefront_core::catalog::round_currency;
use storefront_core::subscription::DiscountSettings;
use tracing::debug;

/// Tier name reported when the subscription discount is switched off.
pub const NO_TIER: &str = "None";

const DAYS_PER_MONTH: i64 = 30;

/// Everything the calculator needs about one subscription order.
#[derive(Debug, Clone)]
pub struct DiscountInput {
    pub subtotal: f64,
    pub discount_enabled: bool,
    /// Unset or zero falls back to `settings.default_discount_percent`.
    pub base_discount_percent: Option<f64>,
    pub tier_bonus_percent: f64,
    pub tier_name: String,
    pub subscription_created_at: DateTime<Utc>,
}

/// Each component of the applied percentage, kept for audit and display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountBreakdown {
    pub base_discount: f64,
    pub tier_bonus: f64,
    pub loyalty_bonus: f64,
    pub tier_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountResult {
    pub discount_percent: f64,
    pub discount_amount: f64,
    pub final_total: f64,
    pub discount_breakdown: DiscountBreakdown,
}

impl DiscountResult {
    fn none(subtotal: f64) -> Self {
        Self {
            discount_percent: 0.0,
            discount_amount: 0.0,
            final_total: subtotal,
            discount_breakdown: DiscountBreakdown {
                base_discount: 0.0,
                tier_bonus: 0.0,
                loyalty_bonus: 0.0,
                tier_name: NO_TIER.to_string(),
            },
        }
    }
}

/// Whole 30-day periods between `created_at` and `now`, never negative.
pub fn months_elapsed(created_at: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let days = (now - created_at).num_days();
    u32::try_from(days / DAYS_PER_MONTH).unwrap_or(0)
}

/// Tenure bonus: `min(months, max_months) * percent`, zero when disabled.
pub fn loyalty_bonus(settings: &DiscountSettings, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    if !settings.loyalty_bonus_enabled {
        return 0.0;
    }
    let months = months_elapsed(created_at, now).min(settings.loyalty_bonus_max_months);
    f64::from(months) * settings.loyalty_bonus_percent
}

pub fn calculate_discount(
    input: &DiscountInput,
    settings: &DiscountSettings,
    now: DateTime<Utc>,
) -> DiscountResult {
    if !input.discount_enabled {
        return DiscountResult::none(input.subtotal);
    }

    let base = input
        .base_discount_percent
        .filter(|p| *p > 0.0)
        .unwrap_or(settings.default_discount_percent);
    let loyalty = loyalty_bonus(settings, input.subscription_created_at, now);
    let raw = base + input.tier_bonus_percent + loyalty;
    let percent = raw.min(settings.max_discount_percent);

    let amount = round_currency(input.subtotal * percent / 100.0);
    let final_total = input.subtotal - amount;

    if raw > percent {
        metrics::counter!("loyalty.discount.capped").increment(1);
    }
    debug!(
        subtotal = input.subtotal,
        base = base,
        tier_bonus = input.tier_bonus_percent,
        loyalty_bonus = loyalty,
        percent = percent,
        amount = amount,
        "Subscription discount calculated"
    );

    DiscountResult {
        discount_percent: percent,
        discount_amount: amount,
        final_total,
        discount_breakdown: DiscountBreakdown {
            base_discount: base,
            tier_bonus: input.tier_bonus_percent,
            loyalty_bonus: loyalty,
            tier_name: input.tier_name.clone(),
        },
    }
}
