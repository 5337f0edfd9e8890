//! Subscription loyalty: tier resolution by lifetime spending and the
//! stacked base + tier + tenure discount.

pub mod discount;
pub mod tier;

pub use discount::{calculate_discount, DiscountBreakdown, DiscountInput, DiscountResult};
pub use tier::{resolve_tier, resolve_tier_or_lowest, tier_progress, TierProgress};
