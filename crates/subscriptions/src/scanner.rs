//! Selection of subscriptions whose delivery date has arrived.

use chrono::NaiveDate;
use storefront_core::subscription::DueSubscription;
use storefront_core::StorefrontResult;
use storefront_store::CommerceStore;
use tracing::info;

/// Why a due subscription cannot be materialized at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    NoItems,
    NoAddress,
}

impl Ineligibility {
    pub fn message(&self) -> &'static str {
        match self {
            Ineligibility::NoItems => "No items in subscription",
            Ineligibility::NoAddress => "No delivery address configured",
        }
    }
}

/// Active subscriptions with `next_delivery_date <= today`. A store failure
/// here is fatal to the whole batch.
pub fn find_due_subscriptions(
    store: &dyn CommerceStore,
    today: NaiveDate,
) -> StorefrontResult<Vec<DueSubscription>> {
    let due = store.due_subscriptions(today)?;
    info!(count = due.len(), today = %today, "Found subscriptions to process");
    Ok(due)
}

/// Structural checks made before any pricing.
pub fn check_eligibility(due: &DueSubscription) -> Result<(), Ineligibility> {
    if due.lines.is_empty() {
        return Err(Ineligibility::NoItems);
    }
    if due.subscription.address_id.is_none() || due.address.is_none() {
        return Err(Ineligibility::NoAddress);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storefront_core::subscription::{DeliveryFrequency, Subscription};
    use uuid::Uuid;

    fn due(address_id: Option<Uuid>) -> DueSubscription {
        DueSubscription {
            subscription: Subscription {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                name: "Empty".into(),
                frequency: DeliveryFrequency::Weekly,
                next_delivery_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                address_id,
                payment_method: "cod".into(),
                auto_confirm: false,
                is_active: true,
                discount_enabled: true,
                discount_percent: None,
                created_at: Utc::now(),
            },
            lines: vec![],
            address: None,
        }
    }

    #[test]
    fn test_no_items_checked_first() {
        assert_eq!(check_eligibility(&due(None)), Err(Ineligibility::NoItems));
    }

    #[test]
    fn test_unresolvable_address() {
        let mut d = due(Some(Uuid::new_v4()));
        d.lines.push(storefront_core::subscription::SubscriptionLine {
            item: storefront_core::subscription::SubscriptionItem {
                subscription_id: d.subscription.id,
                product_id: 1,
                quantity: 1,
            },
            product: None,
        });
        // Address id set but the row is gone.
        assert_eq!(check_eligibility(&d), Err(Ineligibility::NoAddress));
    }
}
