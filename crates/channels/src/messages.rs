//! Wording and payload shapes for customer-facing messages.

use crate::web_push::{PushAction, PushPayload};
use chrono::{DateTime, Utc};
use storefront_core::config::FlashSaleConfig;
use storefront_core::notification::{Notification, NotificationKind};
use storefront_core::promotion::ScheduledFlashSale;
use uuid::Uuid;

fn baht(amount: f64) -> String {
    format!("฿{amount:.2}")
}

/// Inbox entry summarizing an automatic subscription order.
pub fn order_created_notification(
    user_id: Uuid,
    subscription_name: &str,
    total: f64,
    saved: f64,
    data: serde_json::Value,
    now: DateTime<Utc>,
) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        user_id,
        title: "Automatic order placed".to_string(),
        message: format!(
            "Order from \"{subscription_name}\" totals {} (you saved {})",
            baht(total),
            baht(saved)
        ),
        kind: NotificationKind::Subscription,
        data,
        created_at: now,
    }
}

/// Inbox entry sent the day before a subscription delivery.
pub fn delivery_reminder_notification(
    user_id: Uuid,
    subscription_id: Uuid,
    subscription_name: &str,
    item_count: usize,
    estimated_total: f64,
    now: DateTime<Utc>,
) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        user_id,
        title: "Delivery tomorrow".to_string(),
        message: format!(
            "\"{subscription_name}\" ({item_count} items, {}) will be ordered tomorrow. You can still edit or skip it.",
            baht(estimated_total)
        ),
        kind: NotificationKind::SubscriptionReminder,
        data: serde_json::json!({
            "subscription_id": subscription_id,
            "total": estimated_total,
            "item_count": item_count,
        }),
        created_at: now,
    }
}

pub fn delivery_reminder_push(subscription_id: Uuid, subscription_name: &str) -> PushPayload {
    PushPayload {
        title: "Delivery tomorrow".to_string(),
        body: format!("\"{subscription_name}\" will be ordered tomorrow"),
        icon: Some("/icons/icon-192x192.png".to_string()),
        badge: Some("/icons/badge-72x72.png".to_string()),
        tag: Some(format!("subscription-{subscription_id}")),
        data: serde_json::json!({
            "url": format!("/customer/subscriptions/{subscription_id}"),
            "subscription_id": subscription_id,
        }),
        actions: vec![
            PushAction { action: "view".into(), title: "View".into() },
            PushAction { action: "skip".into(), title: "Skip this time".into() },
        ],
    }
}

pub fn flash_sale_reminder_push(
    sale: &ScheduledFlashSale,
    minutes_until_start: i64,
    config: &FlashSaleConfig,
) -> PushPayload {
    PushPayload {
        title: "Flash sale starting soon!".to_string(),
        body: format!("{} starts in {minutes_until_start} minutes. Don't miss it!", sale.name),
        icon: Some(config.icon_url.clone()),
        badge: Some("/icons/badge.png".to_string()),
        tag: Some(format!("flash-sale-{}", sale.id)),
        data: serde_json::json!({
            "type": "flash_sale",
            "sale_id": sale.id,
            "url": config.landing_url,
        }),
        actions: vec![
            PushAction { action: "view".into(), title: "View products".into() },
            PushAction { action: "dismiss".into(), title: "Close".into() },
        ],
    }
}
