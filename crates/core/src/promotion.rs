//! Scheduled flash sale windows.

use crate::catalog::ProductId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a scheduled sale at a given instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlashSalePhase {
    Scheduled,
    Live,
    Ended,
}

/// An admin-defined time-boxed promotion over a set of products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledFlashSale {
    pub id: i64,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub product_ids: Vec<ProductId>,
    /// Minutes before `start_time` at which the reminder goes out.
    pub notify_before: u32,
    /// False once the scheduler has closed the window. Never flips back.
    pub is_active: bool,
    pub notification_sent: bool,
}

impl ScheduledFlashSale {
    pub fn phase_at(&self, now: DateTime<Utc>) -> FlashSalePhase {
        if !self.is_active || now >= self.end_time {
            FlashSalePhase::Ended
        } else if now >= self.start_time {
            FlashSalePhase::Live
        } else {
            FlashSalePhase::Scheduled
        }
    }

    /// `[start_time - notify_before, start_time)`
    pub fn in_reminder_window(&self, now: DateTime<Utc>) -> bool {
        let notify_at = self.start_time - Duration::minutes(i64::from(self.notify_before));
        now >= notify_at && now < self.start_time
    }

    pub fn minutes_until_start(&self, now: DateTime<Utc>) -> i64 {
        let secs = (self.start_time - now).num_seconds();
        (secs as f64 / 60.0).round() as i64
    }
}
