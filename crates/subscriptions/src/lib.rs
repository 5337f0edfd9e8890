//! Recurring subscription orders: cadence, due scan, order materialization,
//! the daily batch and day-before reminders.

#![warn(clippy::unwrap_used)]

pub mod cadence;
pub mod materializer;
pub mod processor;
pub mod reminders;
pub mod scanner;

pub use cadence::next_delivery_date;
pub use materializer::{plan_order, recompute_tier, Materialized, OrderMaterializer, OrderPlan};
pub use processor::{ProcessResult, ProcessStatus, ProcessSummary, ReferenceData, SubscriptionProcessor};
pub use reminders::{ReminderJob, ReminderResult, ReminderStatus, ReminderSummary};
pub use scanner::{check_eligibility, find_due_subscriptions, Ineligibility};
