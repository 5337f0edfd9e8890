//! In-process periodic triggers for the storefront jobs.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::Arc;
use storefront_promotions::FlashSaleScheduler;
use storefront_subscriptions::{ReminderJob, SubscriptionProcessor};
use tracing::{error, info};

/// Time from `now` until the next `hour:00` UTC. A run hour of exactly `now`
/// waits a full day; hours above 23 are treated as 0.
pub fn until_next_run(now: DateTime<Utc>, hour: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now { today } else { today + Duration::days(1) };
    next - now
}

fn std_duration(d: Duration) -> std::time::Duration {
    d.to_std().unwrap_or(std::time::Duration::ZERO)
}

/// Run both daily subscription jobs for the current UTC date.
pub async fn run_daily(processor: &SubscriptionProcessor, reminders: &ReminderJob) {
    let now = Utc::now();
    let today = now.date_naive();
    match processor.run(today, now) {
        Ok(summary) => info!(
            processed = summary.processed,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            "Scheduled subscription run finished"
        ),
        Err(e) => error!(error = %e, "Scheduled subscription run failed"),
    }
    match reminders.run(today, now).await {
        Ok(summary) => info!(total = summary.total, sent = summary.sent, "Scheduled reminder run finished"),
        Err(e) => error!(error = %e, "Scheduled reminder run failed"),
    }
}

pub fn spawn_flash_sale_ticks(scheduler: Arc<FlashSaleScheduler>, every_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(every_secs.max(1)));
        loop {
            interval.tick().await;
            scheduler.tick(Utc::now()).await;
        }
    });
}

pub fn spawn_daily_jobs(
    processor: Arc<SubscriptionProcessor>,
    reminders: Arc<ReminderJob>,
    run_hour_utc: u32,
) {
    tokio::spawn(async move {
        loop {
            let wait = until_next_run(Utc::now(), run_hour_utc);
            info!(wait_secs = wait.num_seconds(), hour = run_hour_utc, "Next daily subscription run scheduled");
            tokio::time::sleep(std_duration(wait)).await;
            run_daily(&processor, &reminders).await;
        }
    });
}

pub fn spawn_cache_maintenance(processor: Arc<SubscriptionProcessor>, every_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(every_secs.max(1)));
        loop {
            interval.tick().await;
            processor.evict_expired(Utc::now());
        }
    });
}
