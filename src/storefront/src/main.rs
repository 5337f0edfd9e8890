//! Storefront jobs: subscription orders, delivery reminders and flash sales.
//!
//! Serves the job triggers over HTTP and, unless disabled, runs them on an
//! in-process schedule.

mod scheduler;

use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Instant;
use storefront_api::{ApiServer, AppState};
use storefront_channels::{PushGateway, WebPushProvider};
use storefront_core::config::AppConfig;
use storefront_core::event_bus::{EventBus, EventSink, EventTopic};
use storefront_promotions::FlashSaleScheduler;
use storefront_store::{CommerceStore, MemoryStore};
use storefront_subscriptions::{ReminderJob, SubscriptionProcessor};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Job {
    Subscriptions,
    Reminders,
    FlashSales,
}

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Subscription orders, delivery reminders and flash sale scheduling")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "STOREFRONT__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "STOREFRONT__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Serve the HTTP triggers only; an external runner calls them.
    #[arg(long, default_value_t = false)]
    no_scheduler: bool,

    /// Run one job, print its JSON summary and exit.
    #[arg(long, value_enum)]
    run_once: Option<Job>,
}

const TOPICS: [EventTopic; 5] = [
    EventTopic::SubscriptionOrderCreated,
    EventTopic::SubscriptionOrderFailed,
    EventTopic::FlashSaleActivated,
    EventTopic::FlashSaleEnded,
    EventTopic::FlashSaleReminderSent,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Storefront starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if cli.no_scheduler {
        config.scheduler.enabled = false;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        scheduler = config.scheduler.enabled,
        run_hour_utc = config.subscriptions.run_hour_utc,
        "Configuration loaded"
    );

    // Production: swap in the hosted backend client behind CommerceStore.
    let store: Arc<dyn CommerceStore> =
        Arc::new(MemoryStore::with_demo_data(chrono::Utc::now().date_naive()));

    let bus = Arc::new(EventBus::new());
    for topic in TOPICS {
        bus.subscribe(topic, |event| {
            info!(
                topic = event.topic.as_str(),
                subject = %event.subject_id,
                payload = %event.payload,
                "Domain event"
            );
        });
    }
    let events: Arc<dyn EventSink> = bus;

    let gateway: Arc<dyn PushGateway> = Arc::new(WebPushProvider::new(config.push.clone())?);

    let processor = Arc::new(SubscriptionProcessor::new(
        store.clone(),
        events.clone(),
        config.subscriptions.clone(),
        config.discount.clone(),
    ));
    let reminders = Arc::new(ReminderJob::new(store.clone(), gateway.clone()));
    let flash_sales = Arc::new(FlashSaleScheduler::new(
        store,
        gateway,
        events,
        config.flash_sales.clone(),
    ));

    if let Some(job) = cli.run_once {
        let now = chrono::Utc::now();
        let today = now.date_naive();
        let summary = match job {
            Job::Subscriptions => serde_json::to_value(processor.run(today, now)?)?,
            Job::Reminders => serde_json::to_value(reminders.run(today, now).await?)?,
            Job::FlashSales => serde_json::to_value(flash_sales.tick(now).await)?,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let api_server = ApiServer::new(
        config.clone(),
        AppState {
            subscriptions: processor.clone(),
            reminders: reminders.clone(),
            flash_sales: flash_sales.clone(),
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
        },
    );

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    if config.scheduler.enabled {
        scheduler::spawn_flash_sale_ticks(flash_sales, config.flash_sales.tick_interval_secs);
        scheduler::spawn_daily_jobs(
            processor.clone(),
            reminders,
            config.subscriptions.run_hour_utc,
        );
        info!("In-process scheduler started");
    } else {
        info!("Scheduler disabled, waiting for external job triggers");
    }

    scheduler::spawn_cache_maintenance(processor, config.scheduler.cache_maintenance_secs);

    info!("Storefront is ready to serve traffic");

    api_server.start_http().await?;

    Ok(())
}
