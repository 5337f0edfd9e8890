use crate::subscription::DiscountSettings;
use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `STOREFRONT__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub subscriptions: SubscriptionJobConfig,
    #[serde(default)]
    pub discount: DiscountConfig,
    #[serde(default)]
    pub flash_sales: FlashSaleConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "storefront-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            subscriptions: SubscriptionJobConfig::default(),
            discount: DiscountConfig::default(),
            flash_sales: FlashSaleConfig::default(),
            push: PushConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

// ─── Subscription Job Config ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionJobConfig {
    /// Flat delivery fee charged below the free-delivery threshold.
    #[serde(default = "default_delivery_fee")]
    pub delivery_fee: f64,
    /// Discounted total at or above which delivery is free.
    #[serde(default = "default_free_delivery_threshold")]
    pub free_delivery_threshold: f64,
    /// How long the tier table and discount settings are reused between reads.
    #[serde(default = "default_reference_cache_ttl_secs")]
    pub reference_cache_ttl_secs: u64,
    /// UTC hour at which the in-process scheduler runs the daily jobs.
    #[serde(default = "default_run_hour_utc")]
    pub run_hour_utc: u32,
}

fn default_delivery_fee() -> f64 { 30.0 }
fn default_free_delivery_threshold() -> f64 { 200.0 }
fn default_reference_cache_ttl_secs() -> u64 { 300 }
fn default_run_hour_utc() -> u32 { 0 }

impl Default for SubscriptionJobConfig {
    fn default() -> Self {
        Self {
            delivery_fee: default_delivery_fee(),
            free_delivery_threshold: default_free_delivery_threshold(),
            reference_cache_ttl_secs: default_reference_cache_ttl_secs(),
            run_hour_utc: default_run_hour_utc(),
        }
    }
}

// ─── Discount Config ────────────────────────────────────────────────────────

/// Fallback discount settings, used when the store has no settings row.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscountConfig {
    #[serde(default = "default_discount_percent")]
    pub default_discount_percent: f64,
    #[serde(default = "default_max_discount_percent")]
    pub max_discount_percent: f64,
    #[serde(default = "default_loyalty_bonus_enabled")]
    pub loyalty_bonus_enabled: bool,
    #[serde(default = "default_loyalty_bonus_percent")]
    pub loyalty_bonus_percent: f64,
    #[serde(default = "default_loyalty_bonus_max_months")]
    pub loyalty_bonus_max_months: u32,
    /// Tier name reported when a user has no tier assignment yet.
    #[serde(default = "default_fallback_tier_name")]
    pub fallback_tier_name: String,
}

fn default_discount_percent() -> f64 { 5.0 }
fn default_max_discount_percent() -> f64 { 15.0 }
fn default_loyalty_bonus_enabled() -> bool { true }
fn default_loyalty_bonus_percent() -> f64 { 2.0 }
fn default_loyalty_bonus_max_months() -> u32 { 3 }
fn default_fallback_tier_name() -> String { "Bronze".to_string() }

impl Default for DiscountConfig {
    fn default() -> Self {
        Self {
            default_discount_percent: default_discount_percent(),
            max_discount_percent: default_max_discount_percent(),
            loyalty_bonus_enabled: default_loyalty_bonus_enabled(),
            loyalty_bonus_percent: default_loyalty_bonus_percent(),
            loyalty_bonus_max_months: default_loyalty_bonus_max_months(),
            fallback_tier_name: default_fallback_tier_name(),
        }
    }
}

impl DiscountConfig {
    /// Settings substituted when the store holds no discount settings row.
    pub fn fallback_settings(&self) -> DiscountSettings {
        DiscountSettings {
            default_discount_percent: self.default_discount_percent,
            max_discount_percent: self.max_discount_percent,
            loyalty_bonus_enabled: self.loyalty_bonus_enabled,
            loyalty_bonus_percent: self.loyalty_bonus_percent,
            loyalty_bonus_max_months: self.loyalty_bonus_max_months,
        }
    }
}

// ─── Flash Sale Config ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FlashSaleConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_flash_sale_url")]
    pub landing_url: String,
    #[serde(default = "default_flash_sale_icon")]
    pub icon_url: String,
}

fn default_tick_interval_secs() -> u64 { 60 }
fn default_flash_sale_url() -> String { "/customer/promotions".to_string() }
fn default_flash_sale_icon() -> String { "/icons/flash-sale.png".to_string() }

impl Default for FlashSaleConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            landing_url: default_flash_sale_url(),
            icon_url: default_flash_sale_icon(),
        }
    }
}

// ─── Push Config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub vapid_public_key: Option<String>,
    #[serde(default)]
    pub vapid_private_key: Option<String>,
    #[serde(default = "default_push_subject")]
    pub subject: String,
    #[serde(default = "default_push_ttl_secs")]
    pub ttl_secs: u32,
    /// Per-endpoint request timeout.
    #[serde(default = "default_push_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_push_subject() -> String { "mailto:ops@storefront.local".to_string() }
fn default_push_ttl_secs() -> u32 { 86_400 }
fn default_push_timeout_secs() -> u64 { 10 }

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            vapid_public_key: None,
            vapid_private_key: None,
            subject: default_push_subject(),
            ttl_secs: default_push_ttl_secs(),
            timeout_secs: default_push_timeout_secs(),
        }
    }
}

impl PushConfig {
    /// Both VAPID keys must be present before anything is delivered.
    pub fn vapid_configured(&self) -> bool {
        matches!(
            (&self.vapid_public_key, &self.vapid_private_key),
            (Some(public), Some(private)) if !public.is_empty() && !private.is_empty()
        )
    }
}

// ─── Scheduler Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_maintenance_secs")]
    pub cache_maintenance_secs: u64,
}

fn default_scheduler_enabled() -> bool { true }
fn default_cache_maintenance_secs() -> u64 { 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            cache_maintenance_secs: default_cache_maintenance_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("STOREFRONT")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
