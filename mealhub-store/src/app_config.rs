use mealhub_catalog::PricingConfig;
use mealhub_shared::Masked;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payment: PaymentConfig,
    pub geolocation: GeolocationConfig,
    pub pricing: PricingConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Masked<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

/// `mock` swaps a provider for its in-process fake (local runs only)
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    #[default]
    Live,
    Mock,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    #[serde(default)]
    pub mode: ProviderMode,
    pub api_url: String,
    pub secret_key: Masked<String>,
    pub webhook_secret: Masked<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_seconds: i64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_currency() -> String { "eur".to_string() }
fn default_webhook_tolerance() -> i64 { mealhub_core::webhook::DEFAULT_TOLERANCE_SECONDS }
fn default_timeout_ms() -> u64 { 5_000 }

#[derive(Debug, Deserialize, Clone)]
pub struct GeolocationConfig {
    #[serde(default)]
    pub mode: ProviderMode,
    pub api_url: String,
    pub api_key: Masked<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_schedule_lead")]
    pub min_schedule_lead_minutes: i64,
    /// Window given to cookers created without one
    #[serde(default = "default_capacity_window")]
    pub default_order_capacity_window: u32,
    #[serde(default = "default_discovery_radius")]
    pub discovery_radius_km: f64,
}

fn default_schedule_lead() -> i64 { 60 }
fn default_capacity_window() -> u32 { 10 }
fn default_discovery_radius() -> f64 { 10.0 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // developer overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `MEALHUB__PAYMENT__SECRET_KEY=sk_live_...`
            .add_source(config::Environment::with_prefix("MEALHUB").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
