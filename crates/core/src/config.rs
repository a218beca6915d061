use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `LIYAQA__` (sections separated by `__`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub marketing: MarketingConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Bearer token accepted on `/api/platform/*` routes.
    #[serde(default = "default_platform_admin_token")]
    pub platform_admin_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketingConfig {
    #[serde(default = "default_step_interval_secs")]
    pub step_interval_secs: u64,
    #[serde(default = "default_step_batch_size")]
    pub step_batch_size: usize,
    /// Offset of the club's local time from UTC, used for daily triggers.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// Local hour at which the daily trigger pass runs.
    #[serde(default = "default_daily_trigger_hour")]
    pub daily_trigger_hour: u32,
    #[serde(default = "default_club_name")]
    pub club_name: String,
    #[serde(default = "default_tracking_base_url")]
    pub tracking_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_vat_rate")]
    pub vat_rate: f64,
    #[serde(default = "default_invoice_due_days")]
    pub invoice_due_days: i64,
    #[serde(default = "default_seller_name")]
    pub seller_name: String,
    #[serde(default = "default_vat_number")]
    pub vat_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_api_key_prefix")]
    pub api_key_prefix: String,
    #[serde(default = "default_impersonation_max_minutes")]
    pub impersonation_max_minutes: i64,
    #[serde(default = "default_invite_ttl_days")]
    pub invite_ttl_days: i64,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_platform_admin_token() -> String {
    "liyaqa-platform-dev-token".to_string()
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_step_interval_secs() -> u64 {
    300
}
fn default_step_batch_size() -> usize {
    100
}
fn default_utc_offset_hours() -> i32 {
    3
}
fn default_daily_trigger_hour() -> u32 {
    7
}
fn default_club_name() -> String {
    "Liyaqa".to_string()
}
fn default_tracking_base_url() -> String {
    "http://localhost:8080/api/marketing/track".to_string()
}
fn default_vat_rate() -> f64 {
    15.0
}
fn default_invoice_due_days() -> i64 {
    7
}
fn default_seller_name() -> String {
    "Liyaqa Fitness".to_string()
}
fn default_vat_number() -> String {
    "300000000000003".to_string()
}
fn default_api_key_prefix() -> String {
    "lq_".to_string()
}
fn default_impersonation_max_minutes() -> i64 {
    60
}
fn default_invite_ttl_days() -> i64 {
    7
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            platform_admin_token: default_platform_admin_token(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for MarketingConfig {
    fn default() -> Self {
        Self {
            step_interval_secs: default_step_interval_secs(),
            step_batch_size: default_step_batch_size(),
            utc_offset_hours: default_utc_offset_hours(),
            daily_trigger_hour: default_daily_trigger_hour(),
            club_name: default_club_name(),
            tracking_base_url: default_tracking_base_url(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            vat_rate: default_vat_rate(),
            invoice_due_days: default_invoice_due_days(),
            seller_name: default_seller_name(),
            vat_number: default_vat_number(),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_key_prefix: default_api_key_prefix(),
            impersonation_max_minutes: default_impersonation_max_minutes(),
            invite_ttl_days: default_invite_ttl_days(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            marketing: MarketingConfig::default(),
            billing: BillingConfig::default(),
            platform: PlatformConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LIYAQA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8080);
        assert_eq!(config.marketing.step_interval_secs, 300);
        assert_eq!(config.marketing.utc_offset_hours, 3);
        assert_eq!(config.billing.vat_rate, 15.0);
        assert_eq!(config.platform.api_key_prefix, "lq_");
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "api": { "http_port": 9000 },
            "billing": { "vat_rate": 5.0 }
        }))
        .unwrap();
        assert_eq!(config.api.http_port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.billing.vat_rate, 5.0);
        assert_eq!(config.billing.invoice_due_days, 7);
        assert_eq!(config.node_id, "node-01");
    }
}
