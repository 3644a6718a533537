use serde::Deserialize;
use std::{error::Error, fs};

pub const DEFAULT_CURRENCY_EPSILON: f64 = 0.01;

fn default_currency_epsilon() -> f64 {
    DEFAULT_CURRENCY_EPSILON
}

fn default_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommonConfig {
    pub project_name: String,
    #[serde(default)]
    pub tax_rate: f64,
    #[serde(default = "default_currency_epsilon")]
    pub currency_epsilon: f64,
    #[serde(default)]
    pub seed_demo_data: bool,
    #[serde(default)]
    pub generated_customers: usize,
    #[serde(default)]
    pub generated_products: usize,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            tax_rate: 0.0,
            currency_epsilon: DEFAULT_CURRENCY_EPSILON,
            seed_demo_data: false,
            generated_customers: 0,
            generated_products: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    // 100 requests per 15 minutes per client
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BackendConfig {
    pub server_address: String,
    pub log_level: String,
    #[serde(default)]
    pub allowed_origin: Option<String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Push delivery settings. The server key is read from `GROCER_PUSH_SERVER_KEY`;
/// without an endpoint and a key pushes are logged only.
#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    #[serde(default)]
    pub push_endpoint: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            push_endpoint: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Generative-text settings. The API key is read from `GROCER_INSIGHT_API_KEY`.
#[derive(Debug, Deserialize, Clone)]
pub struct InsightConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub common: CommonConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub insights: InsightConfig,
}

impl Config {
    pub fn load(config_path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let contents = fs::read_to_string(config_path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let config = serde_yml::from_str(contents)?;
        Ok(config)
    }
}
