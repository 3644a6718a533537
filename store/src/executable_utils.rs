use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{error::Error, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use http::header;
use common::config::Config;

use crate::api::{AppState, ServiceSettings, router};
use crate::billing::Pricing;
use crate::insights::{HttpInsightProvider, InsightProvider, NoopInsightProvider};
use crate::notifier::{HttpPushProvider, LoggingPushProvider, PushProvider};
use crate::rate_limit::RateLimiter;
use crate::storage::Storage;

pub const PUSH_SERVER_KEY_VAR: &str = "GROCER_PUSH_SERVER_KEY";
pub const INSIGHT_API_KEY_VAR: &str = "GROCER_INSIGHT_API_KEY";

const DEFAULT_INSIGHT_MODEL: &str = "gemini-2.5-flash";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "target/debug/config/total_config.yaml")]
    pub config: String,
}

pub fn initialize_executable() -> Result<Config, Box<dyn Error + Send + Sync>> {
    // Secrets may live in a local .env file
    if let Ok(path) = dotenvy::dotenv() {
        println!("Loaded environment from {:?}", path);
    }

    let args = Args::parse();
    println!("Loading config from: {}", args.config);
    let config = Config::load(&args.config)?;
    Ok(config)
}

pub fn initialize_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    // A second call (tests, multiple binaries in one process) is a no-op
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Installs the global Prometheus recorder. Returns `None` if one is already
/// installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics recorder not installed");
            None
        }
    }
}

fn secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Push provider from config: HTTP when both an endpoint and a server key are
/// available, logging otherwise.
pub fn push_provider(config: &Config) -> Result<Arc<dyn PushProvider>, Box<dyn Error + Send + Sync>> {
    let timeout = Duration::from_millis(config.notifications.timeout_ms);
    match (config.notifications.push_endpoint.clone(), secret(PUSH_SERVER_KEY_VAR)) {
        (Some(endpoint), Some(key)) => {
            tracing::info!("Push notifications go to {}", endpoint);
            Ok(Arc::new(HttpPushProvider::new(endpoint, key, timeout)?))
        }
        _ => {
            tracing::info!("Push notifications are logged only");
            Ok(Arc::new(LoggingPushProvider))
        }
    }
}

pub fn insight_provider(config: &Config) -> Result<Arc<dyn InsightProvider>, Box<dyn Error + Send + Sync>> {
    let insights = &config.insights;
    match (insights.endpoint.clone(), secret(INSIGHT_API_KEY_VAR)) {
        (Some(endpoint), Some(key)) => {
            let model = insights.model.clone().unwrap_or_else(|| DEFAULT_INSIGHT_MODEL.to_string());
            tracing::info!("Sales insights use model {}", model);
            Ok(Arc::new(HttpInsightProvider::new(
                endpoint,
                model,
                key,
                Duration::from_millis(insights.timeout_ms),
            )?))
        }
        _ => Ok(Arc::new(NoopInsightProvider)),
    }
}

pub fn service_settings(config: &Config) -> ServiceSettings {
    ServiceSettings {
        pricing: Pricing::from_config(&config.common),
        push_timeout: Duration::from_millis(config.notifications.timeout_ms),
        // The provider's own client timeout plus a little slack
        insight_timeout: Duration::from_millis(config.insights.timeout_ms + 500),
    }
}

pub async fn run_backend(
    config: Config,
    storage: Arc<dyn Storage>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut state = AppState::new(
        storage,
        push_provider(&config)?,
        insight_provider(&config)?,
        service_settings(&config),
    );
    if let Some(handle) = init_metrics() {
        state = state.with_metrics(handle);
    }

    let cors = match &config.backend.allowed_origin {
        Some(origin) => CorsLayer::new().allow_origin(origin.parse::<header::HeaderValue>()?),
        None => CorsLayer::new().allow_origin(Any),
    };

    let app = router(state, RateLimiter::from_config(&config.backend.rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors.allow_methods(Any).allow_headers(Any));

    tracing::info!("Starting {} backend at {}", config.common.project_name, config.backend.server_address);
    let listener = tokio::net::TcpListener::bind(&config.backend.server_address).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_settings_follow_config() {
        let config = Config::from_yaml(
            r#"
common:
  project_name: grocer
  tax_rate: 0.05
backend:
  server_address: 127.0.0.1:0
  log_level: info
notifications:
  timeout_ms: 250
insights:
  timeout_ms: 1000
"#,
        )
        .unwrap();

        let settings = service_settings(&config);

        assert_eq!(settings.pricing.tax_rate, 0.05);
        assert_eq!(settings.push_timeout, Duration::from_millis(250));
        assert_eq!(settings.insight_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_unconfigured_providers_fall_back() {
        let config = Config::default();
        assert!(push_provider(&config).is_ok());
        assert!(insight_provider(&config).is_ok());
    }
}
