//! Observability features: structured logging and metrics helpers

use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::{LoggingConfig, ObservabilityConfig};

/// Global observability system
static OBSERVABILITY: OnceCell<ObservabilitySystem> = OnceCell::new();

/// Observability system for centralized logging and metrics
#[derive(Debug)]
pub struct ObservabilitySystem {
    level: Level,
    json: bool,
}

impl ObservabilitySystem {
    /// Initialize the observability system. A second call is reported as an
    /// error instead of replacing the installed subscriber.
    pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
        if OBSERVABILITY.get().is_some() {
            anyhow::bail!("Observability system already initialized");
        }

        let system = Self {
            level: parse_level(&config.logging.level),
            json: config.logging.format.eq_ignore_ascii_case("json"),
        };

        Self::init_logging(&config.logging)?;

        OBSERVABILITY
            .set(system)
            .map_err(|_| anyhow::anyhow!("Observability system already initialized"))?;

        info!("Observability system initialized");
        Ok(())
    }

    /// Initialize structured logging
    fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
        let env_filter = EnvFilter::builder()
            .with_default_directive(parse_level(&config.level).into())
            .from_env_lossy();

        let registry = tracing_subscriber::registry().with(env_filter);

        match config.format.to_lowercase().as_str() {
            "json" => {
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE);
                registry.with(json_layer).try_init()?;
            }
            _ => {
                let pretty_layer = tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_span_events(FmtSpan::CLOSE);
                registry.with(pretty_layer).try_init()?;
            }
        }

        Ok(())
    }

    /// Get the global observability system
    pub fn get() -> Option<&'static ObservabilitySystem> {
        OBSERVABILITY.get()
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn is_json(&self) -> bool {
        self.json
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Entity-view update metrics
pub struct ViewMetrics;

impl ViewMetrics {
    /// Record an update that affected exactly one row
    pub fn update_succeeded(view: &str, duration: Duration) {
        counter!("prism_view_updates_total",
                "view" => view.to_string(),
                "outcome" => "success")
            .increment(1);
        histogram!("prism_view_update_duration_seconds", "view" => view.to_string())
            .record(duration.as_secs_f64());
    }

    /// Record a rejected or failed update
    pub fn update_failed(view: &str, reason: &str) {
        counter!("prism_view_updates_total",
                "view" => view.to_string(),
                "outcome" => reason.to_string())
            .increment(1);
    }
}
