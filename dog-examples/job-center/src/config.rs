use dog_broker::BrokerConfig;
use std::env;
use std::time::Duration;

/// Application settings: broker tuning plus demo behaviour
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub broker: BrokerConfig,

    /// How often queue counts are logged
    pub stats_interval: Duration,

    /// Enqueue a batch of sample jobs at startup
    pub seed_demo_jobs: bool,

    /// Multiplier for simulated provider latency; 0 disables sleeping
    pub latency_scale: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            stats_interval: Duration::from_secs(10),
            seed_demo_jobs: true,
            latency_scale: 1.0,
        }
    }
}

impl AppConfig {
    /// Read `QUEUE_*` broker settings and the `JOB_CENTER_*` demo settings
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let stats_interval = env::var("JOB_CENTER_STATS_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.stats_interval);

        let seed_demo_jobs = env::var("JOB_CENTER_SEED_DEMO_JOBS")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(defaults.seed_demo_jobs);

        let latency_scale = env::var("JOB_CENTER_LATENCY_SCALE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|scale| *scale >= 0.0)
            .unwrap_or(defaults.latency_scale);

        Self {
            broker: BrokerConfig::from_env(),
            stats_interval,
            seed_demo_jobs,
            latency_scale,
        }
    }
}
