use std::time::Duration;

/// Application configuration, environment-first with flag overrides at the
/// binary edge.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address, e.g. "0.0.0.0:8080"
    pub bind: String,
    /// Outbound fetch deadline
    pub fetch_timeout: Duration,
    /// Events admitted per workspace per minute
    pub events_per_minute: u32,
    /// How long finished insight jobs stay queryable
    pub job_ttl: Duration,
    /// Bootstrap workspace API key; a workspace is created for it at
    /// startup when set
    pub bootstrap_api_key: Option<String>,
    /// Default per-workspace rate limit (requests/hour) for the bootstrap
    /// workspace
    pub default_rate_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            fetch_timeout: Duration::from_secs(30),
            events_per_minute: 1000,
            job_ttl: Duration::from_secs(3600),
            bootstrap_api_key: None,
            default_rate_limit: 3600,
        }
    }
}

impl AppConfig {
    /// Load configuration from `WEBLENS_*` environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: std::env::var("WEBLENS_BIND").unwrap_or(defaults.bind),
            fetch_timeout: env_secs("WEBLENS_FETCH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            events_per_minute: env_parse("WEBLENS_EVENTS_PER_MINUTE")
                .unwrap_or(defaults.events_per_minute),
            job_ttl: env_secs("WEBLENS_JOB_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_ttl),
            bootstrap_api_key: std::env::var("WEBLENS_API_KEY").ok().filter(|k| !k.is_empty()),
            default_rate_limit: env_parse("WEBLENS_DEFAULT_RATE_LIMIT")
                .unwrap_or(defaults.default_rate_limit),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn env_secs(var: &str) -> Option<u64> {
    env_parse(var)
}
