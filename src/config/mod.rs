use crate::cli::Args;
use crate::stream::pacing::PacingConfig;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(15_000);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub request_timeout: Duration,
    pub pacing: PacingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            pacing: PacingConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Joins an endpoint onto the base URL; absolute URLs pass through.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), endpoint)
        }
    }
}

impl From<&Args> for ClientConfig {
    fn from(args: &Args) -> Self {
        Self {
            base_url: args.api_base_url.clone(),
            access_token: args.access_token.clone().filter(|t| !t.trim().is_empty()),
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            pacing: PacingConfig {
                tick_interval: Duration::from_millis(args.pacing_interval_ms.max(1)),
                chars_per_tick: args.pacing_chars_per_tick.max(1),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn endpoint_url_joins_relative_paths_only() {
        let config = ClientConfig::with_base_url("http://api.local/");
        assert_eq!(
            config.endpoint_url("/api/v1/quota/info"),
            "http://api.local/api/v1/quota/info"
        );
        assert_eq!(config.endpoint_url("https://other/x"), "https://other/x");
    }

    #[test]
    fn args_map_onto_config_with_floors() {
        let args = Args::parse_from([
            "docchat",
            "--api-base-url",
            "http://h:1",
            "--pacing-chars-per-tick",
            "0",
            "--access-token",
            "",
            "hello",
        ]);
        let config = ClientConfig::from(&args);
        assert_eq!(config.base_url, "http://h:1");
        assert!(config.access_token.is_none());
        assert_eq!(config.pacing.chars_per_tick, 1);
        assert_eq!(config.pacing.tick_interval, Duration::from_millis(20));
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}
