use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_API_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub api_timeout_ms: u64,
    pub session_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout_ms: DEFAULT_API_TIMEOUT_MS,
            session_file: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("API_BASE_URL not set, using default");
                    DEFAULT_API_BASE_URL.to_string()
                }),
            api_timeout_ms: parse_timeout(env::var("API_TIMEOUT_MS").ok()),
            session_file: env::var("SESSION_FILE")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - API base URL is empty");
        }

        config
    }

    /// Builds a config pointing at `base_url` with every other field defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_base_url.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }
}

fn parse_timeout(raw: Option<String>) -> u64 {
    match raw {
        None => DEFAULT_API_TIMEOUT_MS,
        Some(value) => match value.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => ms,
            _ => {
                warn!("API_TIMEOUT_MS '{}' is not a positive number, using {}", value, DEFAULT_API_TIMEOUT_MS);
                DEFAULT_API_TIMEOUT_MS
            }
        },
    }
}
