use clap::ValueEnum;
use flamydash_types::{codec::DEFAULT_MAX_AGE_SECS, DEFAULT_PUBLIC_ORIGIN};
use std::path::PathBuf;
use std::time::Duration;

/// Served pages live under `<dir>/<game>/latest/index.html`.
pub const DEFAULT_GAMES_DIR: &str = "public/games";

const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 100;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Deployment environment, controlling how much error detail leaves the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Origin used to build asset and embed URLs.
    pub public_origin: String,
    /// Directory holding `<game>/latest/index.html` pages.
    pub games_dir: Option<PathBuf>,
    /// Freshness window applied to config request timestamps.
    pub max_request_age_secs: Option<u64>,
    pub environment: Environment,
    /// Requests allowed per IP on `/api` within one window (None disables).
    pub rate_limit_requests: Option<u32>,
    pub rate_limit_window_secs: Option<u64>,
    /// Max request body size in bytes (None disables).
    pub http_body_limit_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_origin: DEFAULT_PUBLIC_ORIGIN.to_string(),
            games_dir: Some(PathBuf::from(DEFAULT_GAMES_DIR)),
            max_request_age_secs: Some(DEFAULT_MAX_AGE_SECS),
            environment: Environment::default(),
            rate_limit_requests: Some(DEFAULT_RATE_LIMIT_REQUESTS),
            rate_limit_window_secs: Some(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            http_body_limit_bytes: Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
        }
    }
}

impl ServerConfig {
    pub fn max_request_age_secs(&self) -> u64 {
        self.max_request_age_secs.unwrap_or(DEFAULT_MAX_AGE_SECS)
    }

    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }

    /// Requests and window length, when both are set and non-zero.
    pub fn rate_limit(&self) -> Option<(u32, Duration)> {
        match (self.rate_limit_requests, self.rate_limit_window_secs) {
            (Some(requests), Some(window)) if requests > 0 && window > 0 => {
                Some((requests, Duration::from_secs(window)))
            }
            _ => None,
        }
    }

    pub fn http_body_limit_bytes(&self) -> Option<usize> {
        self.http_body_limit_bytes.filter(|limit| *limit > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_public_deployment() {
        let config = ServerConfig::default();
        assert_eq!(config.max_request_age_secs(), 3600);
        assert_eq!(
            config.rate_limit(),
            Some((100, Duration::from_secs(900)))
        );
        assert_eq!(config.http_body_limit_bytes(), Some(10 * 1024 * 1024));
        assert!(config.is_development());
        assert_eq!(
            config.games_dir.as_deref(),
            Some(std::path::Path::new("public/games"))
        );
    }

    #[test]
    fn zero_disables_limits() {
        let config = ServerConfig {
            rate_limit_requests: Some(0),
            http_body_limit_bytes: Some(0),
            ..Default::default()
        };
        assert_eq!(config.rate_limit(), None);
        assert_eq!(config.http_body_limit_bytes(), None);

        let config = ServerConfig {
            rate_limit_window_secs: None,
            ..Default::default()
        };
        assert_eq!(config.rate_limit(), None);
    }

    #[test]
    fn parses_environment_names() {
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!(" Development ".parse::<Environment>(), Ok(Environment::Development));
        assert!("staging".parse::<Environment>().is_err());
    }
}
