//! Client configuration, resolved once at startup and passed into the matcher.

use crate::error::ConfigError;
use crate::models::SearchContext;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const FIND_TRIALS_PATH: &str = "api/v1/trials/find";
pub const HEALTH_PATH: &str = "health";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: Url,
    timeout: Option<Duration>,
    context: Option<SearchContext>,
}

impl ClientConfig {
    /// Parses and checks `base_url`. `timeout = None` leaves requests unbounded.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        let mut base_url = Url::parse(base_url.trim())?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(base_url.scheme().to_string()));
        }

        // Url::join replaces the last segment unless the path ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            timeout,
            context: None,
        })
    }

    pub fn with_context(mut self, context: SearchContext) -> Self {
        self.context = Some(context).filter(|context| !context.is_empty());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn context(&self) -> Option<&SearchContext> {
        self.context.as_ref()
    }

    pub fn find_trials_url(&self) -> Result<Url, ConfigError> {
        Ok(self.base_url.join(FIND_TRIALS_PATH)?)
    }

    pub fn health_url(&self) -> Result<Url, ConfigError> {
        Ok(self.base_url.join(HEALTH_PATH)?)
    }
}
