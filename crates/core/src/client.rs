use crate::config::ClientConfig;
use crate::traits::TrialMatcher;
use crate::{ConfigError, FindTrialsRequest, MatchError, SearchContext, SearchResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// Talks to the matching service over HTTP.
pub struct HttpTrialMatcher {
    client: Arc<Client>,
    find_trials_url: Url,
    health_url: Url,
    context: Option<SearchContext>,
}

impl HttpTrialMatcher {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: Arc::new(builder.build()?),
            find_trials_url: config.find_trials_url()?,
            health_url: config.health_url()?,
            context: config.context().cloned(),
        })
    }

    pub async fn health(&self) -> Result<HealthStatus, MatchError> {
        let response = self
            .client
            .get(self.health_url.clone())
            .send()
            .await
            .map_err(|error| MatchError::transport(&error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| MatchError::transport(&error))?;

        if !status.is_success() {
            return Err(MatchError::Server {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        serde_json::from_str(&body)
            .map_err(|error| MatchError::Protocol(format!("invalid health response: {error}")))
    }
}

#[async_trait]
impl TrialMatcher for HttpTrialMatcher {
    /// Requests without their own context get the configured one.
    async fn find_trials(&self, request: &FindTrialsRequest) -> Result<SearchResponse, MatchError> {
        let mut request = request.clone();
        if request.context.is_none() {
            request.context = self.context.clone();
        }

        debug!(url = %self.find_trials_url, patient_id = %request.patient_id, "posting trial search");

        let response = self
            .client
            .post(self.find_trials_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|error| MatchError::transport(&error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| MatchError::transport(&error))?;

        debug!(status = status.as_u16(), bytes = body.len(), "trial search responded");

        if !status.is_success() {
            return Err(MatchError::Server {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        SearchResponse::from_json(&body)
    }
}

// An error body that is not JSON, or has no usable `detail`, yields None.
fn error_detail(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("detail")
        .and_then(Value::as_str)
        .filter(|detail| !detail.is_empty())
        .map(str::to_string)
}
