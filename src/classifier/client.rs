use futures::{future::BoxFuture, FutureExt};
use reqwest::Client;

use crate::config::ClassifierConfig;

use super::{
    wire::{parse_score_response, ScoreRequest},
    ClassifierError, ScoringService,
};

/// HTTP client for the remote scoring service.
#[derive(Clone)]
pub struct ScoringClient {
    http: Client,
    config: ClassifierConfig,
}

impl ScoringClient {
    pub fn new(http: Client, config: ClassifierConfig) -> Self {
        Self { http, config }
    }

    pub async fn check_health(&self) -> bool {
        let endpoint = self.config.endpoint("health");
        match self
            .http
            .get(endpoint)
            .timeout(self.config.request_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::info!(
                    target: "classifier",
                    status = %response.status(),
                    "scoring service health probe failed"
                );
                false
            }
            Err(err) => {
                tracing::info!(
                    target: "classifier",
                    error = %err,
                    "scoring service health probe failed"
                );
                false
            }
        }
    }

    pub async fn classify(&self, url: &str) -> Result<f64, ClassifierError> {
        let response = self
            .http
            .post(self.config.endpoint("classify"))
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.config.request_timeout)
            .json(&ScoreRequest::single(url))
            .send()
            .await?
            .error_for_status()?;

        parse_score_response(response).await
    }
}

impl ScoringService for ScoringClient {
    fn health(&self) -> BoxFuture<'_, bool> {
        self.check_health().boxed()
    }

    fn score<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<f64, ClassifierError>> {
        self.classify(url).boxed()
    }
}
