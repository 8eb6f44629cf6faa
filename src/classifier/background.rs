use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::{future::BoxFuture, FutureExt};
use reqwest::Client;
use url::Url;

use crate::config::ClassifierConfig;

use super::{
    wire::{AnalyzeRequest, AnalyzeResponse, FallbackResponse},
    ClassifierError, FallbackClassifier,
};

/// Turns fetched image bytes into the payload the analyzer accepts.
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, image: &[u8]) -> Result<Vec<u8>, ClassifierError>;
}

/// Sends the image as fetched and leaves resizing to the analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEncoder;

impl ImageEncoder for PassthroughEncoder {
    fn encode(&self, image: &[u8]) -> Result<Vec<u8>, ClassifierError> {
        if image.is_empty() {
            return Err(ClassifierError::Protocol("image body is empty".into()));
        }
        Ok(image.to_vec())
    }
}

/// Fetches the image itself and posts the encoded bytes to `/analyze`.
pub struct BackgroundClassifier {
    http: Client,
    config: ClassifierConfig,
    encoder: Arc<dyn ImageEncoder>,
}

impl BackgroundClassifier {
    pub fn new(http: Client, config: ClassifierConfig, encoder: Arc<dyn ImageEncoder>) -> Self {
        Self {
            http,
            config,
            encoder,
        }
    }

    pub async fn analyze(&self, raw_url: &str) -> Result<FallbackResponse, ClassifierError> {
        let url = match Url::parse(raw_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => return Ok(FallbackResponse::failed("unsupported image url")),
        };

        let image = self
            .http
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let encoded = self.encoder.encode(&image)?;
        let payload = AnalyzeRequest {
            image: STANDARD.encode(encoded),
        };

        let response = self
            .http
            .post(self.config.endpoint("analyze"))
            .timeout(self.config.request_timeout)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let answer: AnalyzeResponse = response
            .json()
            .await
            .map_err(|err| ClassifierError::Protocol(err.to_string()))?;
        Ok(answer.into())
    }
}

impl FallbackClassifier for BackgroundClassifier {
    fn classify<'a>(
        &'a self,
        url: &'a str,
    ) -> BoxFuture<'a, Result<FallbackResponse, ClassifierError>> {
        self.analyze(url).boxed()
    }
}
