//! Replicate-compatible image generation HTTP client.

use std::time::Duration;

use log::debug;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tokio::time::Instant;

use super::error::{GenerationError, GenerationResult};
use super::types::*;
use crate::trigger::TriggerRequest;

/// Delay between polls while a prediction is still running.
const POLL_INTERVAL: Duration = Duration::from_millis(750);

/// Client for the image generation provider.
#[derive(Debug, Clone)]
pub struct ReplicateClient {
    /// HTTP client.
    client: Client,
    /// Base URL (e.g., "https://api.replicate.com").
    base_url: String,
    /// API token; generation fails with `NotConfigured` when absent.
    api_token: Option<String>,
    /// Model used for every request.
    model: ImageModel,
    /// Upper bound for one generation, including polling.
    timeout: Duration,
}

impl ReplicateClient {
    /// Create a new provider client.
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        model: ImageModel,
        timeout: Duration,
    ) -> GenerationResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.filter(|t| !t.is_empty()),
            model,
            timeout,
        })
    }

    pub fn model(&self) -> ImageModel {
        self.model
    }

    pub fn is_configured(&self) -> bool {
        self.api_token.is_some()
    }

    fn predictions_url(&self) -> String {
        format!(
            "{}/v1/models/{}/predictions",
            self.base_url,
            self.model.model_path()
        )
    }

    /// Run one prediction to completion and return the first image.
    pub async fn create_image(&self, request: &TriggerRequest) -> GenerationResult<ImageResult> {
        let token = self
            .api_token
            .as_deref()
            .ok_or_else(|| GenerationError::NotConfigured("no API token".to_string()))?;

        let deadline = Instant::now() + self.timeout;
        let body = json!({ "input": self.model.prediction_input(request) });

        let response = self
            .client
            .post(self.predictions_url())
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;
        let mut prediction: Prediction = self.handle_response(response).await?;

        while !prediction.status.is_terminal() {
            if Instant::now() >= deadline {
                return Err(GenerationError::TimedOut(self.timeout.as_secs()));
            }
            let poll_url = prediction.urls.get.clone().ok_or_else(|| {
                GenerationError::ParseError("running prediction has no poll URL".to_string())
            })?;
            debug!("Prediction {} is {:?}, polling", prediction.id, prediction.status);
            tokio::time::sleep(POLL_INTERVAL).await;

            let response = self.client.get(&poll_url).bearer_auth(token).send().await?;
            prediction = self.handle_response(response).await?;
        }

        match prediction.status {
            PredictionStatus::Succeeded => {
                let url = prediction.first_image_url().ok_or(GenerationError::NoOutput)?;
                Ok(ImageResult {
                    url,
                    credits_used: self.model.credits(),
                    model: self.model,
                })
            }
            _ => Err(GenerationError::PredictionFailed(prediction.error_message())),
        }
    }

    /// Handle response and parse JSON or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> GenerationResult<T> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| GenerationError::ParseError(format!("Failed to parse response: {}", e)));
        }

        let message = match status {
            StatusCode::UNAUTHORIZED => "invalid API token".to_string(),
            StatusCode::TOO_MANY_REQUESTS => "rate limited".to_string(),
            _ => {
                let text = response.text().await.unwrap_or_default();
                serde_json::from_str::<ProviderErrorResponse>(&text)
                    .ok()
                    .and_then(|e| e.detail.or(e.title))
                    .unwrap_or(text)
            }
        };

        Err(GenerationError::ProviderError {
            status: status.as_u16(),
            message,
        })
    }
}
