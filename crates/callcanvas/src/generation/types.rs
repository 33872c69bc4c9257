//! Image generation request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::trigger::{ImageStyle, TriggerRequest};

/// Image models offered by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageModel {
    /// Fast model used for real-time generation during calls.
    #[default]
    FluxSchnell,
    FluxDev,
    FluxPro,
}

impl ImageModel {
    /// Provider model path (`owner/name`).
    pub fn model_path(&self) -> &'static str {
        match self {
            ImageModel::FluxSchnell => "black-forest-labs/flux-schnell",
            ImageModel::FluxDev => "black-forest-labs/flux-dev",
            ImageModel::FluxPro => "black-forest-labs/flux-pro",
        }
    }

    /// Credits charged per generated image.
    pub fn credits(&self) -> u32 {
        match self {
            ImageModel::FluxSchnell => 1,
            ImageModel::FluxDev => 2,
            ImageModel::FluxPro => 5,
        }
    }

    /// Build the prediction input for a request.
    pub fn prediction_input(&self, request: &TriggerRequest) -> Value {
        let prompt = styled_prompt(request);
        let aspect_ratio = request.aspect_ratio.as_str();
        match self {
            ImageModel::FluxSchnell => json!({
                "prompt": prompt,
                "aspect_ratio": aspect_ratio,
                "num_outputs": 1,
                "output_format": "png",
                "output_quality": 90,
            }),
            ImageModel::FluxDev => json!({
                "prompt": prompt,
                "aspect_ratio": aspect_ratio,
                "num_outputs": 1,
                "guidance": 3.5,
                "num_inference_steps": 28,
            }),
            ImageModel::FluxPro => json!({
                "prompt": prompt,
                "aspect_ratio": aspect_ratio,
                "safety_tolerance": 2,
                "output_format": "png",
            }),
        }
    }
}

impl std::fmt::Display for ImageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageModel::FluxSchnell => write!(f, "flux_schnell"),
            ImageModel::FluxDev => write!(f, "flux_dev"),
            ImageModel::FluxPro => write!(f, "flux_pro"),
        }
    }
}

/// Fold the requested style into the prompt text.
///
/// Photorealistic is the provider's native rendering and adds nothing.
pub fn styled_prompt(request: &TriggerRequest) -> String {
    match request.style {
        ImageStyle::Photorealistic => request.prompt.clone(),
        style => format!("{}, {} style", request.prompt, style),
    }
}

/// Outcome of a single successful generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub url: String,
    pub credits_used: u32,
    pub model: ImageModel,
}

/// Prediction status reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    /// Any status this client does not know; treated as a failure.
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            PredictionStatus::Starting | PredictionStatus::Processing
        )
    }
}

/// Links returned with a prediction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

/// Prediction resource as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: String,
    pub status: PredictionStatus,
    /// A single URL or a list of URLs depending on the model.
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: PredictionUrls,
}

impl Prediction {
    /// First image URL in the output, if any.
    pub fn first_image_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }

    /// Human-readable failure reason.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(msg)) => msg.clone(),
            Some(other) => other.to_string(),
            None => format!("prediction {} ended as {:?}", self.id, self.status),
        }
    }
}

/// Error body returned by the provider on non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderErrorResponse {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::AspectRatio;

    #[test]
    fn test_model_pricing() {
        assert_eq!(ImageModel::default(), ImageModel::FluxSchnell);
        assert_eq!(ImageModel::FluxSchnell.credits(), 1);
        assert_eq!(ImageModel::FluxDev.credits(), 2);
        assert_eq!(ImageModel::FluxPro.credits(), 5);
    }

    #[test]
    fn test_prediction_input_carries_aspect_ratio_and_style() {
        let request = TriggerRequest::new("a porch")
            .style(ImageStyle::Sketch)
            .aspect_ratio(AspectRatio::Square);
        let input = ImageModel::FluxSchnell.prediction_input(&request);
        assert_eq!(input["prompt"], "a porch, sketch style");
        assert_eq!(input["aspect_ratio"], "1:1");
        assert_eq!(input["num_outputs"], 1);

        let plain = ImageModel::FluxPro.prediction_input(&TriggerRequest::new("a porch"));
        assert_eq!(plain["prompt"], "a porch");
        assert_eq!(plain["aspect_ratio"], "16:9");
    }

    #[test]
    fn test_prediction_output_shapes() {
        let list: Prediction = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "status": "succeeded",
            "output": ["https://img/1.png", "https://img/2.png"]
        }))
        .unwrap();
        assert_eq!(list.first_image_url().as_deref(), Some("https://img/1.png"));

        let single: Prediction = serde_json::from_value(serde_json::json!({
            "id": "p2",
            "status": "succeeded",
            "output": "https://img/3.png"
        }))
        .unwrap();
        assert_eq!(single.first_image_url().as_deref(), Some("https://img/3.png"));

        let failed: Prediction = serde_json::from_value(serde_json::json!({
            "id": "p3",
            "status": "failed",
            "error": "NSFW content detected"
        }))
        .unwrap();
        assert!(failed.status.is_terminal());
        assert_eq!(failed.first_image_url(), None);
        assert_eq!(failed.error_message(), "NSFW content detected");
    }

    #[test]
    fn test_unknown_status_is_terminal_failure() {
        let prediction: Prediction =
            serde_json::from_value(json!({"id": "p9", "status": "aborted"})).unwrap();
        assert_eq!(prediction.status, PredictionStatus::Unknown);
        assert!(prediction.status.is_terminal());
        assert!(prediction.first_image_url().is_none());
        assert!(prediction.error_message().contains("p9"));

        assert!(!PredictionStatus::Processing.is_terminal());
        assert!(PredictionStatus::Canceled.is_terminal());
    }
}
