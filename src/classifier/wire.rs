use reqwest::Response;
use serde::{Deserialize, Serialize};

use super::ClassifierError;

#[derive(Debug, Serialize)]
pub struct ScoreRequest<'a> {
    pub images: Vec<&'a str>,
}

impl<'a> ScoreRequest<'a> {
    pub fn single(url: &'a str) -> Self {
        Self { images: vec![url] }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScoreResponse {
    pub results: Vec<Option<ScoreItem>>,
}

#[derive(Debug, Deserialize)]
pub struct ScoreItem {
    pub ok: bool,
    #[serde(default)]
    pub prob_ai: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeRequest {
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeResponse {
    pub is_ai: bool,
    pub confidence: f64,
}

/// Answer of the background classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub ok: bool,
    #[serde(default)]
    pub prob: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl FallbackResponse {
    pub fn probability(prob: f64) -> Self {
        Self {
            ok: true,
            prob: Some(prob),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            prob: None,
            error: Some(error.into()),
        }
    }

    /// The usable probability, if the answer carries one.
    pub fn usable_probability(&self) -> Option<f64> {
        self.prob
            .filter(|prob| self.ok && prob.is_finite())
            .map(|prob| prob.clamp(0.0, 1.0))
    }
}

impl From<AnalyzeResponse> for FallbackResponse {
    fn from(value: AnalyzeResponse) -> Self {
        if !value.confidence.is_finite() {
            return Self::failed("analyze returned a non-finite confidence");
        }
        let confidence = value.confidence.clamp(0.0, 1.0);
        Self::probability(if value.is_ai {
            confidence
        } else {
            1.0 - confidence
        })
    }
}

/// Reads the positional result for a single-image score request.
pub async fn parse_score_response(response: Response) -> Result<f64, ClassifierError> {
    let payload: ScoreResponse = response
        .json()
        .await
        .map_err(|err| ClassifierError::Protocol(err.to_string()))?;
    first_probability(payload)
}

pub fn first_probability(payload: ScoreResponse) -> Result<f64, ClassifierError> {
    let item = payload
        .results
        .into_iter()
        .next()
        .flatten()
        .ok_or_else(|| ClassifierError::Protocol("response did not contain any results".into()))?;

    if !item.ok {
        return Err(ClassifierError::Rejected(
            item.error.unwrap_or_else(|| "no error detail".to_string()),
        ));
    }

    match item.prob_ai {
        Some(prob) if (0.0..=1.0).contains(&prob) => Ok(prob),
        Some(prob) => Err(ClassifierError::Protocol(format!(
            "prob_ai {prob} outside [0, 1]"
        ))),
        None => Err(ClassifierError::Protocol("result missing prob_ai".into())),
    }
}
