use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Probabilities at or above this value are treated as AI-generated.
pub const AI_PROBABILITY_THRESHOLD: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_ai: bool,
    pub confidence: f64,
}

impl ClassificationResult {
    pub fn from_probability(probability: f64) -> Self {
        let confidence = if probability.is_finite() {
            probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            is_ai: confidence >= AI_PROBABILITY_THRESHOLD,
            confidence,
        }
    }

    pub fn percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Off,
    Light,
    Strict,
}

impl Mode {
    pub fn is_active(self) -> bool {
        !matches!(self, Mode::Off)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Light => "light",
            Mode::Strict => "strict",
        }
    }

    /// Parses an optional mode value as carried by notifications and storage,
    /// where an absent or empty value means the filter is disabled.
    pub fn from_optional(value: Option<&str>) -> Result<Self, ParseModeError> {
        match value.map(str::trim) {
            None | Some("") => Ok(Mode::Off),
            Some(raw) => raw.parse(),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown filtering mode: {0}")]
pub struct ParseModeError(pub String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "null" => Ok(Mode::Off),
            "light" | "basic" => Ok(Mode::Light),
            "strict" => Ok(Mode::Strict),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}
