use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub pipeline: PipelineConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub page_snapshot: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the scoring service; always ends with a slash.
    pub server_url: Url,
    pub request_timeout: Duration,
    pub fallback_probability: f64,
    /// `None` keeps the unavailable flag latched until an explicit reset.
    pub reprobe_after: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_inflight: usize,
    pub viewport_margin: f64,
    pub cache_capacity: usize,
    pub scroll_debounce: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub settings_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl ClassifierConfig {
    pub fn endpoint(&self, path: &str) -> Url {
        self.server_url
            .join(path)
            .unwrap_or_else(|_| self.server_url.clone())
    }
}

#[cfg(test)]
impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            server_url: Url::parse(super::loader::DEFAULT_SERVER_URL)
                .expect("default server url is valid"),
            request_timeout: Duration::from_millis(10_000),
            fallback_probability: 0.3,
            reprobe_after: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_inflight: 3,
            viewport_margin: 500.0,
            cache_capacity: 500,
            scroll_debounce: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
