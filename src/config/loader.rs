use std::{env, str::FromStr, time::Duration};

use url::Url;

use super::env::{
    AppConfig, ClassifierConfig, ConfigError, DirectoryConfig, LoggingConfig, PipelineConfig,
};

pub(super) const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000/";

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = PipelineConfig::default();

        let classifier = ClassifierConfig {
            server_url: parse_server_url(
                &env::var("FLAGGER_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string()),
            )?,
            request_timeout: Duration::from_millis(
                parse_or("FLAGGER_REQUEST_TIMEOUT_MS", 10_000u64)?,
            ),
            fallback_probability: parse_probability("FLAGGER_FALLBACK_PROBABILITY", 0.3)?,
            reprobe_after: parse_optional::<u64>("FLAGGER_BREAKER_REPROBE_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        };

        let pipeline = PipelineConfig {
            max_inflight: parse_or("FLAGGER_MAX_INFLIGHT", defaults.max_inflight)?.max(1),
            viewport_margin: parse_or("FLAGGER_VIEWPORT_MARGIN", defaults.viewport_margin)?,
            cache_capacity: parse_or("FLAGGER_CACHE_CAPACITY", defaults.cache_capacity)?.max(1),
            scroll_debounce: Duration::from_millis(parse_or("FLAGGER_SCROLL_DEBOUNCE_MS", 100u64)?),
        };

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            settings_filename: env::var("SETTINGS_FILENAME")
                .unwrap_or_else(|_| "settings.json".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let page_snapshot = env::var("PAGE_SNAPSHOT").ok().filter(|v| !v.is_empty());

        Ok(Self {
            classifier,
            pipeline,
            directories,
            logging,
            page_snapshot,
        })
    }
}

/// Parses the scoring service base URL, forcing a trailing slash so that
/// endpoint paths join underneath it.
pub(super) fn parse_server_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::Invalid {
        key: "FLAGGER_SERVER_URL",
        value: raw.to_string(),
    };
    let mut url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_probability(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    let value = parse_or(key, default)?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(None),
    }
}
