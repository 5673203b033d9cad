use std::{collections::HashMap, fs, path::Path, time::Duration};

use thiserror::Error;
use tracing::warn;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_SETTINGS_FILE: &str = "dashboard.toml";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid api url '{value}': {source}")]
    InvalidApiUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("api url '{0}' cannot be used as a base")]
    NotABase(String),
    #[error("invalid request timeout '{0}': expected milliseconds greater than zero")]
    InvalidTimeout(String),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: Url,
    pub request_timeout: Duration,
    pub notification_capacity: usize,
}

impl Settings {
    /// Built-in defaults, before any file or environment layer.
    pub fn new() -> Result<Self, SettingsError> {
        Ok(Self {
            api_url: parse_api_url(DEFAULT_API_URL)?,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        })
    }

    pub fn set_api_url(&mut self, raw: &str) -> Result<(), SettingsError> {
        self.api_url = parse_api_url(raw)?;
        Ok(())
    }

    pub fn set_request_timeout_ms(&mut self, raw: &str) -> Result<(), SettingsError> {
        self.request_timeout = parse_timeout_ms(raw)?;
        Ok(())
    }
}

pub fn load_settings() -> Result<Settings, SettingsError> {
    load_settings_from(DEFAULT_SETTINGS_FILE)
}

/// Defaults, then the flat `key = "value"` file at `path` if present, then
/// environment overrides. Bad values in either layer are skipped with a
/// warning.
pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
    let mut settings = Settings::new()?;

    if let Ok(raw) = fs::read_to_string(path.as_ref()) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => apply_file_values(&mut settings, &file_cfg),
            Err(err) => warn!(
                path = %path.as_ref().display(),
                error = %err,
                "config: ignoring unreadable settings file"
            ),
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file_values(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("api_url") {
        apply_or_warn(settings.set_api_url(v), "api_url");
    }
    if let Some(v) = file_cfg.get("request_timeout_ms") {
        apply_or_warn(settings.set_request_timeout_ms(v), "request_timeout_ms");
    }
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("API_URL") {
        apply_or_warn(settings.set_api_url(&v), "API_URL");
    }
    if let Some(v) = lookup("APP__API_URL") {
        apply_or_warn(settings.set_api_url(&v), "APP__API_URL");
    }
    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_MS") {
        apply_or_warn(
            settings.set_request_timeout_ms(&v),
            "APP__REQUEST_TIMEOUT_MS",
        );
    }
}

fn apply_or_warn(result: Result<(), SettingsError>, source: &str) {
    if let Err(err) = result {
        warn!(source, error = %err, "config: keeping previous value");
    }
}

fn parse_api_url(raw: &str) -> Result<Url, SettingsError> {
    let trimmed = raw.trim();
    // Url::join drops the last path segment unless the base ends with '/'.
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized).map_err(|source| SettingsError::InvalidApiUrl {
        value: raw.to_string(),
        source,
    })?;
    if url.cannot_be_a_base() {
        return Err(SettingsError::NotABase(raw.to_string()));
    }
    Ok(url)
}

fn parse_timeout_ms(raw: &str) -> Result<Duration, SettingsError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(SettingsError::InvalidTimeout(raw.to_string())),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
