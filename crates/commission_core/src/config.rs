use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    currency::FALLBACK_CURRENCY,
    error::CommissionError,
    reconcile::{ReconcileOptions, UnlabelledScale},
};

pub const SETTINGS_FILE: &str = "commission.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub backend_url: String,
    pub request_timeout_secs: u64,
    /// Pause between the success notification and the navigate signal.
    pub navigate_delay_ms: u64,
    pub unlabelled_percent_scale: UnlabelledScale,
    pub default_currency: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8080/api".into(),
            request_timeout_secs: 30,
            navigate_delay_ms: 1500,
            unlabelled_percent_scale: UnlabelledScale::Infer,
            default_currency: FALLBACK_CURRENCY.into(),
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn navigate_delay(&self) -> Duration {
        Duration::from_millis(self.navigate_delay_ms)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            unlabelled_scale: self.unlabelled_percent_scale,
        }
    }
}

/// Defaults, then the TOML file (an explicit path must exist; otherwise
/// `commission.toml` in the working directory is used when present), then
/// `APP__*` environment variables.
pub fn load_settings(path: Option<&Path>) -> Result<ClientSettings, CommissionError> {
    let file = match path {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default_path = PathBuf::from(SETTINGS_FILE);
            default_path.exists().then_some(default_path)
        }
    };

    let mut settings = match file {
        Some(file) => parse_settings_file(&file)?,
        None => ClientSettings::default(),
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn parse_settings_file(path: &Path) -> Result<ClientSettings, CommissionError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        CommissionError::Config(format!("failed to read '{}': {err}", path.display()))
    })?;
    toml::from_str(&raw).map_err(|err| {
        CommissionError::Config(format!("failed to parse '{}': {err}", path.display()))
    })
}

fn apply_env_overrides(
    settings: &mut ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), CommissionError> {
    if let Some(v) = lookup("APP__BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = parse_number("APP__REQUEST_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = lookup("APP__NAVIGATE_DELAY_MS") {
        settings.navigate_delay_ms = parse_number("APP__NAVIGATE_DELAY_MS", &v)?;
    }
    if let Some(v) = lookup("APP__UNLABELLED_PERCENT_SCALE") {
        settings.unlabelled_percent_scale = v.parse().map_err(|err| {
            CommissionError::Config(format!("APP__UNLABELLED_PERCENT_SCALE: {err}"))
        })?;
    }
    if let Some(v) = lookup("APP__DEFAULT_CURRENCY") {
        settings.default_currency = v;
    }
    Ok(())
}

fn parse_number(key: &str, raw: &str) -> Result<u64, CommissionError> {
    raw.trim()
        .parse()
        .map_err(|_| CommissionError::Config(format!("{key} must be a whole number, got '{raw}'")))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
