use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DRYRUN_IMAGE_MODEL: &str = "dryrun-image-1";
pub const DRYRUN_TEXT_MODEL: &str = "dryrun-text-1";

/// Environment variables searched, in order, for the service credential.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"];

#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    pub api_base: String,
    pub image_model: String,
    pub text_model: String,
    pub request_timeout: Duration,
    pub transport_retries: usize,
    pub retry_backoff: Duration,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            request_timeout: Duration::from_secs(90),
            transport_retries: 2,
            retry_backoff: Duration::from_secs_f64(1.2),
        }
    }
}

impl StudioConfig {
    /// Reads overrides from the process environment.
    ///
    /// The API key is not part of the config; it is looked up on each request and
    /// session creation through [`api_key`].
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            image_model: lookup("ROOMCRAFT_IMAGE_MODEL").unwrap_or(defaults.image_model),
            text_model: lookup("ROOMCRAFT_TEXT_MODEL").unwrap_or(defaults.text_model),
            request_timeout: Duration::from_secs_f64(parse_clamped(
                lookup("ROOMCRAFT_REQUEST_TIMEOUT"),
                90.0,
                15.0,
                300.0,
            )),
            transport_retries: parse_clamped(lookup("ROOMCRAFT_TRANSPORT_RETRIES"), 2.0, 0.0, 4.0)
                .round() as usize,
            retry_backoff: Duration::from_secs_f64(parse_clamped(
                lookup("ROOMCRAFT_RETRY_BACKOFF"),
                1.2,
                0.1,
                10.0,
            )),
        }
    }

    pub fn with_models(mut self, image_model: Option<String>, text_model: Option<String>) -> Self {
        if let Some(model) = image_model.filter(|value| !value.trim().is_empty()) {
            self.image_model = model.trim().to_string();
        }
        if let Some(model) = text_model.filter(|value| !value.trim().is_empty()) {
            self.text_model = model.trim().to_string();
        }
        self
    }

    pub fn dryrun(self) -> Self {
        self.with_models(
            Some(DRYRUN_IMAGE_MODEL.to_string()),
            Some(DRYRUN_TEXT_MODEL.to_string()),
        )
    }
}

pub fn api_key() -> Option<String> {
    API_KEY_VARS.iter().find_map(|key| non_empty_env(key))
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_clamped(raw: Option<String>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() {
        let config = StudioConfig::from_lookup(|_| None);
        assert_eq!(config, StudioConfig::default());
    }

    #[test]
    fn overrides_are_read_and_clamped() {
        let config = StudioConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_BASE", "http://localhost:8080/v1beta/"),
            ("ROOMCRAFT_IMAGE_MODEL", "gemini-2.5-flash-image"),
            ("ROOMCRAFT_REQUEST_TIMEOUT", "5"),
            ("ROOMCRAFT_TRANSPORT_RETRIES", "9"),
            ("ROOMCRAFT_RETRY_BACKOFF", "abc"),
        ]));
        assert_eq!(config.api_base, "http://localhost:8080/v1beta");
        assert_eq!(config.image_model, "gemini-2.5-flash-image");
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.transport_retries, 4);
        assert_eq!(config.retry_backoff, StudioConfig::default().retry_backoff);
    }

    #[test]
    fn cli_models_win_over_environment() {
        let config = StudioConfig::default()
            .with_models(Some(" dryrun-image-1 ".to_string()), Some(String::new()));
        assert_eq!(config.image_model, "dryrun-image-1");
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);

        let dry = StudioConfig::default().dryrun();
        assert_eq!(dry.text_model, DRYRUN_TEXT_MODEL);
    }
}
