use std::env;
use std::time::Duration;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_PROVIDER: &str = "gemini";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub provider: String,
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub image_model: String,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub variation_cooldown: Duration,
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            max_retries: 5,
            retry_base_delay: Duration::from_millis(5_000),
            variation_cooldown: Duration::from_millis(5_000),
            request_timeout: Duration::from_secs(90),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Builds a config from any key lookup; missing or unparseable numbers
    /// fall back to the defaults and every number is clamped to a sane range.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: u64, min: u64, max: u64| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .unwrap_or(default)
                .clamp(min, max)
        };

        let gemini_api_key = lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY"));
        let provider = match lookup("MASCOT_PROVIDER") {
            Some(value) => value.to_ascii_lowercase(),
            None if gemini_api_key.is_some() => DEFAULT_PROVIDER.to_string(),
            None => "dryrun".to_string(),
        };

        Self {
            provider,
            gemini_api_key,
            gemini_api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_api_base),
            image_model: lookup("MASCOT_IMAGE_MODEL").unwrap_or(defaults.image_model),
            max_retries: number("MASCOT_RETRY_MAX", 5, 0, 8) as u32,
            retry_base_delay: Duration::from_millis(number("MASCOT_RETRY_BASE_MS", 5_000, 100, 60_000)),
            variation_cooldown: Duration::from_millis(number("MASCOT_COOLDOWN_MS", 5_000, 0, 60_000)),
            request_timeout: Duration::from_secs(number("MASCOT_REQUEST_TIMEOUT_S", 90, 15, 300)),
        }
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
