use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

/// Fast-tier model used when `CHAT_MODEL` is not set.
pub const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-flash";

/// Public Gemini REST endpoint.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_GEMINI_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Accepted names for the Gemini API key, in lookup order.
const API_KEY_VARS: [&str; 2] = ["GOOGLE_AI_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub common: core_config::Config,
    pub models: ModelConfig,
    pub gemini: GeminiSettings,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Model identifier passed to the upstream API (e.g., gemini-1.5-flash)
    pub chat_model: String,
    /// Whether the search-grounding tool is attached to each generation
    pub search_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Secret<String>,
    pub api_base: String,
    pub connect_timeout_secs: u64,
}

impl GeminiSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub otlp_endpoint: String,
    pub log_level: String,
}

impl RelayConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(RelayConfig {
            common: common_config,
            models: ModelConfig {
                chat_model: get_env("CHAT_MODEL", Some(DEFAULT_CHAT_MODEL), is_prod)?,
                search_enabled: parse_bool(&get_env(
                    "CHAT_SEARCH_ENABLED",
                    Some("true"),
                    is_prod,
                )?),
            },
            gemini: GeminiSettings {
                api_key: Secret::new(get_first_env(&API_KEY_VARS, is_prod)?),
                api_base: get_env("GEMINI_API_BASE", Some(DEFAULT_GEMINI_API_BASE), is_prod)?,
                connect_timeout_secs: parse_secs(
                    "GEMINI_CONNECT_TIMEOUT_SECS",
                    &get_env(
                        "GEMINI_CONNECT_TIMEOUT_SECS",
                        Some(&DEFAULT_GEMINI_CONNECT_TIMEOUT_SECS.to_string()),
                        is_prod,
                    )?,
                )?,
            },
            observability: ObservabilityConfig {
                otlp_endpoint: get_env("OTLP_ENDPOINT", Some("http://tempo:4317"), false)?,
                log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            },
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_secs(key: &str, value: &str) -> Result<u64, AppError> {
    value.trim().parse().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(
            "{} must be a whole number of seconds, got {:?}: {}",
            key,
            value,
            e
        ))
    })
}

/// First of `keys` that is set. Required whenever none is.
fn get_first_env(keys: &[&str], is_prod: bool) -> Result<String, AppError> {
    keys.iter()
        .find_map(|key| env::var(key).ok())
        .ok_or_else(|| {
            let names = keys.join(" or ");
            if is_prod {
                AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    names
                ))
            } else {
                AppError::ConfigError(anyhow::anyhow!("{} is required but not set", names))
            }
        })
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" 1 "));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn get_env_falls_back_to_default_outside_prod() {
        let value = get_env("CHAT_RELAY_TEST_UNSET_KEY", Some("fallback"), false).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn get_env_requires_value_in_prod() {
        let result = get_env("CHAT_RELAY_TEST_UNSET_KEY", Some("fallback"), true);
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn get_env_without_default_is_an_error() {
        let result = get_env("CHAT_RELAY_TEST_UNSET_KEY", None, false);
        assert!(result.is_err());
    }

    #[test]
    fn connect_timeout_must_be_numeric() {
        assert_eq!(parse_secs("GEMINI_CONNECT_TIMEOUT_SECS", " 45 ").unwrap(), 45);
        assert!(matches!(
            parse_secs("GEMINI_CONNECT_TIMEOUT_SECS", "thirty"),
            Err(AppError::ConfigError(_))
        ));
        assert!(matches!(
            parse_secs("GEMINI_CONNECT_TIMEOUT_SECS", "-5"),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn api_key_lookup_prefers_earlier_names() {
        let keys = ["CHAT_RELAY_TEST_KEY_PRIMARY", "CHAT_RELAY_TEST_KEY_FALLBACK"];
        env::set_var(keys[1], "fallback-key");
        assert_eq!(get_first_env(&keys, false).unwrap(), "fallback-key");

        env::set_var(keys[0], "primary-key");
        assert_eq!(get_first_env(&keys, true).unwrap(), "primary-key");

        env::remove_var(keys[0]);
        env::remove_var(keys[1]);
    }

    #[test]
    fn api_key_is_required_when_no_name_is_set() {
        let keys = ["CHAT_RELAY_TEST_UNSET_A", "CHAT_RELAY_TEST_UNSET_B"];
        assert!(matches!(
            get_first_env(&keys, false),
            Err(AppError::ConfigError(_))
        ));
    }
}
