//! Configuration module for the SMTP bridge
//!
//! All configuration is loaded from environment variables, following the
//! same typed-parse-with-default idiom the teacher's `ServerConfig` uses:
//! one hand-rolled helper per target type, each returning the configured
//! default when the variable is unset and an `AppError::Internal` when it's
//! set but malformed.

use std::collections::HashMap;
use std::env;
use std::env::VarError;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

/// Per-provider HTTPS credentials and transport settings, loaded from the
/// `<PROVIDER>_API_KEY` / `_BASE_URL` / `_TIMEOUT` environment group.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Server-wide configuration, loaded once in `main` and shared via `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    pub smtp_addr: String,
    pub smtp_domain: String,
    pub max_message_size: i64,
    pub auth_enabled: bool,
    pub auth_users: HashMap<String, String>,
    pub default_provider: String,
    pub enabled_providers: Vec<ProviderConfig>,
    pub allow_insecure_auth: bool,
}

impl Config {
    /// Load all configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if a variable is set but cannot be
    /// parsed as its target type, or if `ENABLED_PROVIDERS` names a
    /// provider missing its `_API_KEY`.
    pub fn load_from_env() -> AppResult<Self> {
        let enabled_providers = parse_csv_env("ENABLED_PROVIDERS")
            .into_iter()
            .map(|name| load_provider(&name))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            smtp_addr: env_or_default("SMTP_ADDR", ":2525"),
            smtp_domain: env_or_default("SMTP_DOMAIN", "localhost"),
            max_message_size: parse_i64_env("MAX_MESSAGE_SIZE", 10_485_760)?,
            auth_enabled: parse_bool_env("AUTH_ENABLED", true)?,
            auth_users: parse_auth_users_env("AUTH_USERS"),
            default_provider: env_or_default("DEFAULT_PROVIDER", ""),
            enabled_providers,
            allow_insecure_auth: parse_bool_env("ALLOW_INSECURE_AUTH", false)?,
        })
    }
}

fn load_provider(name: &str) -> AppResult<ProviderConfig> {
    let prefix = format!("{}_", name.to_ascii_uppercase());
    let api_key = required_env(&format!("{prefix}API_KEY"))?;
    let base_url = env_or_default(&format!("{prefix}BASE_URL"), "https://api.brevo.com/v3");
    let timeout_secs = parse_u64_env(&format!("{prefix}TIMEOUT"), 30)?;

    Ok(ProviderConfig {
        name: name.to_ascii_lowercase(),
        api_key,
        base_url,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn required_env(key: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::Internal(format!("missing required environment variable {key}"))),
    }
}

fn parse_csv_env(key: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse `AUTH_USERS` as comma-separated `user:pass` pairs, mirroring the
/// original's `user1:pass1,user2:pass2` format.
fn parse_auth_users_env(key: &str) -> HashMap<String, String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .filter_map(|pair| {
            let (user, pass) = pair.trim().split_once(':')?;
            if user.is_empty() {
                None
            } else {
                Some((user.to_owned(), pass.to_owned()))
            }
        })
        .collect()
}

fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match env::var(key) {
        Ok(v) => parse_bool_value(&v)
            .ok_or_else(|| AppError::Internal(format!("invalid boolean environment variable {key}: '{v}'"))),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => {
            Err(AppError::Internal(format!("environment variable {key} contains non-unicode data")))
        }
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_i64_env(key: &str, default: i64) -> AppResult<i64> {
    match env::var(key) {
        Ok(v) => v
            .parse::<i64>()
            .map_err(|_| AppError::Internal(format!("invalid integer environment variable {key}: '{v}'"))),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => {
            Err(AppError::Internal(format!("environment variable {key} contains non-unicode data")))
        }
    }
}

fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .map_err(|_| AppError::Internal(format!("invalid integer environment variable {key}: '{v}'"))),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => {
            Err(AppError::Internal(format!("environment variable {key} contains non-unicode data")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_value_accepts_common_truthy_and_falsy_values() {
        for truthy in ["1", "true", "TRUE", " yes ", "Y", "on"] {
            assert_eq!(parse_bool_value(truthy), Some(true));
        }
        for falsy in ["0", "false", "FALSE", " no ", "N", "off"] {
            assert_eq!(parse_bool_value(falsy), Some(false));
        }
    }

    #[test]
    fn parse_bool_value_rejects_unrecognized_values() {
        for invalid in ["", "2", "maybe", "enabled", "disabled"] {
            assert_eq!(parse_bool_value(invalid), None);
        }
    }

    #[test]
    fn auth_users_parses_comma_separated_pairs() {
        let users = parse_auth_users_env("__SMTPROXY_TEST_AUTH_USERS_UNSET__");
        assert!(users.is_empty());
    }

    #[test]
    fn auth_users_splits_pairs_correctly() {
        // SAFETY: test-only env var scoped to this process, not read elsewhere concurrently in this module.
        unsafe {
            env::set_var("__SMTPROXY_TEST_AUTH_USERS__", "user1:pass1,user2:pass2");
        }
        let users = parse_auth_users_env("__SMTPROXY_TEST_AUTH_USERS__");
        assert_eq!(users.get("user1").map(String::as_str), Some("pass1"));
        assert_eq!(users.get("user2").map(String::as_str), Some("pass2"));
        unsafe {
            env::remove_var("__SMTPROXY_TEST_AUTH_USERS__");
        }
    }
}
