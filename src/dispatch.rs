//! Dispatcher: logging and error translation around registry sends
//!
//! Thin layer over [`crate::registry::Registry`] that logs outcomes and
//! translates free-text upstream error messages into SMTP reply codes,
//! following the case-insensitive substring table from the Go original's
//! `dispatcher.go`, ported to `str::to_lowercase`/`str::contains` rather than
//! hand-rolled helpers.

use crate::errors::{AppError, AppResult};
use crate::model::NeutralMessage;
use crate::registry::Registry;

/// Translate a provider's raw error text into the SMTP reply line a session
/// should return. First matching substring wins; the ordering mirrors the
/// Go original precisely so operator-visible behaviour doesn't drift.
pub fn translate_upstream_error(text: &str) -> String {
    let lower = text.to_lowercase();

    const PERMANENT_AUTH: &[&str] = &["authentication", "unauthorized", "invalid key", "forbidden"];
    const TRANSIENT_RATE: &[&str] = &["rate limit", "quota", "throttle"];
    const PERMANENT_ADDR: &[&str] = &["invalid email", "invalid recipient", "bad address"];
    const TRANSIENT_TIMEOUT: &[&str] = &["timeout", "deadline"];
    const TRANSIENT_UNAVAILABLE: &[&str] = &["service unavailable", "maintenance"];

    if PERMANENT_AUTH.iter().any(|s| lower.contains(s)) {
        return "550 Authentication failed".to_owned();
    }
    if TRANSIENT_RATE.iter().any(|s| lower.contains(s)) {
        return "451 Rate limit exceeded, try again later".to_owned();
    }
    if PERMANENT_ADDR.iter().any(|s| lower.contains(s)) {
        return "550 Invalid recipient address".to_owned();
    }
    if TRANSIENT_TIMEOUT.iter().any(|s| lower.contains(s)) {
        return "451 Timeout occurred, try again later".to_owned();
    }
    if TRANSIENT_UNAVAILABLE.iter().any(|s| lower.contains(s)) {
        return "451 Service temporarily unavailable".to_owned();
    }

    format!("451 Temporary failure: {text}")
}

/// Dispatch a parsed message to the named provider (or the registry's
/// default, if `provider_name` is empty), logging the outcome either way.
pub async fn dispatch(
    registry: &Registry,
    msg: &NeutralMessage,
    provider_name: &str,
) -> AppResult<()> {
    if provider_name.is_empty() {
        tracing::info!("dispatching message to default provider");
    } else {
        tracing::info!(provider = provider_name, "dispatching message");
    }

    let outcome = registry.send(msg, provider_name).await;

    match outcome.result {
        Ok(()) => {
            tracing::info!(provider = %outcome.provider_name, "message accepted by provider");
            Ok(())
        }
        Err(err) => {
            tracing::warn!(provider = %outcome.provider_name, error = %err, "message rejected by provider");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_authentication_failures() {
        assert_eq!(
            translate_upstream_error("Authentication failed: bad api key"),
            "550 Authentication failed"
        );
        assert_eq!(
            translate_upstream_error("request FORBIDDEN by policy"),
            "550 Authentication failed"
        );
    }

    #[test]
    fn translates_rate_limit_before_addr() {
        assert_eq!(
            translate_upstream_error("Rate Limit Exceeded, slow down"),
            "451 Rate limit exceeded, try again later"
        );
    }

    #[test]
    fn translates_invalid_address() {
        assert_eq!(
            translate_upstream_error("invalid recipient supplied"),
            "550 Invalid recipient address"
        );
    }

    #[test]
    fn translates_timeout_and_unavailable() {
        assert_eq!(
            translate_upstream_error("context deadline exceeded"),
            "451 Timeout occurred, try again later"
        );
        assert_eq!(
            translate_upstream_error("Service Unavailable, try later"),
            "451 Service temporarily unavailable"
        );
    }

    #[test]
    fn falls_back_to_generic_temporary_failure() {
        assert_eq!(
            translate_upstream_error("something odd happened"),
            "451 Temporary failure: something odd happened"
        );
    }

    #[test]
    fn is_case_and_whitespace_insensitive() {
        let a = translate_upstream_error("RATE LIMIT hit");
        let b = translate_upstream_error("rate limit hit");
        assert_eq!(a, b);
    }
}
