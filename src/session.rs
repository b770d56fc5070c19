//! SMTP session state machine
//!
//! Drives the verb-by-verb state transitions of one SMTP connection:
//! `Fresh -> Authenticated -> HasSender -> HasRecipients`, with `RSET`
//! folding back to `Authenticated` and a successful `DATA` doing the same.
//! Grounded on the Go original's `session.go`/`auth.go`, translated from the
//! `emersion/go-smtp` `Session` interface callbacks into plain methods the
//! `framing` module's connection loop calls directly.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::dispatch;
use crate::errors::{AppError, AppResult};
use crate::parser;
use crate::registry::Registry;

/// Decodes a SASL PLAIN blob (`\0username\0password`) as sent by `AUTH
/// PLAIN` and by the second leg of `AUTH LOGIN` once both fields are known.
pub fn parse_auth_plain(decoded: &[u8]) -> AppResult<(String, String)> {
    let parts: Vec<&[u8]> = decoded.split(|b| *b == 0).collect();
    if parts.len() != 3 {
        return Err(AppError::InvalidCredentials);
    }
    let username = String::from_utf8_lossy(parts[1]).into_owned();
    let password = String::from_utf8_lossy(parts[2]).into_owned();
    Ok((username, password))
}

/// Shared, connection-independent session configuration. Built once by
/// [`crate::framing::Backend`] and cloned (cheaply, via `Arc`) into every
/// [`Session`].
#[derive(Clone)]
pub struct SessionConfig {
    pub auth_enabled: bool,
    pub auth_users: Arc<HashMap<String, String>>,
    pub max_message_size: i64,
    pub registry: Registry,
}

impl SessionConfig {
    pub fn from_config(config: &Config, registry: Registry) -> Self {
        Self {
            auth_enabled: config.auth_enabled,
            auth_users: Arc::new(config.auth_users.clone()),
            max_message_size: config.max_message_size,
            registry,
        }
    }

    fn check_credentials(&self, username: &str, password: &str) -> bool {
        self.auth_users.get(username).is_some_and(|expected| expected == password)
    }
}

/// Per-connection SMTP verb state machine.
pub struct Session {
    config: SessionConfig,
    auth_identity: Option<String>,
    mail_from: Option<String>,
    rcpt_to: Vec<String>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            auth_identity: None,
            mail_from: None,
            rcpt_to: Vec::new(),
        }
    }

    fn require_identity(&self) -> AppResult<()> {
        if self.config.auth_enabled && self.auth_identity.is_none() {
            Err(AppError::AuthRequired)
        } else {
            Ok(())
        }
    }

    /// Handle `AUTH PLAIN`/`AUTH LOGIN` once the mechanism's payload has
    /// been decoded into `username`/`password` by the framing layer.
    pub fn authenticate(&mut self, username: &str, password: &str) -> AppResult<()> {
        if !self.config.auth_enabled {
            self.auth_identity = Some("anonymous".to_owned());
            return Ok(());
        }

        if self.config.check_credentials(username, password) {
            self.auth_identity = Some(username.to_owned());
            Ok(())
        } else {
            Err(AppError::InvalidCredentials)
        }
    }

    pub fn mail(&mut self, from: String) -> AppResult<()> {
        self.require_identity()?;
        self.mail_from = Some(from);
        Ok(())
    }

    pub fn rcpt(&mut self, to: String) -> AppResult<()> {
        self.require_identity()?;
        self.rcpt_to.push(to);
        Ok(())
    }

    /// Consume the DATA payload: parse it, dispatch it to the default
    /// provider, and reset transaction state on success.
    pub async fn data(&mut self, raw: &[u8]) -> AppResult<()> {
        self.require_identity()?;

        if self.mail_from.is_none() {
            return Err(AppError::ProtocolState("no sender specified".to_owned()));
        }
        if self.rcpt_to.is_empty() {
            return Err(AppError::ProtocolState("no recipients specified".to_owned()));
        }

        if raw.len() as i64 > self.config.max_message_size {
            return Err(AppError::SizeExceeded);
        }

        let message = parser::parse_message(raw, self.config.max_message_size)?;
        dispatch::dispatch(&self.config.registry, &message, "").await?;

        self.mail_from = None;
        self.rcpt_to.clear();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.mail_from = None;
        self.rcpt_to.clear();
    }

    pub fn logout(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NeutralMessage;
    use crate::provider::Provider;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct AcceptingProvider;

    #[async_trait]
    impl Provider for AcceptingProvider {
        fn name(&self) -> &str {
            "stub"
        }
        async fn send(&self, _msg: &NeutralMessage) -> AppResult<()> {
            Ok(())
        }
        async fn health(&self) -> AppResult<()> {
            Ok(())
        }
    }

    fn session_config(auth_enabled: bool) -> SessionConfig {
        let registry = Registry::new();
        registry.register(Arc::new(AcceptingProvider)).unwrap();
        let mut users = HashMap::new();
        users.insert("user1".to_owned(), "pass1".to_owned());
        SessionConfig {
            auth_enabled,
            auth_users: Arc::new(users),
            max_message_size: 1_000_000,
            registry,
        }
    }

    #[test]
    fn parse_auth_plain_extracts_username_and_password() {
        let (user, pass) = parse_auth_plain(b"\0user1\0pass1").unwrap();
        assert_eq!(user, "user1");
        assert_eq!(pass, "pass1");
    }

    #[test]
    fn parse_auth_plain_rejects_malformed_payload() {
        assert!(parse_auth_plain(b"not-the-right-shape").is_err());
    }

    #[test]
    fn mail_before_auth_is_rejected_when_auth_enabled() {
        let mut session = Session::new(session_config(true));
        assert!(matches!(session.mail("a@x".into()), Err(AppError::AuthRequired)));
    }

    #[test]
    fn disabled_auth_grants_anonymous_identity() {
        let mut session = Session::new(session_config(false));
        session.authenticate("", "").unwrap();
        assert!(session.mail("a@x".into()).is_ok());
    }

    #[tokio::test]
    async fn data_without_sender_reports_protocol_state() {
        let mut session = Session::new(session_config(false));
        session.authenticate("", "").unwrap();
        session.rcpt("b@y".into()).unwrap();
        let err = session.data(b"Subject: hi\r\n\r\nbody").await.unwrap_err();
        assert!(matches!(err, AppError::ProtocolState(ref m) if m == "no sender specified"));
    }

    #[tokio::test]
    async fn successful_data_resets_transaction_state() {
        let mut session = Session::new(session_config(false));
        session.authenticate("", "").unwrap();
        session.mail("a@x".into()).unwrap();
        session.rcpt("b@y".into()).unwrap();
        session.data(b"Subject: hi\r\n\r\nbody").await.unwrap();

        let err = session.data(b"Subject: hi\r\n\r\nbody").await.unwrap_err();
        assert!(matches!(err, AppError::ProtocolState(ref m) if m == "no sender specified"));
    }

    #[tokio::test]
    async fn oversize_data_is_rejected() {
        let mut session = Session::new(session_config(false));
        session.authenticate("", "").unwrap();
        session.mail("a@x".into()).unwrap();
        session.rcpt("b@y".into()).unwrap();
        session.config.max_message_size = 10;
        let err = session.data(&vec![b'a'; 200]).await.unwrap_err();
        assert!(matches!(err, AppError::SizeExceeded));
    }
}
