//! Application error model with SMTP reply-code mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error
//! handling, and maps each variant to the SMTP reply line a session returns
//! to the client. Upstream provider failures are not pre-classified at the
//! point they're raised; they carry raw text and are classified later by
//! [`crate::dispatch`]'s substring table, matching how the upstream APIs
//! themselves report failure (free-text messages, not a fixed taxonomy).

use thiserror::Error;

/// Application error type.
///
/// Covers every error case the bridge may encounter, from protocol-state
/// violations in the SMTP session to upstream provider failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// MAIL/RCPT/DATA attempted before a successful AUTH, while auth is
    /// required.
    #[error("authentication required")]
    AuthRequired,
    /// AUTH with unknown username or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// AUTH attempted on a connection not permitted to carry credentials,
    /// per `ALLOW_INSECURE_AUTH`.
    #[error("encryption required for requested authentication mechanism")]
    EncryptionRequired,
    /// DATA issued before MAIL, or before any RCPT.
    #[error("{0}")]
    ProtocolState(String),
    /// DATA stream exceeded the configured size cap.
    #[error("message exceeds maximum allowed size")]
    SizeExceeded,
    /// MIME parser could not extract headers from the message.
    #[error("failed to parse message: {0}")]
    ParseFailed(String),
    /// Provider name referenced by the client or configuration is not
    /// registered.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    /// No default provider has been configured.
    #[error("no default provider configured")]
    NoDefaultProvider,
    /// Raw failure text from an upstream provider call, not yet classified.
    #[error("{0}")]
    Upstream(String),
    /// Configuration, I/O, or other failures that have no SMTP-facing
    /// translation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Translate this error into the SMTP reply line a session returns to
    /// the client. Permanent failures use `550`; transient ones use `451`.
    pub fn smtp_reply(&self) -> String {
        match self {
            Self::AuthRequired => "530 Authentication required".to_owned(),
            Self::InvalidCredentials => "535 invalid credentials".to_owned(),
            Self::EncryptionRequired => {
                "538 Encryption required for requested authentication mechanism".to_owned()
            }
            Self::ProtocolState(msg) => format!("503 {msg}"),
            Self::SizeExceeded => "552 message exceeds maximum allowed size".to_owned(),
            Self::ParseFailed(msg) => format!("451 failed to parse message: {msg}"),
            Self::UnknownProvider(name) => format!("451 unknown provider: {name}"),
            Self::NoDefaultProvider => "451 no default provider configured".to_owned(),
            Self::Upstream(text) => crate::dispatch::translate_upstream_error(text),
            Self::Internal(msg) => format!("451 internal error: {msg}"),
        }
    }
}

/// Type alias for fallible return values used throughout the crate.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_required_maps_to_530() {
        assert!(AppError::AuthRequired.smtp_reply().starts_with("530"));
    }

    #[test]
    fn encryption_required_maps_to_538() {
        assert!(AppError::EncryptionRequired.smtp_reply().starts_with("538"));
    }

    #[test]
    fn size_exceeded_maps_to_552() {
        assert!(AppError::SizeExceeded.smtp_reply().starts_with("552"));
    }

    #[test]
    fn protocol_state_carries_message() {
        let err = AppError::ProtocolState("no sender specified".to_owned());
        assert_eq!(err.smtp_reply(), "503 no sender specified");
    }
}
