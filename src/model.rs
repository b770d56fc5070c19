//! Neutral message model
//!
//! The provider-agnostic representation every parsed message is normalised
//! into, and that every [`crate::provider::Provider`] sends from. Keeping
//! this type free of both SMTP-wire and provider-wire concerns is what lets
//! the parser and the providers vary independently.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// An email address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub email: String,
    pub display_name: String,
}

impl Address {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: String::new(),
        }
    }

    pub fn with_display_name(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: display_name.into(),
        }
    }
}

/// Message headers normalised out of the raw RFC 5322 header block.
///
/// `custom` retains every header not covered by a dedicated field, in wire
/// order, keyed by the header name as it appeared on the wire.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    pub from: Option<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub message_id: String,
    pub content_type: String,
    pub custom: BTreeMap<String, Vec<String>>,
}

/// A decoded MIME attachment.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub content: Vec<u8>,
}

impl Attachment {
    /// Filename used when a part declares none.
    pub const DEFAULT_FILENAME: &'static str = "attachment";
}

/// The parser's output and every provider's input: a message with no
/// remaining dependency on SMTP or any specific upstream wire format.
#[derive(Debug, Clone, Default)]
pub struct NeutralMessage {
    pub headers: Headers,
    pub text_body: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
    pub raw_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_new_has_empty_display_name() {
        let addr = Address::new("a@example.com");
        assert_eq!(addr.email, "a@example.com");
        assert_eq!(addr.display_name, "");
    }

    #[test]
    fn neutral_message_default_has_no_attachments_or_bodies() {
        let msg = NeutralMessage::default();
        assert!(msg.text_body.is_empty());
        assert!(msg.html_body.is_empty());
        assert!(msg.attachments.is_empty());
    }
}
