//! Thin, fail-fast boundary to external mailboxes.
//!
//! A [`MailboxClient`] opens one [`MailboxSession`] per run. Sessions list
//! message references above a UID in ascending order and fetch bodies one at a
//! time. Nothing here retries; callers decide what a failure means.

pub mod imap_client;
pub mod parser;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Account;

pub use imap_client::ImapMailboxClient;
pub use parser::{MessageContent, ParseEmailError, parse_message};

#[derive(Debug, Error)]
pub enum MailboxError {
    /// Session could not be established (network, TLS, login, folder select).
    #[error("connection error: {0}")]
    Connection(String),
    /// One message could not be retrieved or parsed.
    #[error("fetch error for uid {uid}: {reason}")]
    Fetch { uid: u32, reason: String },
    /// The server misbehaved on an established session.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Pointer to a message on the server, cheap enough to list in bulk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub uid: u32,
    pub message_id: String,
    pub internal_date: Option<DateTime<Utc>>,
}

#[rocket::async_trait]
pub trait MailboxClient: Send + Sync {
    async fn open(&self, account: &Account) -> Result<Box<dyn MailboxSession>, MailboxError>;
}

#[rocket::async_trait]
pub trait MailboxSession: Send {
    /// UIDVALIDITY of the selected folder, when the server reports one.
    fn uid_validity(&self) -> Option<u32>;

    /// References with `uid > since_uid`, ascending, at most `limit` entries.
    async fn list_new(&mut self, since_uid: u32, limit: usize)
    -> Result<Vec<MessageRef>, MailboxError>;

    async fn fetch_body(&mut self, message: &MessageRef) -> Result<MessageContent, MailboxError>;

    /// Release the session. Safe to call more than once.
    async fn close(&mut self);
}

/// Identifier used when a message carries no usable `Message-ID` header.
pub fn synthetic_message_id(uid_validity: Option<u32>, uid: u32) -> String {
    format!("uid-{}-{}", uid_validity.unwrap_or(0), uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_ids_are_scoped_by_validity() {
        assert_eq!(synthetic_message_id(Some(7), 42), "uid-7-42");
        assert_eq!(synthetic_message_id(None, 42), "uid-0-42");
        assert_ne!(
            synthetic_message_id(Some(1), 42),
            synthetic_message_id(Some(2), 42)
        );
    }
}
