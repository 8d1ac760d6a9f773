//! IMAP implementation of the mailbox contract.
//!
//! The `imap` crate is synchronous, so every round trip runs on the blocking
//! pool. The session is moved into the blocking task and handed back when the
//! call returns, which keeps exactly one owner at any time.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use imap::{ClientBuilder, ConnectionMode, TlsKind};
use mailparse::MailHeaderMap;

use super::parser::{normalize_message_id, parse_message};
use super::{
    MailboxClient, MailboxError, MailboxSession, MessageContent, MessageRef,
    synthetic_message_id,
};
use crate::models::Account;

type ImapSession = imap::Session<imap::Connection>;

/// UIDs per header FETCH command.
const HEADER_FETCH_CHUNK: usize = 100;

#[derive(Debug, Default, Clone)]
pub struct ImapMailboxClient;

impl ImapMailboxClient {
    pub fn new() -> Self {
        Self
    }
}

#[rocket::async_trait]
impl MailboxClient for ImapMailboxClient {
    async fn open(&self, account: &Account) -> Result<Box<dyn MailboxSession>, MailboxError> {
        let settings = account.mailbox.clone();
        let account_id = account.id;

        let (session, uid_validity) = tokio::task::spawn_blocking(move || {
            let mode = if settings.use_tls {
                ConnectionMode::Tls
            } else {
                ConnectionMode::Plaintext
            };

            let client = ClientBuilder::new(settings.host.as_str(), settings.port)
                .tls_kind(TlsKind::Native)
                .mode(mode)
                .connect()
                .map_err(|e| {
                    MailboxError::Connection(format!(
                        "connect to {}:{} failed: {}",
                        settings.host, settings.port, e
                    ))
                })?;

            let mut session = client
                .login(&settings.username, &settings.password)
                .map_err(|(e, _client)| MailboxError::Connection(format!("login failed: {e}")))?;

            let mailbox = match session.select(&settings.folder) {
                Ok(mailbox) => mailbox,
                Err(e) => {
                    let _ = session.logout();
                    return Err(MailboxError::Connection(format!(
                        "select '{}' failed: {}",
                        settings.folder, e
                    )));
                }
            };

            Ok((session, mailbox.uid_validity))
        })
        .await
        .map_err(|e| MailboxError::Connection(format!("mailbox task failed: {e}")))??;

        log::debug!(
            "account {}: imap session open (uidvalidity {:?})",
            account_id,
            uid_validity
        );

        Ok(Box::new(ImapMailboxSession {
            session: Some(session),
            uid_validity,
        }))
    }
}

pub struct ImapMailboxSession {
    session: Option<ImapSession>,
    uid_validity: Option<u32>,
}

impl ImapMailboxSession {
    /// Run `op` against the session on the blocking pool.
    async fn with_session<T, F>(&mut self, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, MailboxError> + Send + 'static,
    {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| MailboxError::Protocol("session already closed".into()))?;

        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut session);
            (session, result)
        })
        .await
        .map_err(|e| MailboxError::Protocol(format!("mailbox task failed: {e}")))?;

        self.session = Some(session);
        result
    }
}

fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(|uid| uid.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// `n:*` always matches the highest UID, even below `n`; callers must filter.
fn select_new_uids(found: HashSet<u32>, since_uid: u32, limit: usize) -> Vec<u32> {
    let mut uids: Vec<u32> = found.into_iter().filter(|uid| *uid > since_uid).collect();
    uids.sort_unstable();
    uids.truncate(limit);
    uids
}

#[rocket::async_trait]
impl MailboxSession for ImapMailboxSession {
    fn uid_validity(&self) -> Option<u32> {
        self.uid_validity
    }

    async fn list_new(
        &mut self,
        since_uid: u32,
        limit: usize,
    ) -> Result<Vec<MessageRef>, MailboxError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let uid_validity = self.uid_validity;

        self.with_session(move |session| {
            let query = format!("UID {}:*", since_uid.saturating_add(1));
            let found = session
                .uid_search(&query)
                .map_err(|e| MailboxError::Protocol(format!("uid search failed: {e}")))?;

            let uids = select_new_uids(found, since_uid, limit);
            let mut refs = Vec::with_capacity(uids.len());

            for chunk in uids.chunks(HEADER_FETCH_CHUNK) {
                let fetches = session
                    .uid_fetch(uid_set(chunk), "(UID INTERNALDATE BODY.PEEK[HEADER])")
                    .map_err(|e| MailboxError::Protocol(format!("header fetch failed: {e}")))?;

                for fetch in fetches.iter() {
                    let Some(uid) = fetch.uid else { continue };
                    let message_id = fetch
                        .header()
                        .and_then(|raw| mailparse::parse_headers(raw).ok())
                        .and_then(|(headers, _)| {
                            normalize_message_id(headers.get_first_value("Message-ID"))
                        })
                        .unwrap_or_else(|| synthetic_message_id(uid_validity, uid));

                    refs.push(MessageRef {
                        uid,
                        message_id,
                        internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
                    });
                }
            }

            refs.sort_by_key(|r| r.uid);
            Ok(refs)
        })
        .await
    }

    async fn fetch_body(&mut self, message: &MessageRef) -> Result<MessageContent, MailboxError> {
        let uid = message.uid;
        let raw = self
            .with_session(move |session| {
                let fetches = session
                    .uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")
                    .map_err(|e| MailboxError::Fetch {
                        uid,
                        reason: e.to_string(),
                    })?;
                fetches
                    .iter()
                    .find_map(|f| f.body().map(|b| b.to_vec()))
                    .ok_or_else(|| MailboxError::Fetch {
                        uid,
                        reason: "server returned no body".into(),
                    })
            })
            .await?;

        let internal_date: Option<DateTime<Utc>> = message.internal_date;
        parse_message(&raw, internal_date).map_err(|e| MailboxError::Fetch {
            uid,
            reason: e.to_string(),
        })
    }

    async fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let outcome = tokio::task::spawn_blocking(move || session.logout()).await;
        match outcome {
            Ok(Ok(())) => log::debug!("imap session closed"),
            Ok(Err(e)) => log::debug!("imap logout failed: {}", e),
            Err(e) => log::warn!("imap logout task failed: {}", e),
        }
    }
}
