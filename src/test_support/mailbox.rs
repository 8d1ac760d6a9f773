//! Scripted mailbox double.
//!
//! Folders live behind a shared lock so tests can add messages, swap
//! UIDVALIDITY, or inject failures between runs while sessions are reused.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::models::{Account, MailboxSettings, SyncPolicy};
use crate::sync::mailbox::{
    MailboxClient, MailboxError, MailboxSession, MessageContent, MessageRef, parse_message,
};

/// Account pointing at a mailbox that only exists in the scripted double.
pub fn test_account(id: i32, name: &str) -> Account {
    Account {
        id,
        name: name.to_string(),
        active: true,
        mailbox: MailboxSettings {
            host: "imap.test.invalid".to_string(),
            port: 993,
            username: format!("account{id}@test.invalid"),
            password: "secret".to_string(),
            folder: "INBOX".to_string(),
            use_tls: true,
        },
        policy: SyncPolicy::default(),
    }
}

#[derive(Debug, Clone)]
struct ScriptedMessage {
    message_id: String,
    raw: Vec<u8>,
    internal_date: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Folder {
    uid_validity: Option<u32>,
    messages: BTreeMap<u32, ScriptedMessage>,
    fail_open: Option<String>,
    fail_listing: Option<String>,
    fail_fetch: HashSet<u32>,
    fetch_delay: Option<Duration>,
    panic_on_open: bool,
}

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Default, Clone)]
pub struct ScriptedMailbox {
    folders: Arc<Mutex<HashMap<i32, Folder>>>,
    counters: Arc<Counters>,
}

impl ScriptedMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain-text message at `uid` with the given `Message-ID`.
    pub fn add_message(&self, account_id: i32, uid: u32, message_id: &str) {
        let internal_date = Utc
            .with_ymd_and_hms(2025, 3, 1, 8, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
            + chrono::Duration::minutes(i64::from(uid));
        let raw = format!(
            "Message-ID: <{message_id}>\r\n\
             Subject: Message {uid}\r\n\
             From: Sender {uid} <sender{uid}@test.invalid>\r\n\
             To: inbox@test.invalid\r\n\
             Date: {}\r\n\
             \r\n\
             Body of message {uid}.\r\n",
            internal_date.to_rfc2822()
        );
        self.add_raw(account_id, uid, message_id, raw.into_bytes(), internal_date);
    }

    /// Add arbitrary message bytes. `message_id` is what listing reports.
    pub fn add_raw(
        &self,
        account_id: i32,
        uid: u32,
        message_id: &str,
        raw: Vec<u8>,
        internal_date: DateTime<Utc>,
    ) {
        self.folders.lock().entry(account_id).or_default().messages.insert(
            uid,
            ScriptedMessage {
                message_id: message_id.to_string(),
                raw,
                internal_date,
            },
        );
    }

    pub fn set_uid_validity(&self, account_id: i32, uid_validity: u32) {
        self.folders.lock().entry(account_id).or_default().uid_validity = Some(uid_validity);
    }

    /// Drop every message and switch to a new UIDVALIDITY.
    pub fn reset_folder(&self, account_id: i32, uid_validity: u32) {
        let mut folders = self.folders.lock();
        let folder = folders.entry(account_id).or_default();
        folder.messages.clear();
        folder.uid_validity = Some(uid_validity);
    }

    pub fn fail_open(&self, account_id: i32, reason: &str) {
        self.folders.lock().entry(account_id).or_default().fail_open = Some(reason.to_string());
    }

    pub fn fail_listing(&self, account_id: i32, reason: &str) {
        self.folders.lock().entry(account_id).or_default().fail_listing =
            Some(reason.to_string());
    }

    pub fn fail_fetch(&self, account_id: i32, uid: u32) {
        self.folders
            .lock()
            .entry(account_id)
            .or_default()
            .fail_fetch
            .insert(uid);
    }

    /// Make every body fetch take `delay` (on the tokio clock).
    pub fn delay_fetch(&self, account_id: i32, delay: Duration) {
        self.folders.lock().entry(account_id).or_default().fetch_delay = Some(delay);
    }

    pub fn panic_on_open(&self, account_id: i32) {
        self.folders.lock().entry(account_id).or_default().panic_on_open = true;
    }

    pub fn open_count(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Sessions opened but not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.open_count().saturating_sub(self.close_count())
    }
}

#[rocket::async_trait]
impl MailboxClient for ScriptedMailbox {
    async fn open(&self, account: &Account) -> Result<Box<dyn MailboxSession>, MailboxError> {
        let (uid_validity, fail, panic) = {
            let folders = self.folders.lock();
            match folders.get(&account.id) {
                Some(folder) => (
                    folder.uid_validity,
                    folder.fail_open.clone(),
                    folder.panic_on_open,
                ),
                None => (None, None, false),
            }
        };

        if panic {
            panic!("scripted panic opening account {}", account.id);
        }
        if let Some(reason) = fail {
            return Err(MailboxError::Connection(reason));
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            account_id: account.id,
            uid_validity,
            folders: self.folders.clone(),
            counters: self.counters.clone(),
            closed: false,
        }))
    }
}

struct ScriptedSession {
    account_id: i32,
    uid_validity: Option<u32>,
    folders: Arc<Mutex<HashMap<i32, Folder>>>,
    counters: Arc<Counters>,
    closed: bool,
}

#[rocket::async_trait]
impl MailboxSession for ScriptedSession {
    fn uid_validity(&self) -> Option<u32> {
        self.uid_validity
    }

    async fn list_new(
        &mut self,
        since_uid: u32,
        limit: usize,
    ) -> Result<Vec<MessageRef>, MailboxError> {
        let folders = self.folders.lock();
        let Some(folder) = folders.get(&self.account_id) else {
            return Ok(Vec::new());
        };
        if let Some(reason) = &folder.fail_listing {
            return Err(MailboxError::Protocol(reason.clone()));
        }

        Ok(folder
            .messages
            .range(since_uid.saturating_add(1)..)
            .take(limit)
            .map(|(uid, message)| MessageRef {
                uid: *uid,
                message_id: message.message_id.clone(),
                internal_date: Some(message.internal_date),
            })
            .collect())
    }

    async fn fetch_body(&mut self, message: &MessageRef) -> Result<MessageContent, MailboxError> {
        let (raw, delay) = {
            let folders = self.folders.lock();
            let folder = folders.get(&self.account_id);
            if folder.is_some_and(|f| f.fail_fetch.contains(&message.uid)) {
                return Err(MailboxError::Fetch {
                    uid: message.uid,
                    reason: "scripted fetch failure".into(),
                });
            }
            let raw = folder
                .and_then(|f| f.messages.get(&message.uid))
                .map(|m| m.raw.clone())
                .ok_or_else(|| MailboxError::Fetch {
                    uid: message.uid,
                    reason: "message expunged".into(),
                })?;
            (raw, folder.and_then(|f| f.fetch_delay))
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        parse_message(&raw, message.internal_date).map_err(|e| MailboxError::Fetch {
            uid: message.uid,
            reason: e.to_string(),
        })
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
