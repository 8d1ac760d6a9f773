//! Per-account sync core.
//!
//! Drives one account through open → list → dedup → fetch → persist → cursor
//! → log for a single mode. The cursor is written only after the messages it
//! covers are stored, so a crash anywhere repeats work instead of losing it.
//!
//! Failure policy:
//! - the session cannot be opened, or listing fails: the run fails, the
//!   cursor is untouched
//! - one message cannot be fetched or parsed: it is skipped and recorded in
//!   the log row, the batch continues
//! - any store write fails: the run fails, the cursor is untouched
//!
//! Every run appends exactly one sync log row, success or not.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::Instant;

use crate::models::{Account, MessageRecord, NewSyncLog, RunResult, SyncCursor, SyncMode};
use crate::sync::cursor::{self, HandledMessage};
use crate::sync::mailbox::{MailboxClient, MailboxError, MailboxSession, MessageContent, MessageRef};
use crate::sync::store::{StoreError, SyncStore};

/// Longest error text kept in a log row.
const MAX_LOG_ERROR_LEN: usize = 2_000;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
    #[error("persistence error: {0}")]
    Store(#[from] StoreError),
}

/// What the batch loop achieved before it stopped.
#[derive(Debug, Default)]
struct BatchProgress {
    uid_validity: Option<u32>,
    validity_reset: bool,
    handled: Vec<HandledMessage>,
    new_count: u32,
    skipped: Vec<(u32, String)>,
    deadline_hit: bool,
}

impl BatchProgress {
    fn skipped_summary(&self) -> Option<String> {
        if self.skipped.is_empty() {
            return None;
        }
        let detail = self
            .skipped
            .iter()
            .map(|(uid, reason)| format!("uid {uid}: {reason}"))
            .collect::<Vec<_>>()
            .join("; ");
        Some(truncate(
            format!("skipped {} message(s): {}", self.skipped.len(), detail),
            MAX_LOG_ERROR_LEN,
        ))
    }
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

pub struct AccountSyncer {
    store: Arc<dyn SyncStore>,
    mailbox: Arc<dyn MailboxClient>,
    recent_id_window: usize,
}

impl AccountSyncer {
    pub fn new(
        store: Arc<dyn SyncStore>,
        mailbox: Arc<dyn MailboxClient>,
        recent_id_window: usize,
    ) -> Self {
        Self {
            store,
            mailbox,
            recent_id_window,
        }
    }

    /// Synchronize one account.
    ///
    /// Never returns an error: failures come back as `success: false` with
    /// the reason, after the failed run has been logged. `deadline` stops the
    /// batch early; whatever was stored by then is kept and the cursor moves
    /// over it.
    pub async fn sync_account(
        &self,
        account: &Account,
        mode: SyncMode,
        limit: u32,
        deadline: Option<Instant>,
    ) -> RunResult {
        let started_at = Utc::now();
        log::info!(
            "account {} ({}): {} sync started, limit {}",
            account.id,
            account.name,
            mode,
            limit
        );

        let stored = match self.store.get_cursor(account.id).await {
            Ok(cursor) => cursor,
            Err(e) => {
                return self
                    .finish_failed(account, mode, started_at, &BatchProgress::default(), e.into())
                    .await;
            }
        };

        let mut session = match self.mailbox.open(account).await {
            Ok(session) => session,
            Err(e) => {
                return self
                    .finish_failed(account, mode, started_at, &BatchProgress::default(), e.into())
                    .await;
            }
        };

        let mut progress = BatchProgress::default();
        let outcome = self
            .run_batch(
                account,
                mode,
                limit,
                deadline,
                stored.as_ref(),
                session.as_mut(),
                &mut progress,
            )
            .await;
        session.close().await;

        if let Err(e) = outcome {
            return self
                .finish_failed(account, mode, started_at, &progress, e)
                .await;
        }

        let next = cursor::advance(
            stored.as_ref(),
            account.id,
            progress.uid_validity,
            &progress.handled,
            self.recent_id_window,
            Utc::now(),
        );
        if !progress.handled.is_empty() || progress.validity_reset {
            if let Err(e) = self.store.set_cursor(&next).await {
                return self
                    .finish_failed(account, mode, started_at, &progress, e.into())
                    .await;
            }
        }

        self.finish_ok(account, mode, started_at, &progress, &next)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_batch(
        &self,
        account: &Account,
        mode: SyncMode,
        limit: u32,
        deadline: Option<Instant>,
        stored: Option<&SyncCursor>,
        session: &mut dyn MailboxSession,
        progress: &mut BatchProgress,
    ) -> Result<(), SyncError> {
        progress.uid_validity = session.uid_validity();
        let start = cursor::start_point(stored, mode, progress.uid_validity);
        progress.validity_reset = start.validity_reset;
        if start.validity_reset {
            log::warn!(
                "account {}: UIDVALIDITY changed to {:?}, rescanning from the start",
                account.id,
                progress.uid_validity
            );
        }

        let limit = limit as usize;
        let mut refs = session.list_new(start.since_uid, limit).await?;
        // Ordering is part of the adapter contract; enforce it anyway so the
        // cursor can only ever move forward through the batch.
        refs.retain(|r| r.uid > start.since_uid);
        refs.sort_by_key(|r| r.uid);
        refs.dedup_by_key(|r| r.uid);
        refs.truncate(limit);

        log::debug!(
            "account {}: {} candidate message(s) above uid {}",
            account.id,
            refs.len(),
            start.since_uid
        );

        for message in refs {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::info!(
                    "account {}: time budget reached, deferring remaining messages",
                    account.id
                );
                progress.deadline_hit = true;
                break;
            }

            if start.recent_ids.contains(&message.message_id)
                || self
                    .store
                    .has_message(account.id, &message.message_id)
                    .await?
            {
                progress.handled.push(handled(&message, None));
                continue;
            }

            let content = match session.fetch_body(&message).await {
                Ok(content) => content,
                Err(e) => {
                    log::warn!(
                        "account {}: skipping uid {} ({}): {}",
                        account.id,
                        message.uid,
                        message.message_id,
                        e
                    );
                    progress.skipped.push((message.uid, e.to_string()));
                    continue;
                }
            };

            let record = build_record(account.id, &message, content);
            let sent_at = record.sent_at;
            if self.store.insert_message_if_absent(&record).await? {
                progress.new_count += 1;
            }
            progress.handled.push(handled(&message, Some(sent_at)));
        }

        Ok(())
    }

    async fn finish_ok(
        &self,
        account: &Account,
        mode: SyncMode,
        started_at: DateTime<Utc>,
        progress: &BatchProgress,
        cursor: &SyncCursor,
    ) -> RunResult {
        let entry = NewSyncLog {
            account_id: account.id,
            mode,
            started_at,
            finished_at: Utc::now(),
            success: true,
            new_count: progress.new_count as i32,
            skipped_count: progress.skipped.len() as i32,
            error: progress.skipped_summary(),
        };

        match self.store.append_sync_log(&entry).await {
            Ok(log_id) => {
                log::info!(
                    "account {} ({}): {} sync complete - {} new, {} skipped, cursor uid {}{}",
                    account.id,
                    account.name,
                    mode,
                    progress.new_count,
                    progress.skipped.len(),
                    cursor.last_uid,
                    if progress.deadline_hit { " (deferred rest)" } else { "" }
                );
                RunResult {
                    account_id: account.id,
                    name: account.name.clone(),
                    success: true,
                    new_count: progress.new_count,
                    log_id: Some(log_id),
                    error: None,
                }
            }
            Err(e) => {
                log::error!("account {}: failed to record sync log: {}", account.id, e);
                RunResult {
                    account_id: account.id,
                    name: account.name.clone(),
                    success: false,
                    new_count: progress.new_count,
                    log_id: None,
                    error: Some(format!("failed to record sync log: {e}")),
                }
            }
        }
    }

    async fn finish_failed(
        &self,
        account: &Account,
        mode: SyncMode,
        started_at: DateTime<Utc>,
        progress: &BatchProgress,
        error: SyncError,
    ) -> RunResult {
        let message = error.to_string();
        log::error!(
            "account {} ({}): {} sync failed after {} new message(s): {}",
            account.id,
            account.name,
            mode,
            progress.new_count,
            message
        );

        let entry = NewSyncLog {
            account_id: account.id,
            mode,
            started_at,
            finished_at: Utc::now(),
            success: false,
            new_count: progress.new_count as i32,
            skipped_count: progress.skipped.len() as i32,
            error: Some(truncate(message.clone(), MAX_LOG_ERROR_LEN)),
        };

        let log_id = match self.store.append_sync_log(&entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                log::error!("account {}: failed to record sync log: {}", account.id, e);
                None
            }
        };

        RunResult {
            account_id: account.id,
            name: account.name.clone(),
            success: false,
            new_count: progress.new_count,
            log_id,
            error: Some(message),
        }
    }
}

fn handled(message: &MessageRef, sent_at: Option<DateTime<Utc>>) -> HandledMessage {
    HandledMessage {
        uid: message.uid,
        message_id: message.message_id.clone(),
        date: message.internal_date.or(sent_at),
    }
}

/// The listing id is the key; it is what dedup was checked against.
fn build_record(account_id: i32, message: &MessageRef, content: MessageContent) -> MessageRecord {
    MessageRecord {
        account_id,
        message_id: message.message_id.clone(),
        uid: message.uid,
        subject: content.subject,
        from_name: content.from_name,
        from_address: content.from_address,
        to_addresses: content.to_addresses,
        in_reply_to: content.in_reply_to,
        sent_at: content.sent_at,
        received_at: message.internal_date,
        body_text: content.body_text,
        size_bytes: content.size_bytes,
    }
}
