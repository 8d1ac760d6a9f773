use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, FromRow};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ===== Accounts =====

/// One configured external mailbox.
///
/// Accounts are created and edited by admin tooling outside this service;
/// the sync engine only ever reads them.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i32,
    pub name: String,
    pub active: bool,
    pub mailbox: MailboxSettings,
    pub policy: SyncPolicy,
}

/// Connection parameters handed to the mailbox adapter as-is.
#[derive(Clone)]
pub struct MailboxSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
    pub use_tls: bool,
}

impl fmt::Debug for MailboxSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("folder", &self.folder)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

/// Per-account overrides of the engine-wide sync settings.
#[derive(Debug, Clone, Default)]
pub struct SyncPolicy {
    /// Replaces the scheduled-run message cap for this account.
    pub batch_limit: Option<u32>,
}

// ===== Sync Mode =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "sync_mode", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Fetch only messages above the stored cursor.
    Incremental,
    /// Rescan from the start of the mailbox, relying on dedup.
    Full,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Incremental => "incremental",
            SyncMode::Full => "full",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "incremental" => Ok(SyncMode::Incremental),
            "full" => Ok(SyncMode::Full),
            other => Err(format!(
                "unsupported sync mode '{other}', expected 'incremental' or 'full'"
            )),
        }
    }
}

// ===== Cursor =====

/// Durable high-water mark for one account.
///
/// `last_uid` is only meaningful together with `uid_validity`: when the
/// server reports a different validity the stored position no longer
/// identifies the same messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    pub account_id: i32,
    pub uid_validity: Option<u32>,
    pub last_uid: u32,
    /// Most recent message ids, newest last.
    pub recent_message_ids: Vec<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_synced_at: DateTime<Utc>,
}

/// Cursor as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CursorSummary {
    #[serde(rename = "accountId")]
    pub account_id: i32,
    #[serde(rename = "uidValidity")]
    pub uid_validity: Option<u32>,
    #[serde(rename = "lastUid")]
    pub last_uid: u32,
    #[serde(rename = "recentMessageCount")]
    pub recent_message_count: usize,
    #[serde(rename = "lastMessageAt")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastSyncedAt")]
    pub last_synced_at: DateTime<Utc>,
}

impl From<&SyncCursor> for CursorSummary {
    fn from(cursor: &SyncCursor) -> Self {
        Self {
            account_id: cursor.account_id,
            uid_validity: cursor.uid_validity,
            last_uid: cursor.last_uid,
            recent_message_count: cursor.recent_message_ids.len(),
            last_message_at: cursor.last_message_at,
            last_synced_at: cursor.last_synced_at,
        }
    }
}

// ===== Messages =====

/// A synchronized message, keyed by `(account_id, message_id)`.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub account_id: i32,
    pub message_id: String,
    pub uid: u32,
    pub subject: String,
    pub from_name: String,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub in_reply_to: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub body_text: String,
    pub size_bytes: i64,
}

// ===== Sync Log =====

/// Row to append once a run has finished.
#[derive(Debug, Clone)]
pub struct NewSyncLog {
    pub account_id: i32,
    pub mode: SyncMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub new_count: i32,
    pub skipped_count: i32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
pub struct SyncLogEntry {
    pub id: i64,
    #[serde(rename = "accountId")]
    pub account_id: i32,
    pub mode: SyncMode,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "finishedAt")]
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    #[serde(rename = "newCount")]
    pub new_count: i32,
    #[serde(rename = "skippedCount")]
    pub skipped_count: i32,
    pub error: Option<String>,
}

// ===== Run Results =====

/// Outcome of one account's run, returned up the call chain as-is.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RunResult {
    #[serde(rename = "accountId")]
    pub account_id: i32,
    pub name: String,
    pub success: bool,
    #[serde(rename = "newCount")]
    pub new_count: u32,
    #[serde(rename = "logId", skip_serializing_if = "Option::is_none")]
    pub log_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    pub fn failed(account_id: i32, name: &str, error: impl Into<String>) -> Self {
        Self {
            account_id,
            name: name.to_string(),
            success: false,
            new_count: 0,
            log_id: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregate returned by the scheduled trigger.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchReport {
    pub ok: bool,
    #[serde(rename = "accountsSynced")]
    pub accounts_synced: usize,
    #[serde(rename = "totalNew")]
    pub total_new: u64,
    #[serde(rename = "failedCount")]
    pub failed_count: usize,
    pub results: Vec<RunResult>,
    /// Accounts left for the next run because the time budget ran out.
    #[serde(
        rename = "deferredAccountIds",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub deferred_account_ids: Vec<i32>,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn from_results(results: Vec<RunResult>, deferred: Vec<i32>, elapsed_ms: u64) -> Self {
        let total_new = results.iter().map(|r| u64::from(r.new_count)).sum();
        let failed_count = results.iter().filter(|r| !r.success).count();

        Self {
            ok: true,
            accounts_synced: results.len(),
            total_new,
            failed_count,
            results,
            deferred_account_ids: deferred,
            elapsed_ms,
        }
    }
}

// ===== Generic Wrappers =====

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DataResponse<T> {
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_mode_parses_known_values_only() {
        assert_eq!("incremental".parse::<SyncMode>(), Ok(SyncMode::Incremental));
        assert_eq!(" full ".parse::<SyncMode>(), Ok(SyncMode::Full));
        assert!("FULL".parse::<SyncMode>().is_err());
        assert!("".parse::<SyncMode>().is_err());
    }

    #[test]
    fn batch_report_aggregates_counts() {
        let results = vec![
            RunResult {
                account_id: 1,
                name: "A".into(),
                success: true,
                new_count: 5,
                log_id: Some(10),
                error: None,
            },
            RunResult::failed(2, "B", "connection refused"),
            RunResult {
                account_id: 3,
                name: "C".into(),
                success: true,
                new_count: 0,
                log_id: Some(12),
                error: None,
            },
        ];

        let report = BatchReport::from_results(results, Vec::new(), 42);
        assert!(report.ok);
        assert_eq!(report.accounts_synced, 3);
        assert_eq!(report.total_new, 5);
        assert_eq!(report.failed_count, 1);

        let json = serde_json::to_value(&report).expect("serializable report");
        assert_eq!(json["accountsSynced"], 3);
        assert!(json.get("deferredAccountIds").is_none());
        assert!(json["results"][0].get("error").is_none());
        assert_eq!(json["results"][1]["error"], "connection refused");
    }

    #[test]
    fn mailbox_settings_debug_hides_password() {
        let settings = MailboxSettings {
            host: "imap.example.com".into(),
            port: 993,
            username: "orders@example.com".into(),
            password: "hunter2".into(),
            folder: "INBOX".into(),
            use_tls: true,
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
