//! Persistence contracts consumed by the sync engine.
//!
//! The engine never reaches for ambient state: every orchestrator is handed an
//! [`AccountRegistry`] and a [`SyncStore`] so that independent instances (and
//! test doubles) each hold their own data.

use rocket_db_pools::sqlx;
use thiserror::Error;

use crate::models::{Account, MessageRecord, NewSyncLog, SyncCursor, SyncLogEntry};

/// Storage failure. Aborts the current account's run without touching its cursor.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored value out of range: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The set of accounts could not be enumerated.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to load mail accounts: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid account {id}: {reason}")]
    InvalidAccount { id: i32, reason: String },
    #[error("account registry unavailable: {0}")]
    Unavailable(String),
}

#[rocket::async_trait]
pub trait AccountRegistry: Send + Sync {
    /// Active accounts in ascending id order.
    async fn list_active_accounts(&self) -> Result<Vec<Account>, RegistryError>;

    async fn get_account(&self, account_id: i32) -> Result<Option<Account>, RegistryError>;
}

#[rocket::async_trait]
pub trait SyncStore: Send + Sync {
    async fn has_message(&self, account_id: i32, message_id: &str) -> Result<bool, StoreError>;

    /// Insert unless `(account_id, message_id)` already exists.
    ///
    /// Returns `false` for a duplicate; duplicates are not an error.
    async fn insert_message_if_absent(&self, record: &MessageRecord) -> Result<bool, StoreError>;

    async fn get_cursor(&self, account_id: i32) -> Result<Option<SyncCursor>, StoreError>;

    /// Single-row upsert keyed by account.
    async fn set_cursor(&self, cursor: &SyncCursor) -> Result<(), StoreError>;

    async fn append_sync_log(&self, entry: &NewSyncLog) -> Result<i64, StoreError>;

    /// Newest first, optionally restricted to one account.
    async fn recent_sync_logs(
        &self,
        account_id: Option<i32>,
        limit: u32,
    ) -> Result<Vec<SyncLogEntry>, StoreError>;
}
