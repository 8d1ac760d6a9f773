//! Postgres persistence for the sync engine.
//!
//! - `accounts`: the account registry over `mail_accounts`
//! - `messages`: idempotent message inserts
//! - `checkpoint`: per-account cursors
//! - `sync_log`: the append-only run log
//! - `migration`: schema migrations

pub mod accounts;
pub mod checkpoint;
pub mod messages;
pub mod migration;
pub mod sync_log;

use rocket_db_pools::sqlx::PgPool;

use crate::models::{MessageRecord, NewSyncLog, SyncCursor, SyncLogEntry};
use crate::sync::store::{StoreError, SyncStore};

pub use accounts::PgAccountRegistry;
pub use migration::run_migrations;

pub struct PgSyncStore {
    pool: PgPool,
}

impl PgSyncStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl SyncStore for PgSyncStore {
    async fn has_message(&self, account_id: i32, message_id: &str) -> Result<bool, StoreError> {
        Ok(messages::message_exists(&self.pool, account_id, message_id).await?)
    }

    async fn insert_message_if_absent(&self, record: &MessageRecord) -> Result<bool, StoreError> {
        Ok(messages::insert_message(&self.pool, record).await?)
    }

    async fn get_cursor(&self, account_id: i32) -> Result<Option<SyncCursor>, StoreError> {
        checkpoint::load_cursor(&self.pool, account_id).await
    }

    async fn set_cursor(&self, cursor: &SyncCursor) -> Result<(), StoreError> {
        checkpoint::save_cursor(&self.pool, cursor).await
    }

    async fn append_sync_log(&self, entry: &NewSyncLog) -> Result<i64, StoreError> {
        Ok(sync_log::append_log(&self.pool, entry).await?)
    }

    async fn recent_sync_logs(
        &self,
        account_id: Option<i32>,
        limit: u32,
    ) -> Result<Vec<SyncLogEntry>, StoreError> {
        Ok(sync_log::recent_logs(&self.pool, account_id, limit).await?)
    }
}
