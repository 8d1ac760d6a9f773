//! In-process implementations of the registry and store contracts.
//!
//! Used by the test suite and by local runs without Postgres. Each instance
//! owns its data; nothing is shared between instances.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::models::{Account, MessageRecord, NewSyncLog, SyncCursor, SyncLogEntry};
use crate::sync::store::{AccountRegistry, RegistryError, StoreError, SyncStore};

#[derive(Default)]
struct Inner {
    accounts: BTreeMap<i32, Account>,
    messages: HashMap<(i32, String), MessageRecord>,
    cursors: HashMap<i32, SyncCursor>,
    logs: Vec<SyncLogEntry>,
    /// Remaining successful inserts before every further insert fails.
    insert_budget: Option<usize>,
    registry_down: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.upsert_account(account);
        }
        store
    }

    pub fn upsert_account(&self, account: Account) {
        self.inner.lock().accounts.insert(account.id, account);
    }

    /// Let `n` more message inserts succeed, then fail the rest.
    pub fn fail_inserts_after(&self, n: usize) {
        self.inner.lock().insert_budget = Some(n);
    }

    pub fn set_registry_down(&self, down: bool) {
        self.inner.lock().registry_down = down;
    }

    pub fn message_count(&self, account_id: i32) -> usize {
        self.inner
            .lock()
            .messages
            .keys()
            .filter(|(id, _)| *id == account_id)
            .count()
    }

    pub fn message(&self, account_id: i32, message_id: &str) -> Option<MessageRecord> {
        self.inner
            .lock()
            .messages
            .get(&(account_id, message_id.to_string()))
            .cloned()
    }

    pub fn cursor(&self, account_id: i32) -> Option<SyncCursor> {
        self.inner.lock().cursors.get(&account_id).cloned()
    }

    pub fn put_cursor(&self, cursor: SyncCursor) {
        self.inner.lock().cursors.insert(cursor.account_id, cursor);
    }

    pub fn logs(&self) -> Vec<SyncLogEntry> {
        self.inner.lock().logs.clone()
    }
}

#[rocket::async_trait]
impl AccountRegistry for MemoryStore {
    async fn list_active_accounts(&self) -> Result<Vec<Account>, RegistryError> {
        let inner = self.inner.lock();
        if inner.registry_down {
            return Err(RegistryError::Unavailable("registry offline".into()));
        }
        Ok(inner
            .accounts
            .values()
            .filter(|account| account.active)
            .cloned()
            .collect())
    }

    async fn get_account(&self, account_id: i32) -> Result<Option<Account>, RegistryError> {
        let inner = self.inner.lock();
        if inner.registry_down {
            return Err(RegistryError::Unavailable("registry offline".into()));
        }
        Ok(inner.accounts.get(&account_id).cloned())
    }
}

#[rocket::async_trait]
impl SyncStore for MemoryStore {
    async fn has_message(&self, account_id: i32, message_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .messages
            .contains_key(&(account_id, message_id.to_string())))
    }

    async fn insert_message_if_absent(&self, record: &MessageRecord) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();

        if let Some(budget) = inner.insert_budget.as_mut() {
            if *budget == 0 {
                return Err(StoreError::Unavailable("simulated write failure".into()));
            }
            *budget -= 1;
        }

        let key = (record.account_id, record.message_id.clone());
        if inner.messages.contains_key(&key) {
            return Ok(false);
        }
        inner.messages.insert(key, record.clone());
        Ok(true)
    }

    async fn get_cursor(&self, account_id: i32) -> Result<Option<SyncCursor>, StoreError> {
        Ok(self.inner.lock().cursors.get(&account_id).cloned())
    }

    async fn set_cursor(&self, cursor: &SyncCursor) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let mut next = cursor.clone();
        // Same rule as the Postgres upsert: a slower concurrent run cannot
        // pull the position back within one UIDVALIDITY.
        if let Some(existing) = inner.cursors.get(&cursor.account_id) {
            if existing.uid_validity == cursor.uid_validity {
                next.last_uid = next.last_uid.max(existing.last_uid);
            }
        }
        inner.cursors.insert(cursor.account_id, next);
        Ok(())
    }

    async fn append_sync_log(&self, entry: &NewSyncLog) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock();
        let id = inner.logs.len() as i64 + 1;
        inner.logs.push(SyncLogEntry {
            id,
            account_id: entry.account_id,
            mode: entry.mode,
            started_at: entry.started_at,
            finished_at: entry.finished_at,
            success: entry.success,
            new_count: entry.new_count,
            skipped_count: entry.skipped_count,
            error: entry.error.clone(),
        });
        Ok(id)
    }

    async fn recent_sync_logs(
        &self,
        account_id: Option<i32>,
        limit: u32,
    ) -> Result<Vec<SyncLogEntry>, StoreError> {
        Ok(self
            .inner
            .lock()
            .logs
            .iter()
            .rev()
            .filter(|entry| account_id.is_none_or(|id| entry.account_id == id))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
