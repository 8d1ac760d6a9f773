//! Batch and single-account entry points into the sync core.
//!
//! Accounts run strictly one after another. Each run is spawned as its own
//! task so a panic inside one account surfaces as a failed result for that
//! account instead of tearing down the batch, with its log row written here.
//! The task is aborted when the caller stops waiting for it; an aborted or
//! panicked run drops its mailbox session without a logout and the server
//! sees the connection close.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::models::{
    Account, BatchReport, NewSyncLog, RunResult, SyncCursor, SyncLogEntry, SyncMode,
};
use crate::sync::config::SyncConfig;
use crate::sync::core::AccountSyncer;
use crate::sync::mailbox::MailboxClient;
use crate::sync::store::{AccountRegistry, RegistryError, StoreError, SyncStore};

#[derive(Debug, Error)]
pub enum SingleRunError {
    #[error("mail account {0} not found")]
    NotFound(i32),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct SyncOrchestrator {
    registry: Arc<dyn AccountRegistry>,
    store: Arc<dyn SyncStore>,
    syncer: Arc<AccountSyncer>,
    config: SyncConfig,
    /// One open mailbox session at a time per orchestrator.
    sessions: Arc<Semaphore>,
}

impl SyncOrchestrator {
    pub fn new(
        registry: Arc<dyn AccountRegistry>,
        store: Arc<dyn SyncStore>,
        mailbox: Arc<dyn MailboxClient>,
        config: SyncConfig,
    ) -> Self {
        let syncer = AccountSyncer::new(store.clone(), mailbox, config.recent_id_window);
        Self {
            registry,
            store,
            syncer: Arc::new(syncer),
            config,
            sessions: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Incremental pass over every active account within the run budget.
    ///
    /// Only a registry failure fails the whole call. Accounts that could not
    /// be started before the budget ran low are reported as deferred.
    pub async fn run_scheduled(&self) -> Result<BatchReport, RegistryError> {
        let started = Instant::now();
        let deadline = started + self.config.run_budget;

        let accounts = self.registry.list_active_accounts().await?;
        log::info!(
            "scheduled sync: {} active account(s), budget {}s",
            accounts.len(),
            self.config.run_budget.as_secs()
        );

        let mut results = Vec::with_capacity(accounts.len());
        let mut deferred = Vec::new();

        for account in accounts {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining < self.config.account_min_budget {
                deferred.push(account.id);
                continue;
            }

            let limit = account
                .policy
                .batch_limit
                .unwrap_or(self.config.scheduled_limit);
            let result = self
                .run_isolated(account, SyncMode::Incremental, limit, Some(deadline))
                .await;
            results.push(result);
        }

        if !deferred.is_empty() {
            log::warn!(
                "scheduled sync: budget exhausted, deferred account(s) {:?}",
                deferred
            );
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = BatchReport::from_results(results, deferred, elapsed_ms);
        log::info!(
            "scheduled sync finished in {}ms: {} account(s), {} new, {} failed",
            report.elapsed_ms,
            report.accounts_synced,
            report.total_new,
            report.failed_count
        );
        Ok(report)
    }

    /// Run one account on demand, whether or not it is active.
    ///
    /// `limit` defaults to the manual limit and is clamped to the maximum.
    pub async fn run_single(
        &self,
        account_id: i32,
        mode: SyncMode,
        limit: Option<u32>,
    ) -> Result<RunResult, SingleRunError> {
        let account = self
            .registry
            .get_account(account_id)
            .await?
            .ok_or(SingleRunError::NotFound(account_id))?;

        let limit = limit
            .unwrap_or(self.config.manual_limit)
            .clamp(1, self.config.max_manual_limit);

        Ok(self.run_isolated(account, mode, limit, None).await)
    }

    pub async fn recent_logs(
        &self,
        account_id: Option<i32>,
        limit: u32,
    ) -> Result<Vec<SyncLogEntry>, StoreError> {
        self.store.recent_sync_logs(account_id, limit).await
    }

    pub async fn cursor(&self, account_id: i32) -> Result<Option<SyncCursor>, StoreError> {
        self.store.get_cursor(account_id).await
    }

    pub async fn account(&self, account_id: i32) -> Result<Option<Account>, RegistryError> {
        self.registry.get_account(account_id).await
    }

    async fn run_isolated(
        &self,
        account: Account,
        mode: SyncMode,
        limit: u32,
        deadline: Option<Instant>,
    ) -> RunResult {
        let account_id = account.id;
        let name = account.name.clone();

        let Ok(permit) = self.sessions.clone().acquire_owned().await else {
            return RunResult::failed(account_id, &name, "sync orchestrator is shutting down");
        };

        let started_at = Utc::now();
        let syncer = self.syncer.clone();
        // Aborted if the caller goes away, which also releases the permit.
        let task = AbortOnDrop(tokio::spawn(async move {
            let _permit = permit;
            syncer.sync_account(&account, mode, limit, deadline).await
        }));

        match task.join().await {
            Ok(result) => result,
            Err(e) => {
                log::error!("account {} ({}): sync task aborted: {}", account_id, name, e);
                self.record_aborted_run(account_id, &name, mode, started_at, e)
                    .await
            }
        }
    }

    /// The task died before writing its own log row; write it here.
    async fn record_aborted_run(
        &self,
        account_id: i32,
        name: &str,
        mode: SyncMode,
        started_at: DateTime<Utc>,
        error: JoinError,
    ) -> RunResult {
        let message = format!("sync task aborted: {error}");
        let entry = NewSyncLog {
            account_id,
            mode,
            started_at,
            finished_at: Utc::now(),
            success: false,
            new_count: 0,
            skipped_count: 0,
            error: Some(message.clone()),
        };

        let mut result = RunResult::failed(account_id, name, message);
        match self.store.append_sync_log(&entry).await {
            Ok(log_id) => result.log_id = Some(log_id),
            Err(e) => log::error!("account {}: failed to record sync log: {}", account_id, e),
        }
        result
    }
}

/// Join handle that aborts its task when dropped before completion.
///
/// Keeps a run from outliving the request or scheduler tick that started it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> Result<T, JoinError> {
        (&mut self.0).await
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::MemoryStore;
    use crate::test_support::{ScriptedMailbox, test_account};
    use std::time::Duration;

    fn orchestrator(
        store: &Arc<MemoryStore>,
        mailbox: &Arc<ScriptedMailbox>,
        config: SyncConfig,
    ) -> SyncOrchestrator {
        SyncOrchestrator::new(store.clone(), store.clone(), mailbox.clone(), config)
    }

    fn three_accounts() -> (Arc<MemoryStore>, Arc<ScriptedMailbox>) {
        let store = Arc::new(MemoryStore::with_accounts([
            test_account(1, "A"),
            test_account(2, "B"),
            test_account(3, "C"),
        ]));
        let mailbox = Arc::new(ScriptedMailbox::new());
        for uid in 1..=5 {
            mailbox.add_message(1, uid, &format!("a{uid}@shop"));
        }
        mailbox.fail_open(2, "connection refused");
        (store, mailbox)
    }

    #[tokio::test]
    async fn one_failing_account_does_not_stop_the_batch() {
        let (store, mailbox) = three_accounts();
        let report = orchestrator(&store, &mailbox, SyncConfig::default())
            .run_scheduled()
            .await
            .expect("registry available");

        assert!(report.ok);
        assert_eq!(report.accounts_synced, 3);
        assert_eq!(report.total_new, 5);
        assert_eq!(report.failed_count, 1);
        assert!(report.deferred_account_ids.is_empty());

        let ids: Vec<i32> = report.results.iter().map(|r| r.account_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(report.results[0].success);
        assert_eq!(report.results[0].new_count, 5);
        assert!(!report.results[1].success);
        assert!(report.results[1].error.is_some());
        assert!(report.results[2].success);
        assert_eq!(report.results[2].new_count, 0);

        assert_eq!(store.logs().len(), 3);
        assert!(store.cursor(2).is_none());
    }

    #[tokio::test]
    async fn registry_failure_fails_the_call() {
        let (store, mailbox) = three_accounts();
        store.set_registry_down(true);

        let err = orchestrator(&store, &mailbox, SyncConfig::default())
            .run_scheduled()
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::Unavailable(_)));
        assert!(store.logs().is_empty());
        assert_eq!(mailbox.open_count(), 0);
    }

    #[tokio::test]
    async fn inactive_accounts_are_not_scheduled() {
        let mut paused = test_account(4, "Paused");
        paused.active = false;
        let store = Arc::new(MemoryStore::with_accounts([test_account(1, "A"), paused]));
        let mailbox = Arc::new(ScriptedMailbox::new());
        mailbox.add_message(4, 1, "p1@shop");

        let report = orchestrator(&store, &mailbox, SyncConfig::default())
            .run_scheduled()
            .await
            .expect("registry available");

        assert_eq!(report.accounts_synced, 1);
        assert_eq!(store.message_count(4), 0);
    }

    #[tokio::test]
    async fn account_policy_overrides_scheduled_limit() {
        let mut capped = test_account(1, "A");
        capped.policy.batch_limit = Some(2);
        let store = Arc::new(MemoryStore::with_accounts([capped]));
        let mailbox = Arc::new(ScriptedMailbox::new());
        for uid in 1..=5 {
            mailbox.add_message(1, uid, &format!("a{uid}@shop"));
        }

        let report = orchestrator(&store, &mailbox, SyncConfig::default())
            .run_scheduled()
            .await
            .expect("registry available");

        assert_eq!(report.total_new, 2);
        assert_eq!(store.cursor(1).expect("cursor").last_uid, 2);
    }

    #[tokio::test]
    async fn exhausted_budget_defers_remaining_accounts() {
        let (store, mailbox) = three_accounts();
        let config = SyncConfig {
            run_budget: Duration::from_secs(1),
            account_min_budget: Duration::from_secs(5),
            ..SyncConfig::default()
        };

        let report = orchestrator(&store, &mailbox, config)
            .run_scheduled()
            .await
            .expect("registry available");

        assert!(report.results.is_empty());
        assert_eq!(report.deferred_account_ids, vec![1, 2, 3]);
        assert_eq!(mailbox.open_count(), 0);
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn panicking_account_becomes_a_failed_result() {
        let (store, mailbox) = three_accounts();
        mailbox.panic_on_open(3);

        let report = orchestrator(&store, &mailbox, SyncConfig::default())
            .run_scheduled()
            .await
            .expect("registry available");

        assert_eq!(report.accounts_synced, 3);
        assert_eq!(report.failed_count, 2);
        assert!(
            report.results[2]
                .error
                .as_deref()
                .is_some_and(|e| e.contains("aborted"))
        );
        assert!(report.results[0].success);

        // The panicking run still leaves its audit row.
        let logs = store.logs();
        assert_eq!(logs.len(), 3);
        let aborted = logs.iter().find(|l| l.account_id == 3).expect("log row for C");
        assert!(!aborted.success);
        assert!(aborted.error.as_deref().is_some_and(|e| e.contains("aborted")));
        assert_eq!(report.results[2].log_id, Some(aborted.id));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_caller_aborts_the_running_account() {
        let (store, mailbox) = three_accounts();
        mailbox.delay_fetch(1, Duration::from_millis(100));
        let orchestrator = orchestrator(&store, &mailbox, SyncConfig::default());

        let outcome = tokio::time::timeout(
            Duration::from_millis(150),
            orchestrator.run_single(1, SyncMode::Incremental, None),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.message_count(1), 1);
        assert!(store.logs().is_empty());

        // The session slot was released with the aborted task.
        let result = orchestrator
            .run_single(1, SyncMode::Incremental, None)
            .await
            .expect("account exists");
        assert!(result.success);
        assert_eq!(result.new_count, 4);
    }

    #[tokio::test]
    async fn run_single_reports_unknown_account() {
        let (store, mailbox) = three_accounts();
        let err = orchestrator(&store, &mailbox, SyncConfig::default())
            .run_single(99, SyncMode::Incremental, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SingleRunError::NotFound(99)));
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn run_single_uses_requested_mode_and_limit() {
        let (store, mailbox) = three_accounts();
        let orchestrator = orchestrator(&store, &mailbox, SyncConfig::default());

        let first = orchestrator
            .run_single(1, SyncMode::Incremental, Some(2))
            .await
            .expect("account exists");
        assert!(first.success);
        assert_eq!(first.new_count, 2);

        let full = orchestrator
            .run_single(1, SyncMode::Full, None)
            .await
            .expect("account exists");
        assert!(full.success);
        assert_eq!(full.new_count, 3);
        assert_eq!(store.cursor(1).expect("cursor").last_uid, 5);

        let logs = orchestrator.recent_logs(Some(1), 10).await.expect("logs");
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].mode, SyncMode::Full);
    }

    #[tokio::test]
    async fn run_single_allows_inactive_accounts() {
        let mut paused = test_account(4, "Paused");
        paused.active = false;
        let store = Arc::new(MemoryStore::with_accounts([paused]));
        let mailbox = Arc::new(ScriptedMailbox::new());
        mailbox.add_message(4, 1, "p1@shop");

        let result = orchestrator(&store, &mailbox, SyncConfig::default())
            .run_single(4, SyncMode::Incremental, None)
            .await
            .expect("account exists");

        assert!(result.success);
        assert_eq!(result.new_count, 1);
    }
}
