//! In-process replacement for the external cron trigger.
//!
//! Disabled by default; deployments that cannot call the HTTP trigger turn it
//! on with `MAILSYNC_SCHEDULER_ENABLED`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::models::BatchReport;
use crate::sync::SyncOrchestrator;

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Run scheduled batches forever.
    ///
    /// A batch that overruns the interval delays the next tick instead of
    /// stacking another run behind it.
    pub async fn run(self) {
        log::info!(
            "sync scheduler started, interval {}s",
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// One scheduled batch. Registry failures are logged, never propagated.
    pub async fn run_once(&self) -> Option<BatchReport> {
        match self.orchestrator.run_scheduled().await {
            Ok(report) => {
                for result in report.results.iter().filter(|r| !r.success) {
                    log::warn!(
                        "scheduler: account {} ({}) failed: {}",
                        result.account_id,
                        result.name,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
                Some(report)
            }
            Err(e) => {
                log::error!("scheduler: scheduled sync aborted: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncConfig;
    use crate::sync::memory::MemoryStore;
    use crate::test_support::{ScriptedMailbox, test_account};

    fn scheduler(store: &Arc<MemoryStore>, mailbox: &Arc<ScriptedMailbox>) -> SyncScheduler {
        let orchestrator = SyncOrchestrator::new(
            store.clone(),
            store.clone(),
            mailbox.clone(),
            SyncConfig::default(),
        );
        SyncScheduler::new(Arc::new(orchestrator), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn run_once_returns_the_batch_report() {
        let store = Arc::new(MemoryStore::with_accounts([test_account(1, "A")]));
        let mailbox = Arc::new(ScriptedMailbox::new());
        mailbox.add_message(1, 1, "a1@shop");

        let report = scheduler(&store, &mailbox)
            .run_once()
            .await
            .expect("report");
        assert_eq!(report.total_new, 1);
    }

    #[tokio::test]
    async fn run_once_swallows_registry_failures() {
        let store = Arc::new(MemoryStore::with_accounts([test_account(1, "A")]));
        store.set_registry_down(true);
        let mailbox = Arc::new(ScriptedMailbox::new());

        assert!(scheduler(&store, &mailbox).run_once().await.is_none());
    }
}
