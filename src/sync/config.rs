use std::env;
use std::time::Duration;

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// Sync engine settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Per-account message cap on the scheduled path.
    pub scheduled_limit: u32,
    /// Default cap for on-demand runs that do not name one.
    pub manual_limit: u32,
    /// Largest cap an on-demand caller may ask for.
    pub max_manual_limit: u32,
    /// Wall-clock budget for one scheduled run across all accounts.
    pub run_budget: Duration,
    /// No new account is started with less budget than this left.
    pub account_min_budget: Duration,
    /// Size of the cursor's recent message-id window.
    pub recent_id_window: usize,
    pub scheduler_enabled: bool,
    pub scheduler_interval: Duration,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let manual_limit = env_u32("MAILSYNC_MANUAL_LIMIT", 500);
        Self {
            scheduled_limit: env_u32("MAILSYNC_SCHEDULED_LIMIT", 50),
            manual_limit,
            max_manual_limit: env_u32("MAILSYNC_MAX_MANUAL_LIMIT", 5_000).max(manual_limit),
            run_budget: env_duration_secs("MAILSYNC_RUN_BUDGET_SECS", 55),
            account_min_budget: env_duration_secs("MAILSYNC_ACCOUNT_MIN_BUDGET_SECS", 5),
            recent_id_window: env_usize("MAILSYNC_RECENT_IDS", 200),
            scheduler_enabled: env_bool("MAILSYNC_SCHEDULER_ENABLED", false),
            scheduler_interval: env_duration_secs("MAILSYNC_SCHEDULER_INTERVAL_SECS", 300),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scheduled_limit: 50,
            manual_limit: 500,
            max_manual_limit: 5_000,
            run_budget: Duration::from_secs(55),
            account_min_budget: Duration::from_secs(5),
            recent_id_window: 200,
            scheduler_enabled: false,
            scheduler_interval: Duration::from_secs(300),
        }
    }
}
