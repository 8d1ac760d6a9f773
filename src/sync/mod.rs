//! Mail synchronization engine.
//!
//! Pulls new messages from every configured mailbox into Postgres, on a
//! schedule and on demand, and records one audit row per account run.
//!
//! # Components
//!
//! - **`store`**: the [`AccountRegistry`] and [`SyncStore`] contracts, with
//!   Postgres implementations in `database` and in-process ones in `memory`.
//!
//! - **`mailbox`**: the [`MailboxClient`] boundary and its IMAP
//!   implementation, plus RFC 5322 parsing.
//!
//! - **`cursor`**: where a run starts and what the cursor becomes afterwards.
//!
//! - **`core`**: one account, one mode, one bounded batch.
//!
//! - **`orchestrator`**: the scheduled pass over all active accounts under a
//!   wall-clock budget, and single-account runs.
//!
//! - **`scheduler`**: optional in-process interval trigger.
//!
//! ## Data Flow
//!
//! 1. Load the account's cursor and open a mailbox session
//! 2. List message references above the cursor, ascending by UID, capped
//! 3. Skip ids already stored, fetch and insert the rest
//! 4. Move the cursor over everything handled, then append the run log row
//!
//! ## Modes
//!
//! - **Incremental**: start after the stored UID.
//! - **Full**: start from the first UID and rely on dedup; the cursor still
//!   never moves backwards.
//!
//! A change of the folder's UIDVALIDITY invalidates the stored UID and the
//! next run starts from the beginning in either mode.

pub mod config;
pub mod core;
pub mod cursor;
pub mod database;
pub mod mailbox;
pub mod memory;
pub mod orchestrator;
pub mod scheduler;
pub mod store;

pub use config::SyncConfig;
pub use self::core::{AccountSyncer, SyncError};
pub use database::{PgAccountRegistry, PgSyncStore, run_migrations};
pub use mailbox::{ImapMailboxClient, MailboxClient, MailboxError, MailboxSession};
pub use orchestrator::{SingleRunError, SyncOrchestrator};
pub use scheduler::SyncScheduler;
pub use store::{AccountRegistry, RegistryError, StoreError, SyncStore};
