//! Postgres-backed account registry over `mail_accounts`.

use rocket_db_pools::sqlx::{self, FromRow, PgPool};

use crate::models::{Account, MailboxSettings, SyncPolicy};
use crate::sync::store::{AccountRegistry, RegistryError};

const ACCOUNT_COLUMNS: &str = "id, name, active, imap_host, imap_port, imap_username, \
     imap_password, imap_folder, use_tls, sync_batch_limit";

#[derive(Debug, FromRow)]
struct AccountRow {
    id: i32,
    name: String,
    active: bool,
    imap_host: String,
    imap_port: i32,
    imap_username: String,
    imap_password: String,
    imap_folder: String,
    use_tls: bool,
    sync_batch_limit: Option<i32>,
}

impl TryFrom<AccountRow> for Account {
    type Error = RegistryError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.imap_port).map_err(|_| RegistryError::InvalidAccount {
            id: row.id,
            reason: format!("imap_port {} out of range", row.imap_port),
        })?;
        let batch_limit = row
            .sync_batch_limit
            .map(|limit| {
                u32::try_from(limit).map_err(|_| RegistryError::InvalidAccount {
                    id: row.id,
                    reason: format!("sync_batch_limit {limit} out of range"),
                })
            })
            .transpose()?;

        Ok(Account {
            id: row.id,
            name: row.name,
            active: row.active,
            mailbox: MailboxSettings {
                host: row.imap_host,
                port,
                username: row.imap_username,
                password: row.imap_password,
                folder: row.imap_folder,
                use_tls: row.use_tls,
            },
            policy: SyncPolicy { batch_limit },
        })
    }
}

pub struct PgAccountRegistry {
    pool: PgPool,
}

impl PgAccountRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl AccountRegistry for PgAccountRegistry {
    async fn list_active_accounts(&self) -> Result<Vec<Account>, RegistryError> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM mail_accounts WHERE active ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            // Misconfigured rows are skipped; the rest still sync.
            match Account::try_from(row) {
                Ok(account) => accounts.push(account),
                Err(e) => log::error!("skipping mail account: {}", e),
            }
        }
        Ok(accounts)
    }

    async fn get_account(&self, account_id: i32) -> Result<Option<Account>, RegistryError> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM mail_accounts WHERE id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> AccountRow {
        AccountRow {
            id: 7,
            name: "Orders".into(),
            active: true,
            imap_host: "imap.example.com".into(),
            imap_port: 993,
            imap_username: "orders@example.com".into(),
            imap_password: "pw".into(),
            imap_folder: "INBOX".into(),
            use_tls: true,
            sync_batch_limit: Some(25),
        }
    }

    #[test]
    fn converts_valid_rows() {
        let account = Account::try_from(row()).expect("valid row");
        assert_eq!(account.mailbox.port, 993);
        assert_eq!(account.policy.batch_limit, Some(25));
    }

    #[test]
    fn rejects_out_of_range_port() {
        let mut bad = row();
        bad.imap_port = 70_000;
        let err = Account::try_from(bad).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidAccount { id: 7, .. }));
    }
}
