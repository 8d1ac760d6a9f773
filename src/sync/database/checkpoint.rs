//! Per-account sync cursors.
//!
//! One row per account in `mail_sync_cursors`. UIDs are stored as BIGINT since
//! IMAP UIDs are unsigned 32-bit values.

use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, FromRow, PgPool};

use crate::models::SyncCursor;
use crate::sync::store::StoreError;

#[derive(Debug, FromRow)]
struct CursorRow {
    account_id: i32,
    uid_validity: Option<i64>,
    last_uid: i64,
    recent_message_ids: Vec<String>,
    last_message_at: Option<DateTime<Utc>>,
    last_synced_at: DateTime<Utc>,
}

fn to_u32(field: &str, account_id: i32, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| {
        StoreError::Corrupt(format!("{field} {value} for account {account_id}"))
    })
}

impl TryFrom<CursorRow> for SyncCursor {
    type Error = StoreError;

    fn try_from(row: CursorRow) -> Result<Self, Self::Error> {
        let uid_validity = row
            .uid_validity
            .map(|v| to_u32("uid_validity", row.account_id, v))
            .transpose()?;
        Ok(SyncCursor {
            account_id: row.account_id,
            uid_validity,
            last_uid: to_u32("last_uid", row.account_id, row.last_uid)?,
            recent_message_ids: row.recent_message_ids,
            last_message_at: row.last_message_at,
            last_synced_at: row.last_synced_at,
        })
    }
}

pub async fn load_cursor(pool: &PgPool, account_id: i32) -> Result<Option<SyncCursor>, StoreError> {
    let row: Option<CursorRow> = sqlx::query_as(
        r#"SELECT account_id, uid_validity, last_uid, recent_message_ids,
                  last_message_at, last_synced_at
           FROM mail_sync_cursors
           WHERE account_id = $1"#,
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    row.map(SyncCursor::try_from).transpose()
}

/// Upsert the cursor.
///
/// Within the same UIDVALIDITY the stored `last_uid` only moves forward, so
/// two overlapping runs cannot pull it back.
pub async fn save_cursor(pool: &PgPool, cursor: &SyncCursor) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO mail_sync_cursors (
               account_id, uid_validity, last_uid, recent_message_ids,
               last_message_at, last_synced_at
           )
           VALUES ($1, $2, $3, $4, $5, $6)
           ON CONFLICT (account_id) DO UPDATE SET
               last_uid = CASE
                   WHEN mail_sync_cursors.uid_validity IS NOT DISTINCT FROM EXCLUDED.uid_validity
                   THEN GREATEST(mail_sync_cursors.last_uid, EXCLUDED.last_uid)
                   ELSE EXCLUDED.last_uid
               END,
               uid_validity = EXCLUDED.uid_validity,
               recent_message_ids = EXCLUDED.recent_message_ids,
               last_message_at = EXCLUDED.last_message_at,
               last_synced_at = EXCLUDED.last_synced_at"#,
    )
    .bind(cursor.account_id)
    .bind(cursor.uid_validity.map(i64::from))
    .bind(i64::from(cursor.last_uid))
    .bind(&cursor.recent_message_ids)
    .bind(cursor.last_message_at)
    .bind(cursor.last_synced_at)
    .execute(pool)
    .await?;

    Ok(())
}
