use rocket_db_pools::sqlx::{self, PgPool};

use crate::models::{NewSyncLog, SyncLogEntry};

pub async fn append_log(pool: &PgPool, entry: &NewSyncLog) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"INSERT INTO mail_sync_logs (
               account_id, mode, started_at, finished_at, success,
               new_count, skipped_count, error
           )
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
           RETURNING id"#,
    )
    .bind(entry.account_id)
    .bind(entry.mode)
    .bind(entry.started_at)
    .bind(entry.finished_at)
    .bind(entry.success)
    .bind(entry.new_count)
    .bind(entry.skipped_count)
    .bind(&entry.error)
    .fetch_one(pool)
    .await
}

pub async fn recent_logs(
    pool: &PgPool,
    account_id: Option<i32>,
    limit: u32,
) -> Result<Vec<SyncLogEntry>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT id, account_id, mode, started_at, finished_at, success,
                  new_count, skipped_count, error
           FROM mail_sync_logs
           WHERE $1::INTEGER IS NULL OR account_id = $1
           ORDER BY id DESC
           LIMIT $2"#,
    )
    .bind(account_id)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await
}
