use rocket_db_pools::sqlx::{self, PgPool};

use crate::models::MessageRecord;

pub async fn message_exists(
    pool: &PgPool,
    account_id: i32,
    message_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM mail_messages WHERE account_id = $1 AND message_id = $2)",
    )
    .bind(account_id)
    .bind(message_id)
    .fetch_one(pool)
    .await
}

/// Insert one message; an existing `(account_id, message_id)` is left alone.
///
/// Returns whether a row was written.
pub async fn insert_message(pool: &PgPool, record: &MessageRecord) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"INSERT INTO mail_messages (
               account_id, message_id, uid, subject, from_name, from_address,
               to_addresses, in_reply_to, sent_at, received_at, body_text, size_bytes
           )
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
           ON CONFLICT (account_id, message_id) DO NOTHING"#,
    )
    .bind(record.account_id)
    .bind(&record.message_id)
    .bind(i64::from(record.uid))
    .bind(&record.subject)
    .bind(&record.from_name)
    .bind(&record.from_address)
    .bind(&record.to_addresses)
    .bind(&record.in_reply_to)
    .bind(record.sent_at)
    .bind(record.received_at)
    .bind(&record.body_text)
    .bind(record.size_bytes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
