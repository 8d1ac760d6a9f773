use rocket_db_pools::{Database, sqlx};

#[derive(Database)]
#[database("mailsync_db")]
pub struct MailSyncDb(sqlx::PgPool);
