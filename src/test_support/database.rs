//! Disposable Postgres for integration tests.

use log::LevelFilter;
use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
use testcontainers::{ContainerAsync, core::error::TestcontainersError};
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use thiserror::Error;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum TestDatabaseError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("container error: {0}")]
    Container(#[from] TestcontainersError),
}

/// A migrated database inside its own container, removed on drop.
pub struct TestDatabase {
    pool: PgPool,
    _container: ContainerAsync<Postgres>,
}

impl TestDatabase {
    pub async fn new() -> Result<Self, TestDatabaseError> {
        let container = Postgres::default().start().await?;
        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432).await?;

        let options: PgConnectOptions =
            format!("postgres://postgres:postgres@{host}:{port}/postgres").parse()?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(options.log_statements(LevelFilter::Off))
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self {
            pool,
            _container: container,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    /// Insert an account row and return its id.
    pub async fn insert_account(&self, name: &str, active: bool) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar(
            r#"INSERT INTO mail_accounts (name, active, imap_host, imap_username, imap_password)
               VALUES ($1, $2, 'imap.test.invalid', $3, 'secret')
               RETURNING id"#,
        )
        .bind(name)
        .bind(active)
        .bind(format!("{}@test.invalid", name.to_lowercase()))
        .fetch_one(&self.pool)
        .await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
