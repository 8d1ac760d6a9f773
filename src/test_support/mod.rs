//! Shared fixtures for unit and integration tests.

pub mod database;
pub mod mailbox;

use std::sync::Arc;

use rocket::config::LogLevel;
use rocket::figment::Figment;
use rocket::local::asynchronous::Client as AsyncClient;
use rocket::local::blocking::Client;
use rocket::{Build, Rocket, Route};

use crate::auth::{AuthConfig, AuthState};
use crate::routes;
use crate::sync::SyncOrchestrator;

pub use database::{TestDatabase, TestDatabaseError};
pub use mailbox::{ScriptedMailbox, test_account};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_CRON_SECRET: &str = "test-cron-secret";

/// Auth state with fixed test secrets.
pub fn test_auth_state() -> AuthState {
    AuthState::new(AuthConfig {
        issuer: "http://localhost".into(),
        audience: "mailsync-api".into(),
        access_token_ttl_secs: 900,
        jwt_secret: Some(TEST_JWT_SECRET.into()),
        cron_secret: Some(TEST_CRON_SECRET.into()),
    })
}

/// `Authorization` header value carrying a fresh operator token.
pub fn operator_bearer(state: &AuthState) -> String {
    let token = state
        .jwt_service
        .as_ref()
        .expect("jwt secret configured")
        .issue_access_token("tester@example.com", "operator")
        .expect("token issued");
    format!("Bearer {}", token.token)
}

/// Builder for constructing Rocket instances tailored for integration tests.
pub struct TestRocketBuilder {
    figment: Figment,
    mounts: Vec<(String, Vec<Route>)>,
    orchestrator: Option<Arc<SyncOrchestrator>>,
    auth: Option<AuthState>,
}

impl TestRocketBuilder {
    /// Random port, logging disabled.
    pub fn new() -> Self {
        let figment = rocket::Config::figment()
            .merge(("port", 0))
            .merge(("log_level", LogLevel::Off))
            .merge(("cli_colors", false));

        Self {
            figment,
            mounts: Vec::new(),
            orchestrator: None,
            auth: None,
        }
    }

    /// Mount routes under `/api/v1`.
    pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
        self.mounts.push(("/api/v1".to_string(), routes));
        self
    }

    pub fn manage_orchestrator(mut self, orchestrator: Arc<SyncOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn manage_auth(mut self, auth: AuthState) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn build(self) -> Rocket<Build> {
        let mut rocket = rocket::custom(self.figment).register("/", routes::catchers::all());

        for (base, routes) in self.mounts {
            rocket = rocket.mount(base, routes);
        }
        if let Some(orchestrator) = self.orchestrator {
            rocket = rocket.manage(orchestrator);
        }
        if let Some(auth) = self.auth {
            rocket = rocket.manage(auth);
        }

        rocket
    }

    pub fn blocking_client(self) -> Client {
        Client::tracked(self.build()).expect("valid Rocket instance")
    }

    pub async fn async_client(self) -> AsyncClient {
        AsyncClient::tracked(self.build())
            .await
            .expect("valid Rocket instance")
    }
}
