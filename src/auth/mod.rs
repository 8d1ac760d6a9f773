//! Caller authentication for the sync API.
//!
//! Two kinds of caller exist: operators holding an HS256 access token, and the
//! external scheduler presenting the shared cron secret.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, CronCaller};
pub use jwt::JwtService;

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    /// `None` when no signing secret is configured; every token is refused.
    pub jwt_service: Option<Arc<JwtService>>,
}

impl AuthState {
    pub fn new(config: AuthConfig) -> Self {
        let jwt_service = config
            .jwt_secret
            .as_deref()
            .map(|secret| Arc::new(JwtService::new(secret, &config)));
        Self {
            config,
            jwt_service,
        }
    }

    pub fn from_env() -> Self {
        let config = AuthConfig::from_env();
        if config.jwt_secret.is_none() {
            log::warn!("MAILSYNC_JWT_SECRET not set; on-demand sync endpoints will reject all callers");
        }
        if config.cron_secret.is_none() {
            log::warn!("MAILSYNC_CRON_SECRET not set; the cron trigger will reject all callers");
        }
        Self::new(config)
    }
}
